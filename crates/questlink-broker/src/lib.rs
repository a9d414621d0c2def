pub mod accounts;
pub mod config;
pub mod http;
pub mod provider;
pub mod telemetry;
