pub mod error;
pub mod keys;
pub mod pkce;
pub mod types;
