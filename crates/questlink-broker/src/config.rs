use std::{env, time::Duration};

const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Confidential client parameters for the identity provider. These never
/// leave the broker process.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub identity_url: String,
    pub redirect_uri: String,
}

/// Base URL of the account directory the provider identity is linked
/// against.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub provider: ProviderConfig,
    pub directory: DirectoryConfig,
    /// Bound on every upstream call so a hung downstream cannot stall the
    /// login UI indefinitely.
    pub upstream_timeout: Duration,
    pub host: String,
    pub port: u16,
}

impl BrokerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = ProviderConfig {
            client_id: require_env("QUESTLINK_CLIENT_ID")?,
            client_secret: require_env("QUESTLINK_CLIENT_SECRET")?,
            token_url: require_env("QUESTLINK_TOKEN_URL")?,
            identity_url: require_env("QUESTLINK_IDENTITY_URL")?,
            redirect_uri: require_env("QUESTLINK_REDIRECT_URI")?,
        };

        let directory = DirectoryConfig {
            base_url: require_env("QUESTLINK_DIRECTORY_URL")?,
        };

        let upstream_timeout_secs = env::var("QUESTLINK_UPSTREAM_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);

        let host = env::var("BROKER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = match env::var("BROKER_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidConfig(format!("invalid BROKER_PORT `{raw}`")))?,
            Err(_) => 8080,
        };

        Ok(Self {
            provider,
            directory,
            upstream_timeout: Duration::from_secs(upstream_timeout_secs.max(1)),
            host,
            port,
        })
    }
}

fn require_env(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnv(key)),
    }
}
