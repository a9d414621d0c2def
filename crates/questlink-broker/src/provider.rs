use std::time::Duration;

use reqwest::{Client, header};
use serde::Deserialize;

use questlink_core::types::{IdentityProfile, ProviderTokenSet, now_millis};

use crate::config::ProviderConfig;

const DEFAULT_EXPIRY_SECS: u64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum ProviderCallError {
    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },
    #[error("identity endpoint returned {status}: {body}")]
    IdentityEndpoint { status: u16, body: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("upstream call timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ProviderCallError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            ProviderCallError::Timeout
        } else {
            ProviderCallError::Transport(value.to_string())
        }
    }
}

/// Calls the provider's token and identity endpoints with the confidential
/// client credentials. All requests carry the configured upstream timeout.
pub struct ProviderClient {
    http: Client,
    config: ProviderConfig,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig, timeout: Duration) -> Result<Self, ProviderCallError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderCallError::Transport(err.to_string()))?;
        Ok(Self { http, config })
    }

    /// Exchange an authorization code plus PKCE verifier for a token set.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
    ) -> Result<ProviderTokenSet, ProviderCallError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        self.token_request(&form).await
    }

    /// Redeem a refresh token for a new token set.
    pub async fn refresh(&self, refresh_token: &str) -> Result<ProviderTokenSet, ProviderCallError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        self.token_request(&form).await
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
    ) -> Result<ProviderTokenSet, ProviderCallError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ProviderCallError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let payload: TokenEndpointResponse = serde_json::from_str(&body)
            .map_err(|err| ProviderCallError::InvalidResponse(err.to_string()))?;

        if payload.access_token.is_empty() {
            return Err(ProviderCallError::InvalidResponse(
                "missing access_token in token response".into(),
            ));
        }

        let expires_in = payload.expires_in.unwrap_or(DEFAULT_EXPIRY_SECS);
        Ok(ProviderTokenSet {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
            expires_at: now_millis().saturating_add(expires_in.max(1) * 1000),
        })
    }

    /// Fetch the identity profile behind an access token.
    pub async fn fetch_identity(
        &self,
        access_token: &str,
    ) -> Result<IdentityProfile, ProviderCallError> {
        let response = self
            .http
            .get(&self.config.identity_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ProviderCallError::IdentityEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let payload: IdentityEnvelope = serde_json::from_str(&body)
            .map_err(|err| ProviderCallError::InvalidResponse(err.to_string()))?;
        Ok(payload.data.into())
    }
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct IdentityEnvelope {
    data: IdentityData,
}

#[derive(Deserialize)]
struct IdentityData {
    username: String,
    name: String,
    #[serde(default)]
    profile_image_url: Option<String>,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    public_metrics: Option<PublicMetrics>,
}

#[derive(Deserialize)]
struct PublicMetrics {
    #[serde(default)]
    followers_count: Option<u64>,
}

impl From<IdentityData> for IdentityProfile {
    fn from(value: IdentityData) -> Self {
        IdentityProfile {
            handle: value.username,
            display_name: value.name,
            avatar_url: value.profile_image_url,
            verified: value.verified,
            followers: value.public_metrics.and_then(|metrics| metrics.followers_count),
        }
    }
}
