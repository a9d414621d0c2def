use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use questlink_core::types::IdentityProfile;

use crate::config::DirectoryConfig;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid directory response: {0}")]
    InvalidResponse(String),
    #[error("directory call timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for DirectoryError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            DirectoryError::Timeout
        } else {
            DirectoryError::Transport(value.to_string())
        }
    }
}

/// Account records on the application side, keyed by the provider handle.
/// Each call may yield a session token for the matched account.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Look an account up by handle. `None` when no account exists or the
    /// record carries no token.
    async fn lookup(&self, handle: &str) -> Result<Option<String>, DirectoryError>;

    /// Create an account seeded from the identity profile.
    async fn create(
        &self,
        profile: &IdentityProfile,
        referral_code: Option<&str>,
    ) -> Result<Option<String>, DirectoryError>;

    /// Push the latest profile fields onto an existing account.
    async fn update(
        &self,
        profile: &IdentityProfile,
        session_token: &str,
    ) -> Result<(), DirectoryError>;
}

/// Resolve the application session token for an authenticated identity:
/// lookup, create when absent, and one fallback lookup when creation
/// answers without a usable token.
pub async fn resolve_session_token(
    directory: &dyn AccountDirectory,
    profile: &IdentityProfile,
    referral_code: Option<&str>,
) -> Result<Option<String>, DirectoryError> {
    if let Some(token) = directory.lookup(&profile.handle).await? {
        return Ok(Some(token));
    }

    debug!(target: "auth.linking", handle = %profile.handle, "no account found, creating");
    if let Some(token) = directory.create(profile, referral_code).await? {
        return Ok(Some(token));
    }

    // Creation can succeed without returning a token (e.g. a concurrent
    // create won the race); one more lookup settles it.
    warn!(target: "auth.linking", handle = %profile.handle, "create returned no token, retrying lookup");
    directory.lookup(&profile.handle).await
}

/// HTTP implementation against the account service.
pub struct HttpAccountDirectory {
    http: Client,
    base_url: String,
}

impl HttpAccountDirectory {
    pub fn new(config: DirectoryConfig, timeout: Duration) -> Result<Self, DirectoryError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| DirectoryError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn account_url(&self, handle: &str) -> String {
        format!("{}/accounts/{handle}", self.base_url)
    }

    fn accounts_url(&self) -> String {
        format!("{}/accounts", self.base_url)
    }
}

#[derive(Serialize)]
struct AccountPayload<'a> {
    handle: &'a str,
    display_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
    verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    followers: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    referral_code: Option<&'a str>,
}

impl<'a> AccountPayload<'a> {
    fn new(profile: &'a IdentityProfile, referral_code: Option<&'a str>) -> Self {
        Self {
            handle: &profile.handle,
            display_name: &profile.display_name,
            avatar_url: profile.avatar_url.as_deref(),
            verified: profile.verified,
            followers: profile.followers,
            referral_code,
        }
    }
}

#[derive(Deserialize)]
struct DirectoryEnvelope {
    #[serde(default)]
    result: DirectoryResult,
}

#[derive(Deserialize, Default)]
struct DirectoryResult {
    #[serde(default)]
    token: Option<String>,
}

fn parse_token(body: &str) -> Result<Option<String>, DirectoryError> {
    let envelope: DirectoryEnvelope = serde_json::from_str(body)
        .map_err(|err| DirectoryError::InvalidResponse(err.to_string()))?;
    Ok(envelope.result.token)
}

#[async_trait]
impl AccountDirectory for HttpAccountDirectory {
    async fn lookup(&self, handle: &str) -> Result<Option<String>, DirectoryError> {
        let response = self.http.get(self.account_url(handle)).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_token(&body)
    }

    async fn create(
        &self,
        profile: &IdentityProfile,
        referral_code: Option<&str>,
    ) -> Result<Option<String>, DirectoryError> {
        let response = self
            .http
            .post(self.accounts_url())
            .json(&AccountPayload::new(profile, referral_code))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_token(&body)
    }

    async fn update(
        &self,
        profile: &IdentityProfile,
        session_token: &str,
    ) -> Result<(), DirectoryError> {
        let response = self
            .http
            .put(self.account_url(&profile.handle))
            .bearer_auth(session_token)
            .json(&AccountPayload::new(profile, None))
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
