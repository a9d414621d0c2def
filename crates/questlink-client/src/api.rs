use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use url::Url;

use questlink_core::{
    error::AuthError,
    types::{ExchangeRequest, ExchangeResponse, ProviderTokenSet, RefreshRequest, RefreshResponse},
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The application backend's exchange and refresh endpoints, as seen from
/// the client runtime. The browser never talks to the provider's token
/// endpoint directly; confidential credentials stay server-side.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    async fn exchange(&self, request: &ExchangeRequest) -> Result<ExchangeResponse, AuthError>;
    async fn refresh(&self, refresh_token: &str) -> Result<ProviderTokenSet, AuthError>;
}

/// HTTP client for the questlink broker.
#[derive(Clone)]
pub struct BrokerClient {
    http: HttpClient,
    base_url: Url,
}

/// Builder for [`BrokerClient`].
pub struct BrokerClientBuilder {
    base_url: Option<Url>,
    timeout: Duration,
}

impl BrokerClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the broker base URL (e.g. `https://api.example.com/`).
    pub fn base_url(mut self, base_url: impl AsRef<str>) -> Result<Self, AuthError> {
        let parsed = Url::parse(base_url.as_ref())
            .map_err(|err| AuthError::Configuration(format!("invalid broker base url: {err}")))?;
        self.base_url = Some(parsed);
        Ok(self)
    }

    /// Override the request timeout (defaults to 30 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<BrokerClient, AuthError> {
        let base_url = self
            .base_url
            .ok_or_else(|| AuthError::Configuration("broker base_url is required".into()))?;
        let http = HttpClient::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|err| AuthError::Configuration(err.to_string()))?;
        Ok(BrokerClient { http, base_url })
    }
}

impl Default for BrokerClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerClient {
    pub fn builder() -> BrokerClientBuilder {
        BrokerClientBuilder::new()
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.base_url
            .join(path)
            .map_err(|err| AuthError::Configuration(format!("invalid endpoint path: {err}")))
    }
}

#[async_trait]
impl ExchangeApi for BrokerClient {
    async fn exchange(&self, request: &ExchangeRequest) -> Result<ExchangeResponse, AuthError> {
        let url = self.endpoint("auth/exchange")?;
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|err| transport_error(err, AuthError::ExchangeFailed))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::ExchangeFailed(extract_error_message(&body)));
        }

        response
            .json::<ExchangeResponse>()
            .await
            .map_err(|err| AuthError::ExchangeFailed(err.to_string()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<ProviderTokenSet, AuthError> {
        let url = self.endpoint("auth/refresh")?;
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error(err, AuthError::RefreshFailed))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshFailed(extract_error_message(&text)));
        }

        let parsed: RefreshResponse = response
            .json()
            .await
            .map_err(|err| AuthError::RefreshFailed(err.to_string()))?;
        Ok(parsed.tokens)
    }
}

fn transport_error(err: reqwest::Error, wrap: fn(String) -> AuthError) -> AuthError {
    if err.is_timeout() {
        AuthError::NetworkTimeout
    } else {
        wrap(err.to_string())
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("error").cloned())
        .and_then(|value| value.as_str().map(|s| s.to_string()))
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| body.to_string())
}
