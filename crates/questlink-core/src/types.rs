use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Access token material issued by the identity provider.
///
/// Absence of `refresh_token` makes the set non-renewable; `expires_at` is
/// epoch milliseconds and is always consulted before the token is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: u64,
}

impl ProviderTokenSet {
    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis >= self.expires_at
    }

    /// True when the token enters the renewal window before expiry.
    pub fn close_to_expiry(&self, now_millis: u64, window_millis: u64) -> bool {
        now_millis.saturating_add(window_millis) >= self.expires_at
    }

    pub fn renewable(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Provider-reported user attributes, cached alongside the token set.
/// Treated as a snapshot; safe to go stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub handle: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<u64>,
}

/// Opaque bearer credential issued by the application backend once the
/// provider identity has been linked to an account record. Its lifecycle is
/// independent of the provider token set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Body of the server-side exchange endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    pub code: String,
    pub verifier: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
}

/// Successful response of the exchange endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeResponse {
    pub tokens: ProviderTokenSet,
    pub user: IdentityProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_token: Option<String>,
}

/// Body of the server-side refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Successful response of the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub tokens: ProviderTokenSet,
}

/// Current time as epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_str, to_string};

    fn sample_tokens() -> ProviderTokenSet {
        ProviderTokenSet {
            access_token: "access-xyz".to_owned(),
            refresh_token: Some("refresh-abc".to_owned()),
            expires_at: 1_700_003_600_000,
        }
    }

    fn sample_profile() -> IdentityProfile {
        IdentityProfile {
            handle: "alice".to_owned(),
            display_name: "Alice".to_owned(),
            avatar_url: Some("https://cdn.example.com/alice.png".to_owned()),
            verified: true,
            followers: Some(1200),
        }
    }

    #[test]
    fn token_set_roundtrip() {
        let tokens = sample_tokens();
        let json = to_string(&tokens).expect("serialize tokens");
        let parsed: ProviderTokenSet = from_str(&json).expect("deserialize tokens");
        assert_eq!(tokens, parsed);
    }

    #[test]
    fn missing_refresh_token_is_tolerated() {
        let parsed: ProviderTokenSet =
            from_str(r#"{"access_token":"a","expires_at":10}"#).expect("deserialize");
        assert!(!parsed.renewable());
    }

    #[test]
    fn expiry_window_checks() {
        let tokens = ProviderTokenSet {
            access_token: "a".into(),
            refresh_token: None,
            expires_at: 10_000,
        };
        assert!(!tokens.is_expired(9_999));
        assert!(tokens.is_expired(10_000));
        assert!(tokens.close_to_expiry(5_001, 5_000));
        assert!(!tokens.close_to_expiry(4_999, 5_000));
    }

    #[test]
    fn exchange_response_roundtrip() {
        let response = ExchangeResponse {
            tokens: sample_tokens(),
            user: sample_profile(),
            db_token: Some("T1".to_owned()),
        };
        let json = to_string(&response).expect("serialize response");
        let parsed: ExchangeResponse = from_str(&json).expect("deserialize response");
        assert_eq!(response, parsed);
    }

    #[test]
    fn db_token_absent_when_linking_degraded() {
        let json = to_string(&ExchangeResponse {
            tokens: sample_tokens(),
            user: sample_profile(),
            db_token: None,
        })
        .expect("serialize");
        assert!(!json.contains("db_token"));
    }
}
