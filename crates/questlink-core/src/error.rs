use thiserror::Error;

/// Failures surfaced by the login and refresh flows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The `state` returned by the provider disagrees with the stored CSRF
    /// state. The flow is aborted before any exchange call is made.
    #[error("callback state does not match the stored login state")]
    CsrfMismatch,
    /// The flow-scoped verifier is gone: the flow was started in a different
    /// context or storage was cleared. Restarting the login recovers.
    #[error("login flow expired before the callback completed")]
    SessionExpired,
    /// The provider rejected the code/verifier pair or the identity fetch
    /// failed. No partial state is persisted.
    #[error("code exchange failed: {0}")]
    ExchangeFailed(String),
    /// Provider authentication succeeded but the account lookup/creation on
    /// the application side did not produce a session token.
    #[error("account linking degraded: {0}")]
    LinkingDegraded(String),
    /// The refresh token was rejected. Provider capability is dropped; the
    /// application session is preserved.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    /// A bounded-time upstream call did not answer in time.
    #[error("upstream call timed out")]
    NetworkTimeout,
    /// The token store backend failed.
    #[error("token storage error: {0}")]
    Storage(String),
    /// A caller-supplied endpoint or parameter is unusable.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl AuthError {
    /// Transient errors are retried on the next scheduled check rather than
    /// immediately; security failures are never retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::NetworkTimeout | AuthError::RefreshFailed(_) | AuthError::ExchangeFailed(_)
        )
    }
}
