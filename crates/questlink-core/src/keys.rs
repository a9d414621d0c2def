//! Key namespace for the client token store. Each concern owns a distinct
//! key so the provider token set and the application session token can be
//! cleared independently.

/// Provider access token.
pub const PROVIDER_ACCESS_TOKEN: &str = "auth/provider/access-token";
/// Provider refresh token.
pub const PROVIDER_REFRESH_TOKEN: &str = "auth/provider/refresh-token";
/// Provider access-token expiry, epoch milliseconds.
pub const PROVIDER_EXPIRES_AT: &str = "auth/provider/expires-at";
/// Cached identity profile snapshot (JSON).
pub const IDENTITY_PROFILE: &str = "auth/provider/profile";

/// Application session token. Lifecycle independent of the provider keys.
pub const SESSION_TOKEN: &str = "auth/session-token";

/// Flow-scoped PKCE verifier, consumed exactly once by the callback.
pub const FLOW_VERIFIER: &str = "auth/flow/pkce-verifier";
/// Flow-scoped CSRF state, consumed alongside the verifier.
pub const FLOW_STATE: &str = "auth/flow/csrf-state";
/// Navigation path to restore after a completed login.
pub const FLOW_RETURN_PATH: &str = "auth/flow/return-path";

/// Execution-environment marker recorded when the flow starts.
pub const HOST_MARKER: &str = "auth/host-environment";
