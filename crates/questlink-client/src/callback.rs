use url::Url;

use questlink_core::{
    error::AuthError,
    types::{ExchangeRequest, SessionToken},
};

use crate::{api::ExchangeApi, store::TokenStore};

/// Transient state surfaced to the UI while a callback is processed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallbackPhase {
    #[default]
    Idle,
    Verifying,
    Success,
    Error(String),
}

/// `code` and `state` query parameters from the provider's redirect back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

impl CallbackParams {
    /// Detect a redirect-back URL. Returns `None` when either parameter is
    /// missing, in which case the URL is not a callback.
    pub fn from_url(url: &Url) -> Option<Self> {
        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                _ => {}
            }
        }
        Some(Self {
            code: code?,
            state: state?,
        })
    }
}

/// Outcome of a completed callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCompletion {
    /// Navigation path stashed by the initiator, consumed here.
    pub return_path: Option<String>,
    /// True when the callback was a duplicate of an already-completed login
    /// and no exchange was performed.
    pub replayed: bool,
}

/// Drive the callback exchange.
///
/// The stored verifier and CSRF state are deleted before any network I/O so
/// a retried or duplicated invocation can never reuse a consumed verifier.
/// `CsrfMismatch` and `SessionExpired` are terminal for the attempt; the
/// user restarts from `begin_login`.
pub async fn complete_login(
    store: &TokenStore,
    api: &dyn ExchangeApi,
    params: &CallbackParams,
    referral_code: Option<&str>,
) -> Result<LoginCompletion, AuthError> {
    // Replayed callback for a session that already exists: succeed without
    // touching the exchange endpoint again.
    if store.session_token()?.is_some() {
        tracing::debug!(target: "auth.callback", "session already established, skipping exchange");
        return Ok(LoginCompletion {
            return_path: store.take_return_path()?,
            replayed: true,
        });
    }

    // Consume the one-time flow keys up front, whatever happens next.
    let verifier = store.take_flow_verifier()?;
    let stored_state = store.take_flow_state()?;

    let verifier = match verifier {
        Some(value) => value,
        None => return Err(AuthError::SessionExpired),
    };

    match stored_state {
        Some(stored) if stored != params.state => return Err(AuthError::CsrfMismatch),
        Some(_) => {}
        // A partially cleared store can legitimately lose the state while the
        // verifier survives (expired-session recovery); proceed on the
        // verifier alone but record the anomaly.
        None => {
            tracing::warn!(
                target: "auth.callback",
                "stored login state missing, proceeding on verifier alone"
            );
        }
    }

    let request = ExchangeRequest {
        code: params.code.clone(),
        verifier,
        state: params.state.clone(),
        referral_code: referral_code.map(|value| value.to_string()),
    };

    let response = api.exchange(&request).await?;

    store.set_provider_tokens(&response.tokens)?;
    store.set_identity_profile(&response.user)?;
    if let Some(db_token) = &response.db_token {
        store.set_session_token(&SessionToken::new(db_token.clone()))?;
    } else {
        tracing::warn!(
            target: "auth.callback",
            handle = %response.user.handle,
            "provider login succeeded without an application session"
        );
    }

    Ok(LoginCompletion {
        return_path: store.take_return_path()?,
        replayed: false,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use questlink_core::types::{
        ExchangeResponse, IdentityProfile, ProviderTokenSet, now_millis,
    };

    use super::*;

    struct StubApi {
        exchanges: AtomicUsize,
        requests: Mutex<Vec<ExchangeRequest>>,
        response: Result<ExchangeResponse, AuthError>,
    }

    impl StubApi {
        fn returning(response: Result<ExchangeResponse, AuthError>) -> Self {
            Self {
                exchanges: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                response,
            }
        }

        fn exchange_count(&self) -> usize {
            self.exchanges.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExchangeApi for StubApi {
        async fn exchange(
            &self,
            request: &ExchangeRequest,
        ) -> Result<ExchangeResponse, AuthError> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            self.requests
                .lock()
                .expect("requests lock")
                .push(request.clone());
            self.response.clone()
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<ProviderTokenSet, AuthError> {
            Err(AuthError::RefreshFailed("not under test".into()))
        }
    }

    fn success_response() -> ExchangeResponse {
        ExchangeResponse {
            tokens: ProviderTokenSet {
                access_token: "provider-access".into(),
                refresh_token: Some("provider-refresh".into()),
                expires_at: now_millis() + 3_600_000,
            },
            user: IdentityProfile {
                handle: "alice".into(),
                display_name: "Alice".into(),
                avatar_url: None,
                verified: false,
                followers: Some(7),
            },
            db_token: Some("session-T1".into()),
        }
    }

    fn params() -> CallbackParams {
        CallbackParams {
            code: "authcode".into(),
            state: "state-xyz".into(),
        }
    }

    #[test]
    fn params_detected_only_when_both_present() {
        let full = Url::parse("https://app.example.com/cb?code=c&state=s").expect("url");
        assert_eq!(
            CallbackParams::from_url(&full),
            Some(CallbackParams {
                code: "c".into(),
                state: "s".into()
            })
        );

        let partial = Url::parse("https://app.example.com/cb?code=c").expect("url");
        assert_eq!(CallbackParams::from_url(&partial), None);
    }

    #[tokio::test]
    async fn matching_state_completes_and_persists() {
        let store = TokenStore::in_memory();
        store.stash_flow("verifier-1", "state-xyz").expect("stash");
        store.set_return_path("/quests").expect("path");
        let api = StubApi::returning(Ok(success_response()));

        let completion = complete_login(&store, &api, &params(), None)
            .await
            .expect("login");

        assert_eq!(completion.return_path.as_deref(), Some("/quests"));
        assert!(!completion.replayed);
        assert_eq!(api.exchange_count(), 1);

        let tokens = store.provider_tokens().expect("get").expect("present");
        assert!(tokens.expires_at > now_millis());
        assert_eq!(
            store
                .session_token()
                .expect("get")
                .map(|t| t.as_str().to_owned()),
            Some("session-T1".to_owned())
        );
        assert_eq!(
            store.identity_profile().expect("get").map(|p| p.handle),
            Some("alice".to_owned())
        );

        let sent = api.requests.lock().expect("lock")[0].clone();
        assert_eq!(sent.verifier, "verifier-1");
        assert_eq!(sent.state, "state-xyz");
    }

    #[tokio::test]
    async fn state_mismatch_never_reaches_the_exchange() {
        let store = TokenStore::in_memory();
        store.stash_flow("verifier-1", "xyz").expect("stash");
        let api = StubApi::returning(Ok(success_response()));

        let err = complete_login(
            &store,
            &api,
            &CallbackParams {
                code: "authcode".into(),
                state: "abc".into(),
            },
            None,
        )
        .await
        .expect_err("must fail");

        assert_eq!(err, AuthError::CsrfMismatch);
        assert_eq!(api.exchange_count(), 0);
    }

    #[tokio::test]
    async fn missing_verifier_is_session_expired() {
        let store = TokenStore::in_memory();
        let api = StubApi::returning(Ok(success_response()));

        let err = complete_login(&store, &api, &params(), None)
            .await
            .expect_err("must fail");

        assert_eq!(err, AuthError::SessionExpired);
        assert_eq!(api.exchange_count(), 0);
    }

    #[tokio::test]
    async fn consumed_verifier_cannot_be_replayed() {
        let store = TokenStore::in_memory();
        store.stash_flow("verifier-1", "state-xyz").expect("stash");
        let api = StubApi::returning(Err(AuthError::ExchangeFailed("provider down".into())));

        let first = complete_login(&store, &api, &params(), None).await;
        assert_eq!(
            first,
            Err(AuthError::ExchangeFailed("provider down".into()))
        );

        // The verifier was discarded before the failed network call; the
        // retry must not find it.
        let second = complete_login(&store, &api, &params(), None).await;
        assert_eq!(second, Err(AuthError::SessionExpired));
        assert_eq!(api.exchange_count(), 1);
    }

    #[tokio::test]
    async fn missing_stored_state_proceeds_on_verifier_alone() {
        let store = TokenStore::in_memory();
        store.stash_flow("verifier-1", "state-xyz").expect("stash");
        // Simulate a partially cleared store: state gone, verifier intact.
        store.take_flow_state().expect("take");
        let api = StubApi::returning(Ok(success_response()));

        let completion = complete_login(&store, &api, &params(), None)
            .await
            .expect("login");
        assert!(!completion.replayed);
        assert_eq!(api.exchange_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_callback_short_circuits() {
        let store = TokenStore::in_memory();
        store.stash_flow("verifier-1", "state-xyz").expect("stash");
        let api = StubApi::returning(Ok(success_response()));

        complete_login(&store, &api, &params(), None)
            .await
            .expect("first login");
        let replay = complete_login(&store, &api, &params(), None)
            .await
            .expect("replayed login");

        assert!(replay.replayed);
        assert_eq!(api.exchange_count(), 1);
    }

    #[tokio::test]
    async fn degraded_linking_keeps_provider_login_without_session() {
        let store = TokenStore::in_memory();
        store.stash_flow("verifier-1", "state-xyz").expect("stash");
        let mut response = success_response();
        response.db_token = None;
        let api = StubApi::returning(Ok(response));

        complete_login(&store, &api, &params(), None)
            .await
            .expect("login");

        assert!(store.provider_tokens().expect("get").is_some());
        assert!(store.session_token().expect("get").is_none());
    }
}
