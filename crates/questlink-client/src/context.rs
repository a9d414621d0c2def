use std::{sync::Arc, time::Duration};

use tokio::sync::watch;
use tracing::warn;
use url::Url;

use questlink_core::{error::AuthError, keys, types::IdentityProfile};

use crate::{
    api::ExchangeApi,
    callback::{CallbackParams, CallbackPhase, LoginCompletion, complete_login},
    host::{HostDetector, HostEnvironment},
    initiate::AuthorizeEndpoint,
    refresh::RefreshScheduler,
    store::{StoreOp, TokenStore},
};

const DEFAULT_DISMISS_AFTER: Duration = Duration::from_secs(4);

/// Authentication state as the rest of the application sees it.
///
/// `authenticated` derives strictly from the presence of the application
/// session token; provider-token expiry never flips it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub profile: Option<IdentityProfile>,
    pub authenticated: bool,
    pub phase: CallbackPhase,
}

/// Reactive shell over the whole flow: owns the store subscription, exposes
/// login/logout/refresh and publishes [`AuthSnapshot`]s on a watch channel.
pub struct AuthContext {
    store: TokenStore,
    api: Arc<dyn ExchangeApi>,
    authorize: AuthorizeEndpoint,
    host: HostEnvironment,
    scheduler: Arc<RefreshScheduler>,
    snapshot: Arc<watch::Sender<AuthSnapshot>>,
    dismiss_after: Duration,
}

impl AuthContext {
    pub fn new(
        store: TokenStore,
        api: Arc<dyn ExchangeApi>,
        authorize: AuthorizeEndpoint,
        detector: &dyn HostDetector,
    ) -> Arc<Self> {
        Self::with_dismiss_after(store, api, authorize, detector, DEFAULT_DISMISS_AFTER)
    }

    pub fn with_dismiss_after(
        store: TokenStore,
        api: Arc<dyn ExchangeApi>,
        authorize: AuthorizeEndpoint,
        detector: &dyn HostDetector,
        dismiss_after: Duration,
    ) -> Arc<Self> {
        let host = detector.detect();
        let scheduler = RefreshScheduler::new(store.clone(), Arc::clone(&api));
        let (snapshot, _) = watch::channel(AuthSnapshot::default());
        let context = Arc::new(Self {
            store,
            api,
            authorize,
            host,
            scheduler,
            snapshot: Arc::new(snapshot),
            dismiss_after,
        });
        context.hydrate();
        context.spawn_store_listener();
        context
    }

    /// Observe authentication state changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot.borrow().authenticated
    }

    pub fn profile(&self) -> Option<IdentityProfile> {
        self.snapshot.borrow().profile.clone()
    }

    pub fn host(&self) -> HostEnvironment {
        self.host
    }

    /// The refresh scheduler bound to this context's store and API. The
    /// single-flight guard lives inside it, so every trigger (mount hook,
    /// worker tick, visibility) goes through the same instance.
    pub fn scheduler(&self) -> Arc<RefreshScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Run the periodic freshness worker for the life of this context. The
    /// first tick fires immediately, covering the mount check.
    pub fn spawn_refresh_worker(&self) -> tokio::task::JoinHandle<()> {
        Arc::clone(&self.scheduler).spawn()
    }

    /// Start a login attempt; the caller navigates to the returned URL.
    pub fn login(&self, return_path: Option<&str>) -> Result<Url, AuthError> {
        self.authorize.begin_login(&self.store, return_path, self.host)
    }

    /// Full sign-out: both the provider token set and the application
    /// session token are dropped, unlike the refresh scheduler's
    /// partial clear on failure.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.clear_provider_tokens()?;
        self.store.clear_session_token()?;
        self.hydrate();
        Ok(())
    }

    /// Reload the cached identity snapshot from the store.
    pub fn refresh_user(&self) {
        self.hydrate();
    }

    /// Drive the callback state machine when the URL carries a redirect-back
    /// marker. Returns `None` for ordinary navigations. The transient
    /// success/error phase auto-dismisses after a fixed delay.
    pub async fn handle_redirect(
        &self,
        url: &Url,
        referral_code: Option<&str>,
    ) -> Option<Result<LoginCompletion, AuthError>> {
        let params = CallbackParams::from_url(url)?;

        self.set_phase(CallbackPhase::Verifying);
        let result = complete_login(&self.store, self.api.as_ref(), &params, referral_code).await;

        match &result {
            Ok(_) => {
                self.hydrate();
                self.set_phase(CallbackPhase::Success);
            }
            Err(err) => {
                self.set_phase(CallbackPhase::Error(err.to_string()));
            }
        }
        self.spawn_phase_dismiss();

        Some(result)
    }

    fn hydrate(&self) {
        let profile = self.store.identity_profile().unwrap_or_else(|err| {
            warn!(target: "auth.context", error = %err, "profile read failed");
            None
        });
        let authenticated = self
            .store
            .session_token()
            .unwrap_or_else(|err| {
                warn!(target: "auth.context", error = %err, "session read failed");
                None
            })
            .is_some();

        self.snapshot.send_modify(|snapshot| {
            snapshot.profile = profile;
            snapshot.authenticated = authenticated;
        });
    }

    fn set_phase(&self, phase: CallbackPhase) {
        self.snapshot.send_modify(|snapshot| snapshot.phase = phase);
    }

    fn spawn_phase_dismiss(&self) {
        let snapshot = Arc::clone(&self.snapshot);
        let delay = self.dismiss_after;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            snapshot.send_modify(|value| {
                if matches!(value.phase, CallbackPhase::Success | CallbackPhase::Error(_)) {
                    value.phase = CallbackPhase::Idle;
                }
            });
        });
    }

    /// React to store mutations, including those made by sibling contexts
    /// sharing the same storage: an external removal of the session token
    /// flips the state to unauthenticated without a reload.
    fn spawn_store_listener(&self) {
        let mut events = self.store.subscribe();
        let store = self.store.clone();
        let snapshot = Arc::clone(&self.snapshot);
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(target: "auth.context", skipped, "store events lagged");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };

                match event.key.as_str() {
                    keys::SESSION_TOKEN => {
                        let authenticated = event.op == StoreOp::Set;
                        snapshot.send_modify(|value| value.authenticated = authenticated);
                    }
                    keys::IDENTITY_PROFILE => {
                        let profile = store.identity_profile().unwrap_or_default();
                        snapshot.send_modify(|value| value.profile = profile);
                    }
                    _ => {}
                }
            }
        });
    }
}
