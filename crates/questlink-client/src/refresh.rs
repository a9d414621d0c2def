use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use tracing::{debug, warn};

use questlink_core::{error::AuthError, types::now_millis};

use crate::{api::ExchangeApi, store::TokenStore};

/// Renewal window: refresh once the token is within five minutes of expiry.
pub const REFRESH_THRESHOLD_MILLIS: u64 = 5 * 60 * 1000;

const TICK_INTERVAL_SECS: u64 = 60;

/// Keeps the provider access token fresh for the life of the session.
///
/// Triggers arrive from the mount hook, the periodic worker and the
/// visibility hook; they can interleave between await points, so a single
/// in-flight guard serializes the actual network refresh. A trigger that
/// finds the guard held is a logged no-op.
pub struct RefreshScheduler {
    store: TokenStore,
    api: Arc<dyn ExchangeApi>,
    refresh_in_flight: AtomicBool,
}

impl RefreshScheduler {
    pub fn new(store: TokenStore, api: Arc<dyn ExchangeApi>) -> Arc<Self> {
        Arc::new(Self {
            store,
            api,
            refresh_in_flight: AtomicBool::new(false),
        })
    }

    /// Periodic worker, one tick a minute. Abort the handle to stop it.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(TICK_INTERVAL_SECS));
            loop {
                ticker.tick().await;
                self.ensure_valid_token().await;
            }
        })
    }

    /// Hook for the host regaining visibility or focus.
    pub async fn on_visibility_regained(&self) {
        self.ensure_valid_token().await;
    }

    /// Check freshness and refresh when warranted. Errors degrade rather
    /// than propagate: a failed refresh drops the provider token set and
    /// profile, never the application session.
    pub async fn ensure_valid_token(&self) {
        let refresh_token = match self.store.provider_refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(err) => {
                warn!(target: "auth.refresh", error = %err, "token store read failed");
                return;
            }
        };

        let tokens = match self.store.provider_tokens() {
            Ok(value) => value,
            Err(err) => {
                warn!(target: "auth.refresh", error = %err, "token store read failed");
                return;
            }
        };

        let now = now_millis();
        let due = match &tokens {
            // Valid token: renew only inside the expiry window.
            Some(set) if !set.is_expired(now) => {
                set.close_to_expiry(now, REFRESH_THRESHOLD_MILLIS)
            }
            // Missing or expired with a refresh token on hand: silent
            // refresh, covering a browser reopened past expiry.
            _ => true,
        };
        if !due {
            return;
        }

        if self
            .refresh_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(target: "auth.refresh", "refresh already in flight, skipping trigger");
            return;
        }

        let result = self.refresh_access_token(&refresh_token).await;
        self.refresh_in_flight.store(false, Ordering::Release);

        if let Err(err) = result {
            // A timeout is not an authoritative rejection; keep the token set
            // and let the next scheduled check retry.
            if matches!(err, AuthError::NetworkTimeout) {
                warn!(target: "auth.refresh", "refresh timed out, retrying on the next check");
                return;
            }
            warn!(target: "auth.refresh", error = %err, "refresh failed, dropping provider tokens");
            if let Err(err) = self.store.clear_provider_tokens() {
                warn!(target: "auth.refresh", error = %err, "failed to clear provider tokens");
            }
        }
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<(), AuthError> {
        let mut tokens = self.api.refresh(refresh_token).await?;
        // Providers that do not rotate the refresh token omit it from the
        // response; carry the old one forward.
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }
        self.store.set_provider_tokens(&tokens)?;
        debug!(target: "auth.refresh", expires_at = tokens.expires_at, "provider token refreshed");
        Ok(())
    }
}
