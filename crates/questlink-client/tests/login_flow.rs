use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Json, Router,
    extract::State,
    routing::post,
};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use url::Url;

use questlink_client::{
    AuthorizeEndpoint, BrokerClient, ExchangeApi, HostEnvironment, RefreshScheduler, TokenStore,
    callback::{CallbackParams, complete_login},
};
use questlink_core::{error::AuthError, types::{ProviderTokenSet, now_millis}};

struct StubBroker {
    base_url: String,
    exchange_bodies: Arc<Mutex<Vec<Value>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

#[derive(Clone)]
struct BrokerState {
    exchange_bodies: Arc<Mutex<Vec<Value>>>,
    exchange_response: Arc<Value>,
    refresh_response: Arc<Value>,
}

async fn exchange_handler(
    State(state): State<BrokerState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .exchange_bodies
        .lock()
        .expect("bodies lock")
        .push(body);
    Json((*state.exchange_response).clone())
}

async fn refresh_handler(State(state): State<BrokerState>) -> Json<Value> {
    Json((*state.refresh_response).clone())
}

impl StubBroker {
    async fn start(exchange_response: Value, refresh_response: Value) -> Self {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("listener addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let exchange_bodies = Arc::new(Mutex::new(Vec::new()));
        let state = BrokerState {
            exchange_bodies: Arc::clone(&exchange_bodies),
            exchange_response: Arc::new(exchange_response),
            refresh_response: Arc::new(refresh_response),
        };

        let app = Router::new()
            .route("/auth/exchange", post(exchange_handler))
            .route("/auth/refresh", post(refresh_handler))
            .with_state(state);

        let server = axum::serve(listener, app.into_make_service());
        tokio::spawn(async move {
            let _ = server
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Self {
            base_url: format!("http://{addr}/"),
            exchange_bodies,
            shutdown: Some(shutdown_tx),
        }
    }

    fn client(&self) -> BrokerClient {
        BrokerClient::builder()
            .base_url(&self.base_url)
            .expect("base url")
            .timeout(Duration::from_secs(5))
            .build()
            .expect("client")
    }
}

impl Drop for StubBroker {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn authorize_endpoint() -> AuthorizeEndpoint {
    AuthorizeEndpoint {
        auth_url: "https://provider.example.com/oauth/authorize".into(),
        client_id: "client-123".into(),
        redirect_uri: "https://app.example.com/callback".into(),
        scopes: vec!["users.read".into()],
    }
}

fn exchange_success(expires_at: u64) -> Value {
    json!({
        "tokens": {
            "access_token": "provider-access",
            "refresh_token": "provider-refresh",
            "expires_at": expires_at
        },
        "user": {
            "handle": "alice",
            "display_name": "Alice",
            "verified": true
        },
        "db_token": "session-T1"
    })
}

#[tokio::test]
async fn full_login_flow_persists_both_lifecycles() {
    let expires_at = now_millis() + 3_600_000;
    let broker = StubBroker::start(
        exchange_success(expires_at),
        json!({ "tokens": { "access_token": "renewed", "expires_at": expires_at } }),
    )
    .await;
    let api = broker.client();
    let store = TokenStore::in_memory();

    // Kick off the flow and pull code/state off the authorize redirect.
    let authorize_url = authorize_endpoint()
        .begin_login(&store, Some("/quests"), HostEnvironment::Browser)
        .expect("begin login");
    let params: HashMap<_, _> = authorize_url.query_pairs().into_owned().collect();
    let state = params.get("state").expect("state param").clone();

    let callback =
        Url::parse(&format!("https://app.example.com/callback?code=authcode&state={state}"))
            .expect("callback url");
    let callback_params = CallbackParams::from_url(&callback).expect("callback params");

    let completion = complete_login(&store, &api, &callback_params, None)
        .await
        .expect("login completes");

    assert_eq!(completion.return_path.as_deref(), Some("/quests"));

    let tokens = store.provider_tokens().expect("get").expect("present");
    assert_eq!(tokens.access_token, "provider-access");
    assert!(tokens.expires_at > now_millis());
    assert_eq!(
        store
            .session_token()
            .expect("get")
            .map(|t| t.as_str().to_owned()),
        Some("session-T1".to_owned())
    );

    // The broker saw the verifier that was stashed at initiation, exactly once.
    let bodies = broker.exchange_bodies.lock().expect("bodies lock").clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["state"], state.as_str());
    assert!(
        bodies[0]["verifier"]
            .as_str()
            .is_some_and(|verifier| !verifier.is_empty())
    );

    // The one-time flow keys are gone.
    assert!(store.take_flow_verifier().expect("take").is_none());
    assert!(store.take_flow_state().expect("take").is_none());
}

#[tokio::test]
async fn scheduler_refreshes_through_the_broker() {
    let expires_at = now_millis() + 3_600_000;
    let broker = StubBroker::start(
        exchange_success(expires_at),
        json!({ "tokens": { "access_token": "renewed", "expires_at": expires_at } }),
    )
    .await;
    let store = TokenStore::in_memory();
    store
        .set_provider_tokens(&ProviderTokenSet {
            access_token: "stale".into(),
            refresh_token: Some("refresh-1".into()),
            expires_at: now_millis() + 60_000,
        })
        .expect("seed");

    let scheduler = RefreshScheduler::new(store.clone(), Arc::new(broker.client()));
    scheduler.ensure_valid_token().await;

    let tokens = store.provider_tokens().expect("get").expect("present");
    assert_eq!(tokens.access_token, "renewed");
    // The broker response carried no refresh token; the old one survives.
    assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn slow_broker_surfaces_a_timeout() {
    async fn stalled() -> Json<Value> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Json(json!({}))
    }

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("listener addr");
    let app = Router::new().route("/auth/refresh", post(stalled));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });

    let api = BrokerClient::builder()
        .base_url(format!("http://{addr}/"))
        .expect("base url")
        .timeout(Duration::from_millis(100))
        .build()
        .expect("client");

    let err = api.refresh("refresh-1").await.expect_err("times out");
    assert_eq!(err, AuthError::NetworkTimeout);
}
