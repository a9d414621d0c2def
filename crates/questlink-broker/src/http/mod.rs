pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::{accounts::AccountDirectory, provider::ProviderClient};

#[derive(Clone)]
pub struct AppContext {
    pub provider: Arc<ProviderClient>,
    pub directory: Arc<dyn AccountDirectory>,
}

pub type SharedContext = Arc<AppContext>;

pub fn router(context: SharedContext) -> Router {
    Router::new()
        .route("/auth/exchange", post(handlers::exchange::exchange))
        .route("/auth/refresh", post(handlers::refresh::refresh))
        .route("/healthz", get(handlers::status::healthz))
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(context)
}
