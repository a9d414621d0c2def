use axum::{Json, extract::State};
use serde::Deserialize;
use tracing::debug;

use questlink_core::types::RefreshResponse;

use crate::http::{SharedContext, error::AppError};

#[derive(Deserialize)]
pub struct RefreshBody {
    pub refresh_token: Option<String>,
}

/// Redeem a refresh token server-side so the confidential client secret
/// never reaches the browser.
pub async fn refresh(
    State(ctx): State<SharedContext>,
    Json(body): Json<RefreshBody>,
) -> Result<Json<RefreshResponse>, AppError> {
    let refresh_token = match body.refresh_token {
        Some(value) if !value.is_empty() => value,
        _ => return Err(AppError::bad_request("missing refresh_token")),
    };

    let tokens = ctx.provider.refresh(&refresh_token).await?;
    debug!(target: "auth.refresh", expires_at = tokens.expires_at, "refresh grant completed");

    Ok(Json(RefreshResponse { tokens }))
}
