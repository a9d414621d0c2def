use axum::{Json, extract::State};
use serde::Deserialize;
use tracing::{info, warn};

use questlink_core::types::ExchangeResponse;

use crate::{
    accounts::resolve_session_token,
    http::{SharedContext, error::AppError},
};

#[derive(Deserialize)]
pub struct ExchangeBody {
    pub code: Option<String>,
    pub verifier: Option<String>,
    pub state: Option<String>,
    pub referral_code: Option<String>,
}

/// Exchange an authorization code for provider tokens, fetch the identity
/// profile and link it to an application account.
///
/// Account linking is best-effort: when the directory is unreachable the
/// provider login still succeeds and the response simply omits `db_token`,
/// to be retried on the next load.
pub async fn exchange(
    State(ctx): State<SharedContext>,
    Json(body): Json<ExchangeBody>,
) -> Result<Json<ExchangeResponse>, AppError> {
    let code = require(body.code, "code")?;
    let verifier = require(body.verifier, "verifier")?;
    require(body.state, "state")?;

    let tokens = ctx.provider.exchange_code(&code, &verifier).await?;
    let user = ctx.provider.fetch_identity(&tokens.access_token).await?;

    let db_token =
        match resolve_session_token(ctx.directory.as_ref(), &user, body.referral_code.as_deref())
            .await
        {
            Ok(token) => token,
            Err(err) => {
                warn!(
                    target: "auth.exchange",
                    handle = %user.handle,
                    error = %err,
                    "account linking degraded, completing login without a session"
                );
                None
            }
        };

    if let Some(token) = &db_token
        && let Err(err) = ctx.directory.update(&user, token).await
    {
        warn!(
            target: "auth.exchange",
            handle = %user.handle,
            error = %err,
            "profile update failed, ignoring"
        );
    }

    info!(
        target: "auth.exchange",
        handle = %user.handle,
        linked = db_token.is_some(),
        "code exchange completed"
    );

    Ok(Json(ExchangeResponse {
        tokens,
        user,
        db_token,
    }))
}

fn require(value: Option<String>, name: &str) -> Result<String, AppError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::bad_request(format!("missing {name}"))),
    }
}
