use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{accounts::DirectoryError, provider::ProviderCallError};

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<ProviderCallError> for AppError {
    fn from(value: ProviderCallError) -> Self {
        let status = match value {
            ProviderCallError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ProviderCallError::TokenEndpoint { .. }
            | ProviderCallError::IdentityEndpoint { .. }
            | ProviderCallError::InvalidResponse(_)
            | ProviderCallError::Transport(_) => StatusCode::BAD_GATEWAY,
        };
        AppError::new(status, value.to_string())
    }
}

impl From<DirectoryError> for AppError {
    fn from(value: DirectoryError) -> Self {
        let status = match value {
            DirectoryError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        };
        AppError::new(status, value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::internal(value.to_string())
    }
}
