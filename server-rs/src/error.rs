use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::store::StoreError;

/// Outcome of a rejected clan operation. Business-rule violations are the
/// first four variants; `Storage` is the only unexpected one.
#[derive(Debug, thiserror::Error)]
pub enum ClanError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Not allowed: {0}")]
    Unauthorized(&'static str),

    #[error("Conflict: {0}")]
    Conflict(&'static str),

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

pub type ClanResult<T> = Result<T, ClanError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl From<ClanError> for AppError {
    fn from(err: ClanError) -> Self {
        match err {
            ClanError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            ClanError::Unauthorized(msg) => AppError::Forbidden(msg.into()),
            ClanError::Conflict(msg) | ClanError::InvalidState(msg) => {
                AppError::BadRequest(msg.into())
            }
            ClanError::Storage(e) => AppError::Storage(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests".to_string(),
            ),
            AppError::Storage(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Jwt(_) => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),
        };

        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
