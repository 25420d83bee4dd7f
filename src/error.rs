use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient store error: {0}")]
    TransientStore(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),
}

impl AppError {
    /// Retryable errors may succeed on a later attempt; everything else is
    /// a definitive answer for the current call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientStore(_))
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::Unauthorized => 401,
            AppError::Permission(_) => 403,
            AppError::NotFound => 404,
            AppError::Conflict(_) => 409,
            AppError::TransientStore(_) => 503,
            AppError::Config(_) | AppError::StartServer(_) => 500,
        }
    }

    /// Stable machine-readable code for clients and websocket error frames.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Permission(_) => "PERMISSION_DENIED",
            AppError::NotFound => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::TransientStore(_) => "STORE_UNAVAILABLE",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Config(_) | AppError::StartServer(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    pub status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_store_errors_are_retryable() {
        assert!(AppError::TransientStore("pool timeout".into()).is_retryable());
        assert!(!AppError::Validation("bad".into()).is_retryable());
        assert!(!AppError::Conflict("dup".into()).is_retryable());
        assert!(!AppError::NotFound.is_retryable());
    }

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(AppError::Validation("x".into()).status_code(), 400);
        assert_eq!(AppError::Permission("x".into()).status_code(), 403);
        assert_eq!(AppError::NotFound.status_code(), 404);
        assert_eq!(AppError::Conflict("x".into()).status_code(), 409);
        assert_eq!(AppError::TransientStore("x".into()).status_code(), 503);
    }
}
