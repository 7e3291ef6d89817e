//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use passgate_core::auth::AuthError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Auth failure carrying its stable code.
    #[error("{code}: {message}")]
    Auth {
        status: StatusCode,
        code: &'static str,
        message: String,
    },

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", m.as_str()),
            AppError::Auth {
                status,
                code,
                message,
            } => (*status, *code, message.as_str()),
            AppError::Internal(detail) => {
                error!(detail = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        let status = match &e {
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::InvalidCredentials
            | AuthError::InvalidRefreshToken
            | AuthError::InvalidAccessToken => StatusCode::UNAUTHORIZED,
            AuthError::EmailTaken => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::Validation(m) => return AppError::Validation(m.clone()),
            AuthError::Store(_) | AuthError::Crypto(_) | AuthError::Internal(_) => {
                return AppError::Internal(e.to_string());
            }
        };
        AppError::Auth {
            status,
            code: e.code(),
            message: e.to_string(),
        }
    }
}
