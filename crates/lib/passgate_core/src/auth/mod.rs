//! Authentication and token lifecycle.
//!
//! Passcode issuance, passcode verification, opaque access tokens and
//! encrypted refresh tokens. `AuthService` wires the pieces together and is
//! what the HTTP layer talks to.

pub mod access_tokens;
pub mod matcher;
pub mod passcode;
pub mod refresh;
pub mod service;
pub mod verifier;

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::store::StoreError;

pub use service::AuthService;

/// Authentication errors.
///
/// The first four variants are what callers of credential checks ever see;
/// the reason behind a rejection is only logged.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User not found")]
    UserNotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Invalid access token")]
    InvalidAccessToken,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AuthError::InvalidAccessToken => "INVALID_ACCESS_TOKEN",
            AuthError::EmailTaken => "EMAIL_TAKEN",
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::Store(_) | AuthError::Crypto(_) | AuthError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }
}
