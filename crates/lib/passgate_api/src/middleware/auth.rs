//! Bearer access token guard.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use passgate_core::auth::AuthError;
use passgate_core::models::auth::{ALL_ABILITIES, AccessTokenRecord, User};
use tracing::debug;

use crate::AppState;
use crate::error::AppError;

/// Caller identity stored in request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    /// The access token the request presented.
    pub token: AccessTokenRecord,
}

/// Extract the credentials of a `Bearer` authorization header. The scheme
/// name is case-insensitive.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Axum middleware: extracts `Authorization: Bearer <token>`, resolves it to
/// a live session token (one carrying `*`) and injects `AuthenticatedUser`
/// into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(header) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        debug!("missing authorization header");
        return Err(AuthError::InvalidAccessToken.into());
    };

    let Some(token) = bearer_token(header) else {
        debug!("unsupported authorization scheme");
        return Err(AuthError::InvalidAccessToken.into());
    };

    let (user, token) = state.auth.authenticate(token).await?;
    if !token.can(ALL_ABILITIES) {
        debug!(token_id = token.id, "token lacks session ability");
        return Err(AuthError::InvalidAccessToken.into());
    }
    request
        .extensions_mut()
        .insert(AuthenticatedUser { user, token });

    Ok(next.run(request).await)
}
