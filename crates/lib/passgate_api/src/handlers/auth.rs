//! Authentication request handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use passgate_core::models::auth::{AccessTokenView, SessionUserView, UserView};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    LoginRequest, LoginResponse, LogoutResponse, PasscodeRequest, PasscodeResponse,
    RefreshRequest, RefreshResponse, SignupRequest,
};

/// `POST /api/auth/signup`: register a user.
pub async fn signup_handler(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<UserView>)> {
    let user = state
        .auth
        .signup(&body.email, &body.first_name, &body.last_name)
        .await?;
    Ok((StatusCode::CREATED, Json(UserView::from(&user))))
}

/// `POST /api/auth/passcode`: issue a one-time passcode and mail it.
pub async fn passcode_handler(
    State(state): State<AppState>,
    Json(body): Json<PasscodeRequest>,
) -> AppResult<Json<PasscodeResponse>> {
    let id = state.auth.request_passcode(&body.email).await?;
    Ok(Json(PasscodeResponse { id }))
}

/// `POST /api/auth/login`: exchange email + passcode for a token pair.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let outcome = state.auth.login(&body.email, &body.passcode).await?;
    let user = SessionUserView::from(&outcome);
    Ok(Json(LoginResponse {
        access_token: AccessTokenView::from(&outcome.access_token),
        refresh_token: outcome.refresh_token,
        user,
    }))
}

/// `POST /api/auth/refresh`: rotate the session behind a refresh token.
pub async fn refresh_handler(
    State(state): State<AppState>,
    axum::Extension(caller): axum::Extension<AuthenticatedUser>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<RefreshResponse>> {
    let pair = state
        .auth
        .refresh(&body.refresh_token, Some(&caller.token))
        .await?;
    Ok(Json(RefreshResponse {
        access_token: AccessTokenView::from(&pair.access_token),
        refresh_token: pair.refresh_token,
    }))
}

/// `DELETE /api/auth/logout`: revoke the presented access token.
pub async fn logout_handler(
    State(state): State<AppState>,
    axum::Extension(caller): axum::Extension<AuthenticatedUser>,
) -> Json<LogoutResponse> {
    state.auth.logout(&caller.user, caller.token.id).await;
    Json(LogoutResponse { logged_out: true })
}

/// `GET /api/auth/me`: the authenticated user.
pub async fn me_handler(
    axum::Extension(caller): axum::Extension<AuthenticatedUser>,
) -> Json<UserView> {
    Json(UserView::from(&caller.user))
}
