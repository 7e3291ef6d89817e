//! # passgate_api
//!
//! HTTP API library for Passgate.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use axum::Router;
use axum::routing::{delete, get, post};
use passgate_core::auth::AuthService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{auth, ping};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Auth flows over the configured credential store.
    pub auth: AuthService,
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/api/ping", get(ping::ping))
        .route("/api/auth/signup", post(auth::signup_handler))
        .route("/api/auth/passcode", post(auth::passcode_handler))
        .route("/api/auth/login", post(auth::login_handler));

    // Protected routes (require a bearer access token)
    let protected = Router::new()
        .route("/api/auth/refresh", post(auth::refresh_handler))
        .route("/api/auth/logout", delete(auth::logout_handler))
        .route("/api/auth/me", get(auth::me_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
