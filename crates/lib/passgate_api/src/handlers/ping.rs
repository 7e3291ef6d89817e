//! Liveness endpoint.

/// `GET /api/ping`: returns `pong`.
pub async fn ping() -> &'static str {
    "pong"
}
