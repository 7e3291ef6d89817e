//! API server configuration.

use passgate_core::config::{AuthConfig, ConfigError, resolve_app_key};

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3333").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Key for refresh token encryption.
    pub app_key: String,
    /// Auth flow settings.
    pub auth: AuthConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable       | Default                                |
    /// |----------------|----------------------------------------|
    /// | `BIND_ADDR`    | `127.0.0.1:3333`                       |
    /// | `DATABASE_URL` | `postgres://localhost:5432/passgate`   |
    /// | `APP_KEY`      | generated & persisted to file          |
    ///
    /// Auth settings come from [`AuthConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3333".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/passgate".into()),
            app_key: resolve_app_key(),
            auth: AuthConfig::from_env()?,
        })
    }
}
