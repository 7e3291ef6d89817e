//! Authentication configuration.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Duration;
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use thiserror::Error;
use tracing::{info, warn};

/// Default access token lifetime for a passcode login.
pub const DEFAULT_ACCESS_TOKEN_EXPIRES_IN: &str = "30d";

/// Default sender address for passcode mail.
pub const DEFAULT_EMAIL_FROM: &str = "no-reply@localhost";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid duration in {var} ('{value}'): {reason}")]
    InvalidDuration {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Test,
    Production,
}

impl AppEnv {
    pub fn is_production(&self) -> bool {
        *self == AppEnv::Production
    }
}

impl FromStr for AppEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(AppEnv::Development),
            "test" => Ok(AppEnv::Test),
            "production" | "prod" => Ok(AppEnv::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Settings consumed by the auth flows.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub app_env: AppEnv,
    /// Lifetime of the access token minted at login.
    pub access_token_expires_in: Duration,
    /// Fixed passcode for local development. Ignored in production.
    pub debug_passcode: Option<String>,
    /// Sender address for passcode mail.
    pub email_from: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            app_env: AppEnv::Development,
            access_token_expires_in: Duration::days(30),
            debug_passcode: None,
            email_from: DEFAULT_EMAIL_FROM.to_string(),
        }
    }
}

impl AuthConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                        | Default              |
    /// |---------------------------------|----------------------|
    /// | `APP_ENV`                       | `development`        |
    /// | `AUTH_ACCESS_TOKEN_EXPIRES_IN`  | `30d` (humantime)    |
    /// | `AUTH_DEBUG_PASSCODE`           | unset                |
    /// | `EMAIL_FROM`                    | `no-reply@localhost` |
    ///
    /// An unrecognised `APP_ENV` is treated as production.
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_env = match std::env::var("APP_ENV") {
            Ok(v) => v.parse().unwrap_or_else(|e| {
                warn!(error = %e, "treating APP_ENV as production");
                AppEnv::Production
            }),
            Err(_) => AppEnv::Development,
        };

        let expires_raw = std::env::var("AUTH_ACCESS_TOKEN_EXPIRES_IN")
            .unwrap_or_else(|_| DEFAULT_ACCESS_TOKEN_EXPIRES_IN.into());
        let access_token_expires_in = parse_duration("AUTH_ACCESS_TOKEN_EXPIRES_IN", &expires_raw)?;

        let debug_passcode = std::env::var("AUTH_DEBUG_PASSCODE")
            .ok()
            .filter(|v| !v.is_empty());

        let email_from =
            std::env::var("EMAIL_FROM").unwrap_or_else(|_| DEFAULT_EMAIL_FROM.into());

        Ok(Self {
            app_env,
            access_token_expires_in,
            debug_passcode,
            email_from,
        })
    }

    /// The debug passcode, if one is configured and honoured in this environment.
    pub fn effective_debug_passcode(&self) -> Option<&str> {
        if self.app_env.is_production() {
            return None;
        }
        self.debug_passcode.as_deref().filter(|p| !p.is_empty())
    }
}

/// Parse a humantime duration (`30d`, `3days`, `15m`) into a chrono duration.
pub fn parse_duration(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidDuration {
        var,
        value: value.to_string(),
        reason,
    };
    let std_duration = humantime::parse_duration(value.trim()).map_err(|e| invalid(e.to_string()))?;
    if std_duration.is_zero() {
        return Err(invalid("must be greater than zero".into()));
    }
    Duration::from_std(std_duration).map_err(|e| invalid(e.to_string()))
}

/// Resolve the application key: env var `APP_KEY` → persisted file.
///
/// When neither exists a random key is generated and persisted so refresh
/// tokens survive restarts.
pub fn resolve_app_key() -> String {
    if let Ok(key) = std::env::var("APP_KEY")
        && !key.is_empty()
    {
        return key;
    }
    resolve_app_key_at(&app_key_path())
}

/// Read the key persisted at `path`, generating and writing one if missing.
pub fn resolve_app_key_at(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let key: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(path, &key) {
        warn!(path = %path.display(), error = %e, "could not persist generated app key");
    } else {
        info!(path = %path.display(), "generated new app key");
    }
    key
}

/// Path to the persisted application key file.
fn app_key_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("passgate")
        .join("app-key")
}
