//! Opaque bearer access tokens.
//!
//! Wire format: `oat_<base64url(id)>.<secret>`. The id segment locates the
//! row; only the SHA-256 of the secret is stored, so a leaked table cannot be
//! replayed as bearer values.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::AuthError;
use crate::models::auth::{AccessTokenRecord, IssuedAccessToken, NewAccessToken, User};
use crate::store::CredentialStore;

/// Prefix marking access token values.
pub const ACCESS_TOKEN_PREFIX: &str = "oat_";

/// Length of the random secret part.
const SECRET_LEN: usize = 40;

/// Generate a random token secret.
fn generate_secret() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

/// SHA-256 hash a token secret for storage.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Compose the bearer value for token `id`.
fn format_value(id: i64, secret: &str) -> String {
    let id_segment = URL_SAFE_NO_PAD.encode(id.to_string());
    format!("{ACCESS_TOKEN_PREFIX}{id_segment}.{secret}")
}

/// Split a bearer value into `(id, secret)`.
pub fn parse_value(value: &str) -> Option<(i64, &str)> {
    let rest = value.strip_prefix(ACCESS_TOKEN_PREFIX)?;
    let (id_segment, secret) = rest.split_once('.')?;
    if secret.is_empty() {
        return None;
    }
    let id_bytes = URL_SAFE_NO_PAD.decode(id_segment).ok()?;
    let id = std::str::from_utf8(&id_bytes).ok()?.parse::<i64>().ok()?;
    Some((id, secret))
}

/// A token that has been generated but not yet stored.
pub struct PendingAccessToken {
    pub token: NewAccessToken,
    secret: String,
}

impl PendingAccessToken {
    /// Attach the raw value to the stored record.
    pub fn into_issued(self, record: AccessTokenRecord) -> IssuedAccessToken {
        let value = format_value(record.id, &self.secret);
        IssuedAccessToken { record, value }
    }
}

/// Mints, revokes and authenticates access tokens.
#[derive(Clone)]
pub struct AccessTokenManager {
    store: Arc<dyn CredentialStore>,
}

impl AccessTokenManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Generate a token for `user_id` without storing it.
    ///
    /// Callers that need the insert to share a transaction with other writes
    /// pass `pending.token` to the store themselves and finish with
    /// [`PendingAccessToken::into_issued`].
    pub fn prepare(
        &self,
        user_id: &str,
        abilities: Vec<String>,
        name: Option<String>,
        expires_in: Duration,
    ) -> PendingAccessToken {
        let secret = generate_secret();
        PendingAccessToken {
            token: NewAccessToken {
                user_id: user_id.to_string(),
                name,
                hash: hash_secret(&secret),
                abilities,
                expires_at: Utc::now() + expires_in,
            },
            secret,
        }
    }

    /// Create and store a token. The returned value is the only copy.
    pub async fn mint(
        &self,
        user: &User,
        abilities: Vec<String>,
        name: Option<String>,
        expires_in: Duration,
    ) -> Result<IssuedAccessToken, AuthError> {
        let pending = self.prepare(&user.id, abilities, name, expires_in);
        let record = self.store.insert_access_token(pending.token.clone()).await?;
        debug!(user_id = %user.id, token_id = record.id, "access token minted");
        Ok(pending.into_issued(record))
    }

    /// Delete token `token_id` if `user` owns it. Missing tokens are not an error.
    pub async fn revoke(&self, user: &User, token_id: i64) -> Result<bool, AuthError> {
        let removed = self.store.delete_access_token(token_id, &user.id).await?;
        debug!(user_id = %user.id, token_id, removed, "access token revoke");
        Ok(removed)
    }

    /// Resolve a bearer value to its user and token.
    ///
    /// Every rejection is `InvalidAccessToken`; store outages propagate.
    pub async fn authenticate(&self, value: &str) -> Result<(User, AccessTokenRecord), AuthError> {
        let (id, secret) = parse_value(value).ok_or(AuthError::InvalidAccessToken)?;

        let mut token = self
            .store
            .find_access_token(id)
            .await?
            .ok_or(AuthError::InvalidAccessToken)?;

        if !constant_time_eq(hash_secret(secret).as_bytes(), token.hash.as_bytes()) {
            return Err(AuthError::InvalidAccessToken);
        }

        let now = Utc::now();
        if token.is_expired(now) {
            debug!(token_id = id, "access token expired");
            return Err(AuthError::InvalidAccessToken);
        }

        let user = self
            .store
            .find_user_by_id(&token.user_id)
            .await?
            .ok_or(AuthError::InvalidAccessToken)?;

        match self.store.touch_access_token(id, now).await {
            Ok(()) => token.last_used_at = Some(now),
            Err(e) => warn!(token_id = id, error = %e, "failed to record token use"),
        }

        Ok((user, token))
    }
}
