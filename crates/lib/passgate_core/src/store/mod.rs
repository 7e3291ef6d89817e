//! Credential store: persistence for users and access tokens.
//!
//! `CredentialStore` is the repository interface the auth flows depend on.
//! Operations that must be atomic (consuming a passcode while minting a
//! token, rotating a token) are single trait methods so each implementation
//! can run them in one transaction.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::auth::{AccessTokenRecord, NewAccessToken, NewUser, TenantMembership, User};

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Db(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db) = e.as_database_error()
            && db.is_unique_violation()
        {
            return StoreError::UniqueViolation(
                db.constraint().unwrap_or("unknown").to_string(),
            );
        }
        StoreError::Db(e)
    }
}

/// Persistence operations over users and access tokens.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a user. Fails with `UniqueViolation` if the email is taken.
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;

    /// Case-insensitive lookup by email.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Tenant memberships of `user_id`, each with its tenant loaded.
    async fn find_memberships(&self, user_id: &str) -> Result<Vec<TenantMembership>, StoreError>;

    /// Overwrite the pending passcode hash and its expiry.
    async fn set_passcode(
        &self,
        user_id: &str,
        passcode_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Clear the pending passcode and its expiry, but only while the stored
    /// hash still equals `expected_hash`. Returns whether anything was cleared.
    async fn clear_passcode_if(
        &self,
        user_id: &str,
        expected_hash: &str,
    ) -> Result<bool, StoreError>;

    /// Atomically clear the passcode and insert `token`.
    ///
    /// Only succeeds while the stored passcode hash still equals
    /// `expected_hash`; returns `None` (and changes nothing) if another
    /// request consumed or replaced it first.
    async fn consume_passcode(
        &self,
        user_id: &str,
        expected_hash: &str,
        token: NewAccessToken,
    ) -> Result<Option<AccessTokenRecord>, StoreError>;

    async fn insert_access_token(
        &self,
        token: NewAccessToken,
    ) -> Result<AccessTokenRecord, StoreError>;

    async fn find_access_token(&self, id: i64) -> Result<Option<AccessTokenRecord>, StoreError>;

    /// Atomically insert `token` and delete token `old_id` owned by `user_id`.
    ///
    /// Returns `None` (and changes nothing) if the old token no longer exists.
    async fn rotate_access_token(
        &self,
        old_id: i64,
        user_id: &str,
        token: NewAccessToken,
    ) -> Result<Option<AccessTokenRecord>, StoreError>;

    /// Delete token `id` if it belongs to `user_id`. Returns whether a row went away.
    async fn delete_access_token(&self, id: i64, user_id: &str) -> Result<bool, StoreError>;

    /// Record a use of token `id`.
    async fn touch_access_token(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;
}
