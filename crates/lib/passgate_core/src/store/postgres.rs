//! PostgreSQL credential store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use super::{CredentialStore, StoreError};
use crate::models::auth::{
    AccessTokenRecord, NewAccessToken, NewUser, Role, Tenant, TenantMembership, TenantRole, User,
};
use crate::uuid::new_user_id;

const USER_COLUMNS: &str = "id, email::text AS email, first_name, last_name, role, passcode, \
     passcode_expires_at, created_at, updated_at";

const TOKEN_COLUMNS: &str = "id, tokenable_id, name, hash, abilities, last_used_at, expires_at, \
     created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    first_name: String,
    last_name: String,
    role: String,
    passcode: Option<String>,
    passcode_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(StoreError::Corrupt)?;
        Ok(User {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            role,
            passcode: row.passcode,
            passcode_expires_at: row.passcode_expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    id: String,
    user_id: String,
    role: String,
    created_at: DateTime<Utc>,
    tenant_id: String,
    tenant_name: String,
    tenant_logo: Option<String>,
    tenant_created_at: DateTime<Utc>,
    tenant_updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<MembershipRow> for TenantMembership {
    type Error = StoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<TenantRole>().map_err(StoreError::Corrupt)?;
        Ok(TenantMembership {
            id: row.id,
            user_id: row.user_id,
            role,
            created_at: row.created_at,
            tenant: Tenant {
                id: row.tenant_id,
                name: row.tenant_name,
                logo: row.tenant_logo,
                created_at: row.tenant_created_at,
                updated_at: row.tenant_updated_at,
            },
        })
    }
}

type TokenRow = (
    i64,
    String,
    Option<String>,
    String,
    Vec<String>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn token_from_row(row: TokenRow) -> AccessTokenRecord {
    let (id, user_id, name, hash, abilities, last_used_at, expires_at, created_at, updated_at) =
        row;
    AccessTokenRecord {
        id,
        user_id,
        name,
        hash,
        abilities,
        last_used_at,
        expires_at,
        created_at,
        updated_at,
    }
}

/// Credential store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_token_in(
        tx: &mut Transaction<'_, Postgres>,
        token: &NewAccessToken,
    ) -> Result<AccessTokenRecord, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "INSERT INTO auth_access_tokens (tokenable_id, name, hash, abilities, expires_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {TOKEN_COLUMNS}"
        ))
        .bind(&token.user_id)
        .bind(&token.name)
        .bind(&token.hash)
        .bind(&token.abilities)
        .bind(token.expires_at)
        .fetch_one(&mut **tx)
        .await?;
        Ok(token_from_row(row))
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, email, first_name, last_name) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(new_user_id())
        .bind(&new_user.email)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1::citext"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn set_passcode(
        &self,
        user_id: &str,
        passcode_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET passcode = $2, passcode_expires_at = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(passcode_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_memberships(&self, user_id: &str) -> Result<Vec<TenantMembership>, StoreError> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            "SELECT tu.id, tu.user_id, tu.role, tu.created_at, \
                    t.id AS tenant_id, t.name AS tenant_name, t.logo AS tenant_logo, \
                    t.created_at AS tenant_created_at, t.updated_at AS tenant_updated_at \
             FROM tenant_users tu \
             JOIN tenants t ON t.id = tu.tenant_id \
             WHERE tu.user_id = $1 \
             ORDER BY tu.created_at, tu.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TenantMembership::try_from).collect()
    }

    async fn clear_passcode_if(
        &self,
        user_id: &str,
        expected_hash: &str,
    ) -> Result<bool, StoreError> {
        let cleared = sqlx::query(
            "UPDATE users SET passcode = NULL, passcode_expires_at = NULL, updated_at = now() \
             WHERE id = $1 AND passcode = $2",
        )
        .bind(user_id)
        .bind(expected_hash)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(cleared > 0)
    }

    async fn consume_passcode(
        &self,
        user_id: &str,
        expected_hash: &str,
        token: NewAccessToken,
    ) -> Result<Option<AccessTokenRecord>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let cleared = sqlx::query(
            "UPDATE users SET passcode = NULL, passcode_expires_at = NULL, updated_at = now() \
             WHERE id = $1 AND passcode = $2",
        )
        .bind(user_id)
        .bind(expected_hash)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if cleared == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let record = Self::insert_token_in(&mut tx, &token).await?;
        tx.commit().await?;
        Ok(Some(record))
    }

    async fn insert_access_token(
        &self,
        token: NewAccessToken,
    ) -> Result<AccessTokenRecord, StoreError> {
        let mut tx = self.pool.begin().await?;
        let record = Self::insert_token_in(&mut tx, &token).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn find_access_token(&self, id: i64) -> Result<Option<AccessTokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM auth_access_tokens WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(token_from_row))
    }

    async fn rotate_access_token(
        &self,
        old_id: i64,
        user_id: &str,
        token: NewAccessToken,
    ) -> Result<Option<AccessTokenRecord>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let record = Self::insert_token_in(&mut tx, &token).await?;

        let deleted = sqlx::query(
            "DELETE FROM auth_access_tokens WHERE id = $1 AND tokenable_id = $2",
        )
        .bind(old_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(record))
    }

    async fn delete_access_token(&self, id: i64, user_id: &str) -> Result<bool, StoreError> {
        let deleted = sqlx::query(
            "DELETE FROM auth_access_tokens WHERE id = $1 AND tokenable_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(deleted > 0)
    }

    async fn touch_access_token(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE auth_access_tokens SET last_used_at = $2, updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
