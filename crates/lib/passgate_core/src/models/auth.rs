//! Authentication domain models.
//!
//! Records are plain data. Outward serialization goes through the explicit
//! view types at the bottom of this file; the records themselves never derive
//! `Serialize`, so a secret column cannot leak by accident.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ability granting every capability.
pub const ALL_ABILITIES: &str = "*";

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Stored user record.
///
/// `passcode` holds a hash of the pending one-time code, never the code
/// itself. It is set together with `passcode_expires_at` or both are `None`.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub passcode: Option<String>,
    pub passcode_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Whether a pending passcode exists and has expired at `now`.
    pub fn passcode_expired(&self, now: DateTime<Utc>) -> bool {
        self.passcode_expires_at.is_some_and(|at| at < now)
    }
}

/// Input for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Stored access token record. `hash` is the SHA-256 of the token secret.
#[derive(Debug, Clone)]
pub struct AccessTokenRecord {
    pub id: i64,
    pub user_id: String,
    pub name: Option<String>,
    pub hash: String,
    pub abilities: Vec<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessTokenRecord {
    /// Whether the token grants `ability` (directly or through `*`).
    pub fn can(&self, ability: &str) -> bool {
        self.abilities
            .iter()
            .any(|a| a == ALL_ABILITIES || a == ability)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Input for inserting an access token.
#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub user_id: String,
    pub name: Option<String>,
    pub hash: String,
    pub abilities: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// Role of a user inside a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantRole {
    Owner,
    Admin,
    #[default]
    Member,
}

impl FromStr for TenantRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(TenantRole::Owner),
            "admin" => Ok(TenantRole::Admin),
            "member" => Ok(TenantRole::Member),
            other => Err(format!("unknown tenant role '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub logo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A user's membership in a tenant, with the tenant loaded.
#[derive(Debug, Clone)]
pub struct TenantMembership {
    pub id: String,
    pub user_id: String,
    pub role: TenantRole,
    pub created_at: DateTime<Utc>,
    pub tenant: Tenant,
}

/// A freshly minted access token: the stored record plus the raw bearer
/// value, which exists only here and is never persisted.
#[derive(Clone)]
pub struct IssuedAccessToken {
    pub record: AccessTokenRecord,
    pub value: String,
}

impl fmt::Debug for IssuedAccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedAccessToken")
            .field("record", &self.record)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Decoded refresh token contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTokenClaims {
    pub access_token_id: i64,
    pub issued_at: DateTime<Utc>,
}

/// Result of a successful passcode login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub memberships: Vec<TenantMembership>,
    pub access_token: IssuedAccessToken,
    pub refresh_token: String,
}

/// Result of a successful refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: IssuedAccessToken,
    pub refresh_token: String,
}

// ---------------------------------------------------------------------------
// Outward views
// ---------------------------------------------------------------------------

/// Public user shape. Excludes passcode, passcode expiry and role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            display_name: user.display_name(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantView {
    pub id: String,
    pub name: String,
    pub logo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantMembershipView {
    pub id: String,
    pub tenant_id: String,
    pub role: TenantRole,
    pub tenant: TenantView,
}

impl From<&TenantMembership> for TenantMembershipView {
    fn from(membership: &TenantMembership) -> Self {
        Self {
            id: membership.id.clone(),
            tenant_id: membership.tenant.id.clone(),
            role: membership.role,
            tenant: TenantView {
                id: membership.tenant.id.clone(),
                name: membership.tenant.name.clone(),
                logo: membership.tenant.logo.clone(),
            },
        }
    }
}

/// User shape returned by login: the public user plus tenant memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUserView {
    #[serde(flatten)]
    pub user: UserView,
    pub tenants: Vec<TenantMembershipView>,
}

impl From<&LoginOutcome> for SessionUserView {
    fn from(outcome: &LoginOutcome) -> Self {
        Self {
            user: UserView::from(&outcome.user),
            tenants: outcome
                .memberships
                .iter()
                .map(TenantMembershipView::from)
                .collect(),
        }
    }
}

/// Public access token shape, returned once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenView {
    #[serde(rename = "type")]
    pub token_type: String,
    pub name: Option<String>,
    pub token: String,
    pub abilities: Vec<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl From<&IssuedAccessToken> for AccessTokenView {
    fn from(issued: &IssuedAccessToken) -> Self {
        Self {
            token_type: "bearer".to_string(),
            name: issued.record.name.clone(),
            token: issued.value.clone(),
            abilities: issued.record.abilities.clone(),
            last_used_at: issued.record.last_used_at,
            expires_at: issued.record.expires_at,
        }
    }
}
