//! In-memory credential store.
//!
//! Used by tests and local development. All state sits behind a single
//! async mutex, so every trait method is atomic with respect to the others.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{CredentialStore, StoreError};
use crate::models::auth::{
    AccessTokenRecord, NewAccessToken, NewUser, Role, Tenant, TenantMembership, TenantRole, User,
};
use crate::uuid::{new_user_id, uuidv7};

#[derive(Debug)]
struct MembershipEntry {
    id: String,
    tenant_id: String,
    user_id: String,
    role: TenantRole,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<String, User>,
    tokens: BTreeMap<i64, AccessTokenRecord>,
    last_token_id: i64,
    tenants: HashMap<String, Tenant>,
    memberships: Vec<MembershipEntry>,
}

impl State {
    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }

    fn insert_token(&mut self, token: NewAccessToken) -> Result<AccessTokenRecord, StoreError> {
        if self.tokens.values().any(|t| t.hash == token.hash) {
            return Err(StoreError::UniqueViolation(
                "auth_access_tokens_hash_key".into(),
            ));
        }
        if !self.users.contains_key(&token.user_id) {
            return Err(StoreError::Corrupt(format!(
                "token owner '{}' does not exist",
                token.user_id
            )));
        }
        self.last_token_id += 1;
        let now = Utc::now();
        let record = AccessTokenRecord {
            id: self.last_token_id,
            user_id: token.user_id,
            name: token.name,
            hash: token.hash,
            abilities: token.abilities,
            last_used_at: None,
            expires_at: token.expires_at,
            created_at: now,
            updated_at: now,
        };
        self.tokens.insert(record.id, record.clone());
        Ok(record)
    }

    /// Clear the passcode if its hash is still `expected_hash`.
    fn clear_passcode_if(&mut self, user_id: &str, expected_hash: &str) -> bool {
        match self.users.get_mut(user_id) {
            Some(user) if user.passcode.as_deref() == Some(expected_hash) => {
                user.passcode = None;
                user.passcode_expires_at = None;
                user.updated_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }
}

/// Credential store kept entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: Mutex<State>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of access tokens currently stored.
    pub async fn access_token_count(&self) -> usize {
        self.state.lock().await.tokens.len()
    }

    /// Overwrite a user's passcode expiry, leaving the hash in place.
    pub async fn set_passcode_expiry(&self, user_id: &str, expires_at: DateTime<Utc>) {
        if let Some(user) = self.state.lock().await.users.get_mut(user_id) {
            user.passcode_expires_at = Some(expires_at);
        }
    }

    /// Create a tenant.
    pub async fn add_tenant(&self, name: &str, logo: Option<&str>) -> Tenant {
        let tenant = Tenant {
            id: uuidv7().to_string(),
            name: name.to_string(),
            logo: logo.map(str::to_string),
            created_at: Utc::now(),
            updated_at: None,
        };
        self.state
            .lock()
            .await
            .tenants
            .insert(tenant.id.clone(), tenant.clone());
        tenant
    }

    /// Add `user_id` to `tenant_id`. A user belongs to a tenant at most once.
    pub async fn add_membership(
        &self,
        tenant_id: &str,
        user_id: &str,
        role: TenantRole,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.tenants.contains_key(tenant_id) || !state.users.contains_key(user_id) {
            return Err(StoreError::Corrupt(format!(
                "unknown tenant '{tenant_id}' or user '{user_id}'"
            )));
        }
        if state
            .memberships
            .iter()
            .any(|m| m.tenant_id == tenant_id && m.user_id == user_id)
        {
            return Err(StoreError::UniqueViolation(
                "tenant_users_tenant_user_key".into(),
            ));
        }
        state.memberships.push(MembershipEntry {
            id: uuidv7().to_string(),
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            role,
            created_at: Utc::now(),
        });
        Ok(())
    }

    /// Overwrite a token's expiry.
    pub async fn set_token_expiry(&self, id: i64, expires_at: DateTime<Utc>) {
        if let Some(token) = self.state.lock().await.tokens.get_mut(&id) {
            token.expires_at = expires_at;
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;
        if state.user_by_email(&new_user.email).is_some() {
            return Err(StoreError::UniqueViolation("users_email_key".into()));
        }
        let user = User {
            id: new_user_id(),
            email: new_user.email,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            role: Role::User,
            passcode: None,
            passcode_expires_at: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.user_by_email(email).cloned())
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(id).cloned())
    }

    async fn set_passcode(
        &self,
        user_id: &str,
        passcode_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(user) = self.state.lock().await.users.get_mut(user_id) {
            user.passcode = Some(passcode_hash.to_string());
            user.passcode_expires_at = Some(expires_at);
            user.updated_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn find_memberships(&self, user_id: &str) -> Result<Vec<TenantMembership>, StoreError> {
        let state = self.state.lock().await;
        state
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| {
                let tenant = state.tenants.get(&m.tenant_id).cloned().ok_or_else(|| {
                    StoreError::Corrupt(format!("membership {} has no tenant", m.id))
                })?;
                Ok(TenantMembership {
                    id: m.id.clone(),
                    user_id: m.user_id.clone(),
                    role: m.role,
                    created_at: m.created_at,
                    tenant,
                })
            })
            .collect()
    }

    async fn clear_passcode_if(
        &self,
        user_id: &str,
        expected_hash: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .clear_passcode_if(user_id, expected_hash))
    }

    async fn consume_passcode(
        &self,
        user_id: &str,
        expected_hash: &str,
        token: NewAccessToken,
    ) -> Result<Option<AccessTokenRecord>, StoreError> {
        let mut state = self.state.lock().await;
        let matches = state
            .users
            .get(user_id)
            .and_then(|u| u.passcode.as_deref())
            .is_some_and(|h| h == expected_hash);
        if !matches {
            return Ok(None);
        }
        // Insert first: a failed insert must leave the passcode untouched.
        let record = state.insert_token(token)?;
        state.clear_passcode_if(user_id, expected_hash);
        Ok(Some(record))
    }

    async fn insert_access_token(
        &self,
        token: NewAccessToken,
    ) -> Result<AccessTokenRecord, StoreError> {
        self.state.lock().await.insert_token(token)
    }

    async fn find_access_token(&self, id: i64) -> Result<Option<AccessTokenRecord>, StoreError> {
        Ok(self.state.lock().await.tokens.get(&id).cloned())
    }

    async fn rotate_access_token(
        &self,
        old_id: i64,
        user_id: &str,
        token: NewAccessToken,
    ) -> Result<Option<AccessTokenRecord>, StoreError> {
        let mut state = self.state.lock().await;
        let owned = state
            .tokens
            .get(&old_id)
            .is_some_and(|t| t.user_id == user_id);
        if !owned {
            return Ok(None);
        }
        let record = state.insert_token(token)?;
        state.tokens.remove(&old_id);
        Ok(Some(record))
    }

    async fn delete_access_token(&self, id: i64, user_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let owned = state.tokens.get(&id).is_some_and(|t| t.user_id == user_id);
        if owned {
            state.tokens.remove(&id);
        }
        Ok(owned)
    }

    async fn touch_access_token(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(token) = self.state.lock().await.tokens.get_mut(&id) {
            token.last_used_at = Some(at);
            token.updated_at = at;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            first_name: "A".into(),
            last_name: "B".into(),
        }
    }

    fn new_token(user_id: &str, hash: &str) -> NewAccessToken {
        NewAccessToken {
            user_id: user_id.into(),
            name: None,
            hash: hash.into(),
            abilities: vec!["*".into()],
            expires_at: Utc::now() + Duration::days(1),
        }
    }

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let store = MemoryCredentialStore::new();
        let user = store.create_user(new_user("Mixed@Case.io")).await.unwrap();
        let found = store.find_user_by_email("mixed@case.IO").await.unwrap();
        assert_eq!(found.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryCredentialStore::new();
        store.create_user(new_user("a@x.com")).await.unwrap();
        let err = store.create_user(new_user("A@X.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn consume_passcode_requires_matching_hash() {
        let store = MemoryCredentialStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        store
            .set_passcode(&user.id, "h1", Utc::now() + Duration::minutes(10))
            .await
            .unwrap();

        let stale = store
            .consume_passcode(&user.id, "other", new_token(&user.id, "t1"))
            .await
            .unwrap();
        assert!(stale.is_none());
        assert_eq!(store.access_token_count().await, 0);

        let record = store
            .consume_passcode(&user.id, "h1", new_token(&user.id, "t1"))
            .await
            .unwrap()
            .expect("consumed");
        assert_eq!(record.user_id, user.id);

        let user = store.find_user_by_id(&user.id).await.unwrap().unwrap();
        assert!(user.passcode.is_none());
        assert!(user.passcode_expires_at.is_none());
    }

    #[tokio::test]
    async fn failed_insert_keeps_passcode() {
        let store = MemoryCredentialStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        store
            .insert_access_token(new_token(&user.id, "dup"))
            .await
            .unwrap();
        store
            .set_passcode(&user.id, "h1", Utc::now() + Duration::minutes(10))
            .await
            .unwrap();

        let err = store
            .consume_passcode(&user.id, "h1", new_token(&user.id, "dup"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));

        let user = store.find_user_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(user.passcode.as_deref(), Some("h1"));
    }

    #[tokio::test]
    async fn guarded_clear_leaves_newer_passcode() {
        let store = MemoryCredentialStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        store
            .set_passcode(&user.id, "new", Utc::now() + Duration::minutes(10))
            .await
            .unwrap();

        assert!(!store.clear_passcode_if(&user.id, "old").await.unwrap());
        let kept = store.find_user_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(kept.passcode.as_deref(), Some("new"));

        assert!(store.clear_passcode_if(&user.id, "new").await.unwrap());
        let cleared = store.find_user_by_id(&user.id).await.unwrap().unwrap();
        assert!(cleared.passcode.is_none());
        assert!(cleared.passcode_expires_at.is_none());
    }

    #[tokio::test]
    async fn memberships_load_their_tenant() {
        let store = MemoryCredentialStore::new();
        let alice = store.create_user(new_user("a@x.com")).await.unwrap();
        let bob = store.create_user(new_user("b@x.com")).await.unwrap();
        let acme = store.add_tenant("Acme", Some("acme.png")).await;
        let globex = store.add_tenant("Globex", None).await;

        store
            .add_membership(&acme.id, &alice.id, TenantRole::Owner)
            .await
            .unwrap();
        store
            .add_membership(&globex.id, &alice.id, TenantRole::Member)
            .await
            .unwrap();
        store
            .add_membership(&acme.id, &bob.id, TenantRole::Admin)
            .await
            .unwrap();
        let dup = store
            .add_membership(&acme.id, &alice.id, TenantRole::Admin)
            .await
            .unwrap_err();
        assert!(matches!(dup, StoreError::UniqueViolation(_)));

        let memberships = store.find_memberships(&alice.id).await.unwrap();
        assert_eq!(memberships.len(), 2);
        assert_eq!(memberships[0].tenant.name, "Acme");
        assert_eq!(memberships[0].tenant.logo.as_deref(), Some("acme.png"));
        assert_eq!(memberships[0].role, TenantRole::Owner);
        assert_eq!(memberships[1].tenant.id, globex.id);

        let none = store.find_memberships("nobody").await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn rotate_replaces_token_once() {
        let store = MemoryCredentialStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        let old = store
            .insert_access_token(new_token(&user.id, "old"))
            .await
            .unwrap();

        let new = store
            .rotate_access_token(old.id, &user.id, new_token(&user.id, "new"))
            .await
            .unwrap()
            .expect("rotated");
        assert_ne!(new.id, old.id);
        assert!(store.find_access_token(old.id).await.unwrap().is_none());

        let again = store
            .rotate_access_token(old.id, &user.id, new_token(&user.id, "newer"))
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(store.access_token_count().await, 1);
    }

    #[tokio::test]
    async fn delete_checks_owner() {
        let store = MemoryCredentialStore::new();
        let alice = store.create_user(new_user("a@x.com")).await.unwrap();
        let bob = store.create_user(new_user("b@x.com")).await.unwrap();
        let token = store
            .insert_access_token(new_token(&alice.id, "t"))
            .await
            .unwrap();

        assert!(!store.delete_access_token(token.id, &bob.id).await.unwrap());
        assert!(store.find_access_token(token.id).await.unwrap().is_some());
        assert!(store.delete_access_token(token.id, &alice.id).await.unwrap());
        assert!(!store.delete_access_token(token.id, &alice.id).await.unwrap());
    }
}
