//! Passcode verification and login.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::AuthError;
use super::access_tokens::AccessTokenManager;
use super::matcher::CredentialMatcher;
use super::refresh::RefreshTokenCodec;
use crate::config::AuthConfig;
use crate::models::auth::{ALL_ABILITIES, LoginOutcome};
use crate::store::CredentialStore;

/// Checks passcodes and turns a match into a token pair.
#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn CredentialStore>,
    matcher: Arc<dyn CredentialMatcher>,
    tokens: AccessTokenManager,
    refresh_tokens: RefreshTokenCodec,
    config: AuthConfig,
}

impl CredentialVerifier {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        matcher: Arc<dyn CredentialMatcher>,
        tokens: AccessTokenManager,
        refresh_tokens: RefreshTokenCodec,
        config: AuthConfig,
    ) -> Self {
        Self {
            store,
            matcher,
            tokens,
            refresh_tokens,
            config,
        }
    }

    /// Verify `passcode` for `email` and log the user in.
    ///
    /// Unknown email, missing passcode, wrong passcode, expired passcode and
    /// a passcode consumed concurrently all fail with `InvalidCredentials`.
    /// An expired passcode is cleared. A successful login consumes the
    /// passcode in the same transaction that stores the new access token.
    pub async fn verify(&self, email: &str, passcode: &str) -> Result<LoginOutcome, AuthError> {
        let user = match self.store.find_user_by_email(email).await {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, "user lookup failed during login");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let Some((mut user, hash)) =
            user.and_then(|u| u.passcode.clone().map(|hash| (u, hash)))
        else {
            self.matcher.verify_dummy(passcode);
            return Err(AuthError::InvalidCredentials);
        };

        if !self.matcher.verify(passcode, &hash) {
            return Err(AuthError::InvalidCredentials);
        }

        if user.passcode_expired(Utc::now()) {
            // Guarded by the hash: a passcode issued since the lookup survives.
            match self.store.clear_passcode_if(&user.id, &hash).await {
                Ok(cleared) => debug!(user_id = %user.id, cleared, "expired passcode clear"),
                Err(e) => {
                    warn!(user_id = %user.id, error = %e, "failed to clear expired passcode")
                }
            }
            info!(user_id = %user.id, "expired passcode rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let memberships = self.store.find_memberships(&user.id).await?;

        let pending = self.tokens.prepare(
            &user.id,
            vec![ALL_ABILITIES.to_string()],
            None,
            self.config.access_token_expires_in,
        );
        let record = self
            .store
            .consume_passcode(&user.id, &hash, pending.token.clone())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let access_token = pending.into_issued(record);
        let refresh_token = self.refresh_tokens.encode(access_token.record.id)?;

        user.passcode = None;
        user.passcode_expires_at = None;

        info!(user_id = %user.id, token_id = access_token.record.id, "login succeeded");
        Ok(LoginOutcome {
            user,
            memberships,
            access_token,
            refresh_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::matcher::BcryptMatcher;
    use crate::crypto::AesGcmEncrypter;
    use crate::models::auth::{
        AccessTokenRecord, NewAccessToken, NewUser, TenantMembership, TenantRole, User,
    };
    use crate::store::{MemoryCredentialStore, StoreError};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use tokio::sync::Mutex;

    /// Store whose next email lookup returns a previously captured snapshot,
    /// simulating a read that raced with a passcode reissue.
    struct StaleReadStore {
        inner: Arc<MemoryCredentialStore>,
        snapshot: Mutex<Option<User>>,
    }

    #[async_trait]
    impl CredentialStore for StaleReadStore {
        async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
            self.inner.create_user(new_user).await
        }

        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            if let Some(user) = self.snapshot.lock().await.take() {
                return Ok(Some(user));
            }
            self.inner.find_user_by_email(email).await
        }

        async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
            self.inner.find_user_by_id(id).await
        }

        async fn find_memberships(
            &self,
            user_id: &str,
        ) -> Result<Vec<TenantMembership>, StoreError> {
            self.inner.find_memberships(user_id).await
        }

        async fn set_passcode(
            &self,
            user_id: &str,
            passcode_hash: &str,
            expires_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.set_passcode(user_id, passcode_hash, expires_at).await
        }

        async fn clear_passcode_if(
            &self,
            user_id: &str,
            expected_hash: &str,
        ) -> Result<bool, StoreError> {
            self.inner.clear_passcode_if(user_id, expected_hash).await
        }

        async fn consume_passcode(
            &self,
            user_id: &str,
            expected_hash: &str,
            token: NewAccessToken,
        ) -> Result<Option<AccessTokenRecord>, StoreError> {
            self.inner.consume_passcode(user_id, expected_hash, token).await
        }

        async fn insert_access_token(
            &self,
            token: NewAccessToken,
        ) -> Result<AccessTokenRecord, StoreError> {
            self.inner.insert_access_token(token).await
        }

        async fn find_access_token(
            &self,
            id: i64,
        ) -> Result<Option<AccessTokenRecord>, StoreError> {
            self.inner.find_access_token(id).await
        }

        async fn rotate_access_token(
            &self,
            old_id: i64,
            user_id: &str,
            token: NewAccessToken,
        ) -> Result<Option<AccessTokenRecord>, StoreError> {
            self.inner.rotate_access_token(old_id, user_id, token).await
        }

        async fn delete_access_token(&self, id: i64, user_id: &str) -> Result<bool, StoreError> {
            self.inner.delete_access_token(id, user_id).await
        }

        async fn touch_access_token(&self, id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
            self.inner.touch_access_token(id, at).await
        }
    }

    struct Fixture {
        store: Arc<MemoryCredentialStore>,
        matcher: Arc<BcryptMatcher>,
        verifier: CredentialVerifier,
        codec: RefreshTokenCodec,
        user_id: String,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryCredentialStore::new());
        let matcher = Arc::new(BcryptMatcher::new(4));
        let codec = RefreshTokenCodec::new(Arc::new(AesGcmEncrypter::new("k").unwrap()));
        let verifier = CredentialVerifier::new(
            store.clone(),
            matcher.clone(),
            AccessTokenManager::new(store.clone()),
            codec.clone(),
            AuthConfig::default(),
        );
        let user_id = store
            .create_user(NewUser {
                email: "a@x.com".into(),
                first_name: "A".into(),
                last_name: "B".into(),
            })
            .await
            .unwrap()
            .id;
        Fixture {
            store,
            matcher,
            verifier,
            codec,
            user_id,
        }
    }

    impl Fixture {
        async fn set_code(&self, code: &str, ttl: Duration) {
            let hash = self.matcher.hash(code).unwrap();
            self.store
                .set_passcode(&self.user_id, &hash, Utc::now() + ttl)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn correct_code_logs_in_once() {
        let fx = fixture().await;
        fx.set_code("00042000", Duration::minutes(10)).await;

        let outcome = fx.verifier.verify("a@x.com", "00042000").await.unwrap();
        assert_eq!(outcome.user.id, fx.user_id);
        assert!(outcome.user.passcode.is_none());
        assert!(outcome.access_token.value.starts_with("oat_"));
        assert_eq!(outcome.access_token.record.abilities, vec!["*".to_string()]);
        let claims = fx.codec.decode(&outcome.refresh_token).unwrap();
        assert_eq!(claims.access_token_id, outcome.access_token.record.id);

        let again = fx.verifier.verify("a@x.com", "00042000").await;
        assert!(matches!(again, Err(AuthError::InvalidCredentials)));
        assert_eq!(fx.store.access_token_count().await, 1);
    }

    #[tokio::test]
    async fn access_token_uses_configured_expiry() {
        let fx = fixture().await;
        fx.set_code("11111111", Duration::minutes(10)).await;
        let outcome = fx.verifier.verify("a@x.com", "11111111").await.unwrap();
        let lifetime = outcome.access_token.record.expires_at - Utc::now();
        assert!(lifetime > Duration::days(29));
        assert!(lifetime <= Duration::days(30));
    }

    #[tokio::test]
    async fn wrong_code_and_unknown_email_look_the_same() {
        let fx = fixture().await;
        fx.set_code("00042000", Duration::minutes(10)).await;

        let wrong = fx.verifier.verify("a@x.com", "99999999").await.unwrap_err();
        let unknown = fx.verifier.verify("b@x.com", "00042000").await.unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert!(matches!(wrong, AuthError::InvalidCredentials));

        // A wrong guess does not burn the pending code.
        assert!(fx.verifier.verify("a@x.com", "00042000").await.is_ok());
    }

    #[tokio::test]
    async fn no_pending_code_is_invalid() {
        let fx = fixture().await;
        let err = fx.verifier.verify("a@x.com", "00000000").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn expired_code_is_rejected_and_cleared() {
        let fx = fixture().await;
        fx.set_code("00042000", Duration::minutes(10)).await;
        fx.store
            .set_passcode_expiry(&fx.user_id, Utc::now() - Duration::seconds(1))
            .await;

        let err = fx.verifier.verify("a@x.com", "00042000").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let user = fx.store.find_user_by_id(&fx.user_id).await.unwrap().unwrap();
        assert!(user.passcode.is_none());
        assert!(user.passcode_expires_at.is_none());

        let replay = fx.verifier.verify("a@x.com", "00042000").await;
        assert!(matches!(replay, Err(AuthError::InvalidCredentials)));
        assert_eq!(fx.store.access_token_count().await, 0);
    }

    #[tokio::test]
    async fn expired_clear_spares_a_reissued_code() {
        let fx = fixture().await;
        fx.set_code("11111111", Duration::minutes(10)).await;
        fx.store
            .set_passcode_expiry(&fx.user_id, Utc::now() - Duration::seconds(1))
            .await;
        let stale = fx.store.find_user_by_email("a@x.com").await.unwrap();

        // A new code is issued after the login request read the user.
        fx.set_code("22222222", Duration::minutes(10)).await;

        let racing = StaleReadStore {
            inner: fx.store.clone(),
            snapshot: Mutex::new(stale),
        };
        let store: Arc<dyn CredentialStore> = Arc::new(racing);
        let verifier = CredentialVerifier::new(
            store.clone(),
            fx.matcher.clone(),
            AccessTokenManager::new(store),
            fx.codec.clone(),
            AuthConfig::default(),
        );

        let err = verifier.verify("a@x.com", "11111111").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let outcome = verifier.verify("a@x.com", "22222222").await.unwrap();
        assert_eq!(outcome.user.id, fx.user_id);
    }

    #[tokio::test]
    async fn login_returns_tenant_memberships() {
        let fx = fixture().await;
        let acme = fx.store.add_tenant("Acme", None).await;
        fx.store
            .add_membership(&acme.id, &fx.user_id, TenantRole::Owner)
            .await
            .unwrap();
        fx.set_code("00042000", Duration::minutes(10)).await;

        let outcome = fx.verifier.verify("a@x.com", "00042000").await.unwrap();
        assert_eq!(outcome.memberships.len(), 1);
        assert_eq!(outcome.memberships[0].tenant.name, "Acme");
        assert_eq!(outcome.memberships[0].role, TenantRole::Owner);
    }

    #[tokio::test]
    async fn concurrent_logins_with_same_code_succeed_once() {
        let fx = fixture().await;
        fx.set_code("00042000", Duration::minutes(10)).await;

        let (a, b) = tokio::join!(
            fx.verifier.verify("a@x.com", "00042000"),
            fx.verifier.verify("a@x.com", "00042000"),
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(fx.store.access_token_count().await, 1);
    }
}
