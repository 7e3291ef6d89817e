//! Authentication service: the flows exposed to the HTTP layer.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use super::AuthError;
use super::access_tokens::AccessTokenManager;
use super::matcher::CredentialMatcher;
use super::passcode::PasscodeIssuer;
use super::refresh::RefreshTokenCodec;
use super::verifier::CredentialVerifier;
use crate::config::AuthConfig;
use crate::crypto::Encrypter;
use crate::models::auth::{AccessTokenRecord, LoginOutcome, NewUser, TokenPair, User};
use crate::notify::Notifier;
use crate::store::{CredentialStore, StoreError};

/// Lifetime of an access token minted by a refresh.
pub const REFRESHED_TOKEN_EXPIRY_DAYS: i64 = 3;

/// Loose shape check: `local@domain.tld`, no whitespace.
fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

/// Entry point for every auth flow.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    issuer: PasscodeIssuer,
    verifier: CredentialVerifier,
    tokens: AccessTokenManager,
    refresh_tokens: RefreshTokenCodec,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        matcher: Arc<dyn CredentialMatcher>,
        encrypter: Arc<dyn Encrypter>,
        config: AuthConfig,
    ) -> Self {
        let tokens = AccessTokenManager::new(store.clone());
        let refresh_tokens = RefreshTokenCodec::new(encrypter);
        let issuer = PasscodeIssuer::new(store.clone(), notifier, matcher.clone(), config.clone());
        let verifier = CredentialVerifier::new(
            store.clone(),
            matcher,
            tokens.clone(),
            refresh_tokens.clone(),
            config,
        );
        Self {
            store,
            issuer,
            verifier,
            tokens,
            refresh_tokens,
        }
    }

    pub fn tokens(&self) -> &AccessTokenManager {
        &self.tokens
    }

    pub fn refresh_tokens(&self) -> &RefreshTokenCodec {
        &self.refresh_tokens
    }

    /// Register a user. Emails are unique regardless of case.
    pub async fn signup(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, AuthError> {
        let email = email.trim();
        let first_name = first_name.trim();
        let last_name = last_name.trim();

        if !is_plausible_email(email) {
            return Err(AuthError::Validation("email must be a valid address".into()));
        }
        if first_name.is_empty() || last_name.is_empty() {
            return Err(AuthError::Validation(
                "firstName and lastName are required".into(),
            ));
        }

        if self.store.find_user_by_email(email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let user = self
            .store
            .create_user(NewUser {
                email: email.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
            })
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => AuthError::EmailTaken,
                other => AuthError::Store(other),
            })?;

        info!(user_id = %user.id, "user signed up");
        Ok(user)
    }

    /// Issue a passcode for `email`. Returns the user id.
    pub async fn request_passcode(&self, email: &str) -> Result<String, AuthError> {
        self.issuer.issue(email.trim()).await
    }

    /// Exchange email + passcode for a token pair.
    pub async fn login(&self, email: &str, passcode: &str) -> Result<LoginOutcome, AuthError> {
        self.verifier.verify(email.trim(), passcode.trim()).await
    }

    /// Rotate the session referenced by `refresh_token`.
    ///
    /// `presented` is the bearer token the request authenticated with; it
    /// has already been validated and is only used for diagnostics.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        presented: Option<&AccessTokenRecord>,
    ) -> Result<TokenPair, AuthError> {
        let claims = self.refresh_tokens.decode(refresh_token)?;

        if let Some(presented) = presented
            && presented.id != claims.access_token_id
        {
            debug!(
                presented_id = presented.id,
                referenced_id = claims.access_token_id,
                "refresh token references a different access token than the bearer"
            );
        }

        let old = self
            .store
            .find_access_token(claims.access_token_id)
            .await
            .map_err(|e| {
                error!(error = %e, "token lookup failed during refresh");
                AuthError::InvalidRefreshToken
            })?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if old.is_expired(Utc::now()) {
            debug!(token_id = old.id, "refresh references an expired access token");
            return Err(AuthError::InvalidRefreshToken);
        }

        let user = self
            .store
            .find_user_by_id(&old.user_id)
            .await
            .map_err(|e| {
                error!(error = %e, "user lookup failed during refresh");
                AuthError::InvalidRefreshToken
            })?
            .ok_or(AuthError::InvalidRefreshToken)?;

        let pending = self.tokens.prepare(
            &user.id,
            old.abilities.clone(),
            old.name.clone(),
            Duration::days(REFRESHED_TOKEN_EXPIRY_DAYS),
        );
        let record = self
            .store
            .rotate_access_token(old.id, &user.id, pending.token.clone())
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;
        let access_token = pending.into_issued(record);
        let refresh_token = self.refresh_tokens.encode(access_token.record.id)?;

        info!(
            user_id = %user.id,
            old_token_id = old.id,
            new_token_id = access_token.record.id,
            "session rotated"
        );
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Revoke `access_token_id` for `user`. Never fails.
    pub async fn logout(&self, user: &User, access_token_id: i64) {
        match self.tokens.revoke(user, access_token_id).await {
            Ok(removed) => info!(user_id = %user.id, token_id = access_token_id, removed, "logout"),
            Err(e) => warn!(
                user_id = %user.id,
                token_id = access_token_id,
                error = %e,
                "logout revoke failed"
            ),
        }
    }

    /// Resolve a bearer value to its user and token.
    pub async fn authenticate(
        &self,
        bearer: &str,
    ) -> Result<(User, AccessTokenRecord), AuthError> {
        self.tokens.authenticate(bearer).await
    }
}
