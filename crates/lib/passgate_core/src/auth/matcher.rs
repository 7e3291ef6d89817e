//! Passcode hashing and matching.

use std::sync::OnceLock;

use super::AuthError;

/// bcrypt cost factor used in production.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Hashes secrets for storage and checks submitted secrets against them.
pub trait CredentialMatcher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String, AuthError>;

    /// Whether `secret` matches `hash`. A malformed hash never matches.
    fn verify(&self, secret: &str, hash: &str) -> bool;

    /// Spend the same effort as a real `verify` without a stored hash, so an
    /// unknown account costs as much as a wrong passcode.
    fn verify_dummy(&self, secret: &str) {
        let _ = self.verify(secret, "");
    }
}

/// bcrypt-backed matcher.
#[derive(Debug)]
pub struct BcryptMatcher {
    cost: u32,
    dummy_hash: OnceLock<String>,
}

impl BcryptMatcher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            dummy_hash: OnceLock::new(),
        }
    }
}

impl Default for BcryptMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl CredentialMatcher for BcryptMatcher {
    fn hash(&self, secret: &str) -> Result<String, AuthError> {
        bcrypt::hash(secret, self.cost).map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
    }

    fn verify(&self, secret: &str, hash: &str) -> bool {
        bcrypt::verify(secret, hash).unwrap_or(false)
    }

    fn verify_dummy(&self, secret: &str) {
        let dummy = self
            .dummy_hash
            .get_or_init(|| bcrypt::hash("passgate-dummy-passcode", self.cost).unwrap_or_default());
        let _ = self.verify(secret, dummy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let matcher = BcryptMatcher::new(4);
        let hash = matcher.hash("00123456").unwrap();
        assert_ne!(hash, "00123456");
        assert!(matcher.verify("00123456", &hash));
        assert!(!matcher.verify("00123457", &hash));
    }

    #[test]
    fn malformed_hash_never_matches() {
        let matcher = BcryptMatcher::new(4);
        assert!(!matcher.verify("00123456", "not-a-hash"));
        assert!(!matcher.verify("", ""));
    }

    #[test]
    fn dummy_verify_runs() {
        let matcher = BcryptMatcher::new(4);
        matcher.verify_dummy("00123456");
        assert!(matcher.dummy_hash.get().is_some_and(|h| h.starts_with("$2")));
    }
}
