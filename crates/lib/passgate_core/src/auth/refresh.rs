//! Refresh token codec.
//!
//! A refresh token is `oar_` followed by the encrypted JSON `{"i": id, "c":
//! issued_at_millis}`. Nothing is stored server-side: the token is valid for
//! as long as the access token it points at exists.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AuthError;
use crate::crypto::Encrypter;
use crate::models::auth::RefreshTokenClaims;

/// Prefix marking refresh token values.
pub const REFRESH_TOKEN_PREFIX: &str = "oar_";

#[derive(Serialize, Deserialize)]
struct RefreshPayload {
    /// Access token id.
    i: i64,
    /// Issued at, unix millis.
    c: i64,
}

/// Encodes and decodes refresh tokens.
#[derive(Clone)]
pub struct RefreshTokenCodec {
    encrypter: Arc<dyn Encrypter>,
}

impl RefreshTokenCodec {
    pub fn new(encrypter: Arc<dyn Encrypter>) -> Self {
        Self { encrypter }
    }

    /// Encode a refresh token for `access_token_id`, issued now.
    pub fn encode(&self, access_token_id: i64) -> Result<String, AuthError> {
        self.encode_at(access_token_id, Utc::now())
    }

    pub fn encode_at(
        &self,
        access_token_id: i64,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let payload = RefreshPayload {
            i: access_token_id,
            c: issued_at.timestamp_millis(),
        };
        let json = serde_json::to_vec(&payload)
            .map_err(|e| AuthError::Internal(format!("refresh payload: {e}")))?;
        let sealed = self.encrypter.encrypt(&json)?;
        Ok(format!("{REFRESH_TOKEN_PREFIX}{sealed}"))
    }

    /// Decode a refresh token. Any defect yields `InvalidRefreshToken`.
    pub fn decode(&self, token: &str) -> Result<RefreshTokenClaims, AuthError> {
        let sealed = token
            .strip_prefix(REFRESH_TOKEN_PREFIX)
            .ok_or(AuthError::InvalidRefreshToken)?;

        let json = self.encrypter.decrypt(sealed).map_err(|e| {
            debug!(error = %e, "refresh token decrypt failed");
            AuthError::InvalidRefreshToken
        })?;

        let payload: RefreshPayload =
            serde_json::from_slice(&json).map_err(|_| AuthError::InvalidRefreshToken)?;

        let issued_at =
            DateTime::from_timestamp_millis(payload.c).ok_or(AuthError::InvalidRefreshToken)?;

        Ok(RefreshTokenClaims {
            access_token_id: payload.i,
            issued_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AesGcmEncrypter;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn codec(key: &str) -> RefreshTokenCodec {
        RefreshTokenCodec::new(Arc::new(AesGcmEncrypter::new(key).unwrap()))
    }

    #[test]
    fn decode_inverts_encode() {
        let codec = codec("test-app-key");
        let before = Utc::now();
        let token = codec.encode(17).unwrap();
        assert!(token.starts_with("oar_"));

        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.access_token_id, 17);
        assert!(claims.issued_at.timestamp_millis() >= before.timestamp_millis());
        assert!(claims.issued_at <= Utc::now());
    }

    #[test]
    fn encode_at_preserves_timestamp_millis() {
        let codec = codec("test-app-key");
        let at = DateTime::from_timestamp_millis(1_718_360_058_558).unwrap();
        let claims = codec.decode(&codec.encode_at(3, at).unwrap()).unwrap();
        assert_eq!(claims.issued_at, at);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let codec = codec("test-app-key");
        let token = codec.encode(17).unwrap();
        let mut bytes = URL_SAFE_NO_PAD
            .decode(token.trim_start_matches(REFRESH_TOKEN_PREFIX))
            .unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = format!("{REFRESH_TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes));
        assert!(matches!(
            codec.decode(&tampered),
            Err(AuthError::InvalidRefreshToken)
        ));
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let codec = codec("test-app-key");
        let token = codec.encode(17).unwrap();
        for bad in [
            "",
            "oar_",
            "oar_not-base64!",
            "oat_abc",
            token.trim_start_matches(REFRESH_TOKEN_PREFIX),
        ] {
            assert!(
                matches!(codec.decode(bad), Err(AuthError::InvalidRefreshToken)),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn token_from_another_key_is_rejected() {
        let token = codec("key-one").encode(17).unwrap();
        assert!(matches!(
            codec("key-two").decode(&token),
            Err(AuthError::InvalidRefreshToken)
        ));
    }

    #[test]
    fn non_payload_plaintext_is_rejected() {
        let enc = Arc::new(AesGcmEncrypter::new("test-app-key").unwrap());
        let sealed = enc.encrypt(b"{\"x\":1}").unwrap();
        let codec = RefreshTokenCodec::new(enc);
        assert!(matches!(
            codec.decode(&format!("{REFRESH_TOKEN_PREFIX}{sealed}")),
            Err(AuthError::InvalidRefreshToken)
        ));
    }
}
