//! Session token issuing and verification
//!
//! Tokens are HS256 JWTs carrying [`Claims`]. Verification is strict (no
//! leeway); the grace path decodes expired tokens while still checking the
//! signature.

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};

use crate::config::AuthConfig;
use crate::models::Claims;

/// Token errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// No usable signing secret is configured
    #[error("Token secret is not configured")]
    Configuration,

    #[error("Failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    /// Signature is valid but `exp` has passed
    #[error("Token has expired")]
    Expired,

    /// Malformed token or bad signature
    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// HMAC keys derived from the configured secret.
#[derive(Clone)]
struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    keys: Option<Keys>,
    duration_secs: i64,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("keys", &self.keys.as_ref().map(|_| "[REDACTED]"))
            .field("duration_secs", &self.duration_secs)
            .finish()
    }
}

impl TokenIssuer {
    /// Create an issuer. An absent or empty secret leaves it unconfigured,
    /// and every operation then fails with [`TokenError::Configuration`].
    pub fn new(secret: Option<&str>, duration_secs: i64) -> Self {
        let keys = secret.filter(|s| !s.is_empty()).map(|s| Keys {
            encoding: EncodingKey::from_secret(s.as_bytes()),
            decoding: DecodingKey::from_secret(s.as_bytes()),
        });
        Self {
            keys,
            duration_secs,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.token_secret.as_deref(), config.token_duration_secs)
    }

    /// Lifetime of tokens produced by [`issue`](Self::issue)
    pub fn duration_secs(&self) -> i64 {
        self.duration_secs
    }

    /// Sign a token for `subject_id` with the configured lifetime.
    pub fn issue(&self, subject_id: i64) -> Result<String, TokenError> {
        self.issue_with_ttl(subject_id, self.duration_secs)
    }

    /// Sign a token that expires `ttl_secs` from now. A negative ttl gives an
    /// already expired token.
    pub fn issue_with_ttl(&self, subject_id: i64, ttl_secs: i64) -> Result<String, TokenError> {
        let keys = self.keys()?;
        let now = Utc::now().timestamp();
        let claims = Claims {
            id: subject_id,
            iat: now,
            exp: now + ttl_secs,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(TokenError::Signing)
    }

    /// Verify signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_with(token, true)
    }

    /// Verify the signature only, returning claims even when expired.
    pub fn decode_ignoring_expiry(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_with(token, false)
    }

    fn decode_with(&self, token: &str, validate_exp: bool) -> Result<Claims, TokenError> {
        let keys = self.keys()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        if !validate_exp {
            validation.required_spec_claims.clear();
        }

        decode::<Claims>(token, &keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }

    fn keys(&self) -> Result<&Keys, TokenError> {
        self.keys.as_ref().ok_or(TokenError::Configuration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(Some("test-secret"), 86_400)
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = issuer();
        let token = issuer.issue(42).unwrap();
        let claims = issuer.verify(&token).unwrap();

        assert_eq!(claims.id, 42);
        assert_eq!(claims.exp - claims.iat, 86_400);
    }

    #[test]
    fn test_missing_secret_is_configuration_error() {
        for secret in [None, Some("")] {
            let issuer = TokenIssuer::new(secret, 60);
            assert!(matches!(issuer.issue(1), Err(TokenError::Configuration)));
            assert!(matches!(issuer.verify("x.y.z"), Err(TokenError::Configuration)));
        }
    }

    #[test]
    fn test_expired_token_reports_expiry() {
        let issuer = issuer();
        let token = issuer.issue_with_ttl(9, -5).unwrap();

        assert!(matches!(issuer.verify(&token), Err(TokenError::Expired)));
        let claims = issuer.decode_ignoring_expiry(&token).unwrap();
        assert_eq!(claims.id, 9);
    }

    #[test]
    fn test_wrong_secret_is_invalid_even_when_ignoring_expiry() {
        let token = issuer().issue(3).unwrap();
        let other = TokenIssuer::new(Some("another-secret"), 60);

        assert!(matches!(other.verify(&token), Err(TokenError::Invalid(_))));
        assert!(matches!(
            other.decode_ignoring_expiry(&token),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert!(matches!(issuer().verify("not-a-token"), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let rendered = format!("{:?}", issuer());
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("test-secret"));
    }
}
