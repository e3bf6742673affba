//! Session token lifecycle
//!
//! Decides whether a presented token is accepted, and rotates it when it is
//! close to expiry or has expired within the grace interval.

use chrono::Utc;
use std::sync::Arc;

use crate::services::revocation::{RevocationError, RevocationStore};
use crate::services::token::{TokenError, TokenIssuer};

/// Tokens with less than this many seconds left are rotated.
pub const ROTATION_THRESHOLD_SECS: i64 = 60;

/// Authentication failures
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Access denied. Sign in again!")]
    Unauthenticated,

    #[error("Token has expired. Sign in again!")]
    Revoked,

    #[error("Invalid or expired token. Sign in again!")]
    Invalid,

    #[error("Internal error: {0}")]
    Internal(#[from] TokenError),

    #[error("Internal error: {0}")]
    Revocation(#[from] RevocationError),

    /// The replacement token came out byte-identical to the presented one
    #[error("Internal error: session token could not be rotated")]
    RotationCollision,
}

/// An accepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardOutcome {
    pub subject_id: i64,
    /// Replacement token when the presented one was rotated
    pub rotated: Option<String>,
}

/// Evaluates presented session tokens.
#[derive(Clone)]
pub struct SessionGuard {
    issuer: Arc<TokenIssuer>,
    revocations: Arc<dyn RevocationStore>,
    grace_secs: i64,
}

impl SessionGuard {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        revocations: Arc<dyn RevocationStore>,
        grace_secs: i64,
    ) -> Self {
        Self {
            issuer,
            revocations,
            grace_secs,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Accept, rotate or reject `token`.
    pub async fn evaluate(&self, token: Option<&str>) -> Result<GuardOutcome, AuthError> {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthError::Unauthenticated),
        };

        if self.revocations.contains(token).await {
            return Err(AuthError::Revoked);
        }

        let now = Utc::now().timestamp();
        match self.issuer.verify(token) {
            Ok(claims) if claims.seconds_left(now) >= ROTATION_THRESHOLD_SECS => Ok(GuardOutcome {
                subject_id: claims.id,
                rotated: None,
            }),
            Ok(claims) => self.rotate(token, claims.id).await,
            Err(TokenError::Expired) => {
                let claims = self
                    .issuer
                    .decode_ignoring_expiry(token)
                    .map_err(|_| AuthError::Invalid)?;
                if claims.within_grace(now, self.grace_secs) {
                    self.rotate(token, claims.id).await
                } else {
                    tracing::debug!(subject = claims.id, "Token expired beyond grace interval");
                    Err(AuthError::Invalid)
                }
            }
            Err(TokenError::Invalid(reason)) => {
                tracing::debug!(%reason, "Rejected session token");
                Err(AuthError::Invalid)
            }
            Err(e) => Err(AuthError::Internal(e)),
        }
    }

    async fn rotate(&self, old: &str, subject_id: i64) -> Result<GuardOutcome, AuthError> {
        let fresh = self.issuer.issue(subject_id)?;
        if fresh == old {
            tracing::error!(
                subject = subject_id,
                duration_secs = self.issuer.duration_secs(),
                "Rotation produced the presented token again"
            );
            return Err(AuthError::RotationCollision);
        }
        // The replacement is only handed out once the old token is revoked
        self.revocations.add(old).await?;
        tracing::debug!(subject = subject_id, "Rotated session token");
        Ok(GuardOutcome {
            subject_id,
            rotated: Some(fresh),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::revocation::MemoryRevocationStore;
    use std::time::Duration;

    const GRACE: i64 = 3_600;

    fn guard() -> (SessionGuard, Arc<MemoryRevocationStore>) {
        let store = Arc::new(MemoryRevocationStore::new(100, Duration::from_secs(60)));
        let issuer = Arc::new(TokenIssuer::new(Some("guard-secret"), 86_400));
        (SessionGuard::new(issuer, store.clone(), GRACE), store)
    }

    #[tokio::test]
    async fn test_missing_token() {
        let (guard, _) = guard();
        assert!(matches!(guard.evaluate(None).await, Err(AuthError::Unauthenticated)));
        assert!(matches!(guard.evaluate(Some("")).await, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_fresh_token_is_accepted_without_rotation() {
        let (guard, store) = guard();
        let token = guard.issuer().issue(5).unwrap();

        let outcome = guard.evaluate(Some(&token)).await.unwrap();
        assert_eq!(outcome, GuardOutcome { subject_id: 5, rotated: None });
        assert!(!store.contains(&token).await);
    }

    #[tokio::test]
    async fn test_stale_token_rotates_once() {
        let (guard, store) = guard();
        let token = guard.issuer().issue_with_ttl(5, 30).unwrap();

        let outcome = guard.evaluate(Some(&token)).await.unwrap();
        let fresh = outcome.rotated.expect("stale token should rotate");
        assert_eq!(outcome.subject_id, 5);
        assert_ne!(fresh, token);
        assert!(store.contains(&token).await);

        // The replacement is fresh, and the old token is now revoked
        let next = guard.evaluate(Some(&fresh)).await.unwrap();
        assert!(next.rotated.is_none());
        assert!(matches!(guard.evaluate(Some(&token)).await, Err(AuthError::Revoked)));
    }

    #[tokio::test]
    async fn test_expired_within_grace_rotates() {
        let (guard, store) = guard();
        let token = guard.issuer().issue_with_ttl(8, -10).unwrap();

        let outcome = guard.evaluate(Some(&token)).await.unwrap();
        assert_eq!(outcome.subject_id, 8);
        assert!(outcome.rotated.is_some());
        assert!(store.contains(&token).await);
    }

    #[tokio::test]
    async fn test_expired_beyond_grace_is_invalid() {
        let (guard, store) = guard();
        let token = guard.issuer().issue_with_ttl(8, -(GRACE + 10)).unwrap();

        assert!(matches!(guard.evaluate(Some(&token)).await, Err(AuthError::Invalid)));
        assert!(!store.contains(&token).await);
    }

    #[tokio::test]
    async fn test_foreign_signature_is_invalid() {
        let (guard, _) = guard();
        let foreign = TokenIssuer::new(Some("someone-else"), 86_400).issue(1).unwrap();

        assert!(matches!(guard.evaluate(Some(&foreign)).await, Err(AuthError::Invalid)));
        assert!(matches!(guard.evaluate(Some("junk")).await, Err(AuthError::Invalid)));
    }

    #[tokio::test]
    async fn test_revoked_token_is_rejected_before_verification() {
        let (guard, store) = guard();
        let token = guard.issuer().issue(2).unwrap();
        store.add(&token).await.unwrap();

        assert!(matches!(guard.evaluate(Some(&token)).await, Err(AuthError::Revoked)));
    }

    #[tokio::test]
    async fn test_revoked_token_survives_a_full_store() {
        let store = Arc::new(MemoryRevocationStore::new(10, Duration::from_secs(3_660)));
        let issuer = Arc::new(TokenIssuer::new(Some("guard-secret"), 86_400));
        let guard = SessionGuard::new(issuer, store.clone(), GRACE);

        let victim = guard.issuer().issue_with_ttl(1, 30).unwrap();
        assert!(guard.evaluate(Some(&victim)).await.unwrap().rotated.is_some());

        let mut refused = 0;
        for id in 2..=60 {
            let stale = guard.issuer().issue_with_ttl(id, 30).unwrap();
            match guard.evaluate(Some(&stale)).await {
                Ok(outcome) => assert!(outcome.rotated.is_some()),
                Err(AuthError::Revocation(RevocationError::Full { capacity: 10 })) => {
                    // No replacement, and the stale token is not marked revoked
                    assert!(!store.contains(&stale).await);
                    refused += 1;
                }
                Err(e) => panic!("unexpected error: {e:?}"),
            }
        }
        assert_eq!(refused, 50);

        assert!(matches!(guard.evaluate(Some(&victim)).await, Err(AuthError::Revoked)));
    }

    #[tokio::test]
    async fn test_short_duration_never_hands_back_the_revoked_token() {
        let store = Arc::new(MemoryRevocationStore::new(100, Duration::from_secs(60)));
        let issuer = Arc::new(TokenIssuer::new(Some("s"), 30));
        let guard = SessionGuard::new(issuer, store.clone(), GRACE);
        let token = guard.issuer().issue(3).unwrap();

        match guard.evaluate(Some(&token)).await {
            Err(AuthError::RotationCollision) => assert!(!store.contains(&token).await),
            // Issued across a second boundary, so the claims differ
            Ok(outcome) => {
                let fresh = outcome.rotated.expect("short-lived token should rotate");
                assert_ne!(fresh, token);
                assert!(!store.contains(&fresh).await);
            }
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
}
