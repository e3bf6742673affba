//! Revoked session tokens
//!
//! Rotated-out tokens are remembered until they could no longer pass the
//! grace check anyway, after which the cache drops them. Entries only ever
//! leave by expiry; a full store refuses new entries instead.

use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AuthConfig;
use crate::services::session::ROTATION_THRESHOLD_SECS;

/// Revocation store errors
#[derive(Debug, thiserror::Error)]
pub enum RevocationError {
    /// The store holds `capacity` unexpired entries
    #[error("Revocation store is full ({capacity} entries)")]
    Full { capacity: u64 },
}

/// Set of tokens that must no longer be accepted
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Remember `token` until it expires. Fails rather than forgetting
    /// another entry.
    async fn add(&self, token: &str) -> Result<(), RevocationError>;

    async fn contains(&self, token: &str) -> bool;
}

/// In-memory revocation store using moka
pub struct MemoryRevocationStore {
    cache: Cache<String, ()>,
    capacity: u64,
}

impl std::fmt::Debug for MemoryRevocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRevocationStore")
            .field("entry_count", &self.cache.entry_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl MemoryRevocationStore {
    /// The cache itself is unbounded so moka never evicts for size; the
    /// limit is enforced in [`add`](RevocationStore::add).
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_live(ttl).build();
        Self { cache, capacity }
    }

    /// Size the store so entries outlive the grace interval.
    ///
    /// A token is revoked at most `ROTATION_THRESHOLD_SECS` before it
    /// expires, so it stops mattering once the grace interval has passed too.
    pub fn from_config(config: &AuthConfig) -> Self {
        let retention = config
            .grace_interval_secs
            .saturating_add(ROTATION_THRESHOLD_SECS)
            .max(0);
        Self::new(
            config.revocation_capacity,
            Duration::from_secs(u64::try_from(retention).unwrap_or(0)),
        )
    }

    pub fn boxed(self) -> Arc<dyn RevocationStore> {
        Arc::new(self)
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn add(&self, token: &str) -> Result<(), RevocationError> {
        if self.cache.contains_key(token) {
            return Ok(());
        }
        // entry_count only reflects inserts and expiries once pending tasks ran
        self.cache.run_pending_tasks().await;
        if self.cache.entry_count() >= self.capacity {
            tracing::error!(capacity = self.capacity, "Revocation store is full");
            return Err(RevocationError::Full {
                capacity: self.capacity,
            });
        }
        self.cache.insert(token.to_string(), ()).await;
        Ok(())
    }

    async fn contains(&self, token: &str) -> bool {
        self.cache.contains_key(token)
    }
}
