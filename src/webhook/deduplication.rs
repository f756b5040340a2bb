use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::cache_key;
use crate::observability::record_dedup_outcome;
use crate::services::kv_store::KeyValueStore;

/// Message deduplication gate backed by the shared key-value store.
///
/// Every server instance claims through the same store, so a provider retry that
/// lands on another instance is still recognized. Claims outlive the TTL only as
/// long as providers keep retrying within it.
#[derive(Clone)]
pub struct MessageDeduplicator {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    counters: Arc<DeduplicationCounters>,
}

#[derive(Default)]
struct DeduplicationCounters {
    claimed: AtomicU64,
    duplicates: AtomicU64,
    store_errors: AtomicU64,
}

impl MessageDeduplicator {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        info!("🔄 MessageDeduplicator initialized with TTL: {:?}", ttl);
        Self {
            store,
            ttl,
            counters: Arc::new(DeduplicationCounters::default()),
        }
    }

    /// Claim a message id. `true` means this caller owns the message and must process it.
    ///
    /// Fails closed: if the store cannot be reached the message is not claimed, so an
    /// outage can drop a message but never produce a duplicate reply.
    pub async fn try_claim(&self, message_id: &str) -> bool {
        let key = cache_key::message_claim(message_id);
        match self.store.set_nx_ex(&key, "1", self.ttl).await {
            Ok(true) => {
                self.counters.claimed.fetch_add(1, Ordering::Relaxed);
                record_dedup_outcome("claimed");
                debug!("✅ Message claimed: {}", message_id);
                true
            }
            Ok(false) => {
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                record_dedup_outcome("duplicate");
                debug!("⚠️ Duplicate message detected: {}", message_id);
                false
            }
            Err(e) => {
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                record_dedup_outcome("store_error");
                error!(message_id = %message_id, error = %e, "❌ Dedup store unavailable, dropping message");
                false
            }
        }
    }

    /// Get gate statistics for monitoring
    pub fn get_stats(&self) -> DeduplicationStats {
        DeduplicationStats {
            claimed: self.counters.claimed.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            store_errors: self.counters.store_errors.load(Ordering::Relaxed),
            ttl_seconds: self.ttl.as_secs(),
        }
    }
}

/// Statistics for the deduplication gate (per instance)
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeduplicationStats {
    pub claimed: u64,
    pub duplicates: u64,
    pub store_errors: u64,
    pub ttl_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::kv_store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_message_deduplication() {
        let deduplicator = MessageDeduplicator::new(Arc::new(MemoryStore::new()), Duration::from_millis(100));

        // First claim wins
        assert!(deduplicator.try_claim("msg1").await);

        // Same message is a duplicate
        assert!(!deduplicator.try_claim("msg1").await);

        // Different message is independent
        assert!(deduplicator.try_claim("msg2").await);

        // Wait for TTL to expire
        sleep(Duration::from_millis(150)).await;

        // After TTL, a retry is treated as a new message
        assert!(deduplicator.try_claim("msg1").await);
    }

    #[tokio::test]
    async fn test_concurrent_claims_exactly_one_winner() {
        let deduplicator = MessageDeduplicator::new(Arc::new(MemoryStore::new()), Duration::from_secs(60));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let gate = deduplicator.clone();
                tokio::spawn(async move { gate.try_claim("wamid.RACE").await })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();

        assert_eq!(winners, 1);
        let stats = deduplicator.get_stats();
        assert_eq!(stats.claimed, 1);
        assert_eq!(stats.duplicates, 31);
    }

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Connection("down".into()))
        }
        async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Connection("down".into()))
        }
        async fn set_nx_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool, StoreError> {
            Err(StoreError::Connection("down".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Connection("down".into()))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Connection("down".into()))
        }
    }

    #[tokio::test]
    async fn test_store_outage_fails_closed() {
        let deduplicator = MessageDeduplicator::new(Arc::new(BrokenStore), Duration::from_secs(60));

        assert!(!deduplicator.try_claim("msg1").await);
        assert_eq!(deduplicator.get_stats().store_errors, 1);
    }
}
