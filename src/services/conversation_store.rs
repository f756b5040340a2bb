use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::ConversationTurn;
use crate::observability::record_cache_access;

use super::kv_store::{KeyValueStore, StoreError};

/// Sliding-window conversation memory kept in the shared key-value store.
///
/// Appends are read-modify-write without a transaction; two near-simultaneous
/// messages from the same contact may interleave, which the window tolerates.
#[derive(Clone)]
pub struct ConversationStore {
    store: Arc<dyn KeyValueStore>,
    max_turns: usize,
    ttl: Duration,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn KeyValueStore>, max_turns: usize, ttl: Duration) -> Self {
        Self {
            store,
            max_turns: max_turns.max(1),
            ttl,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Ordered turns, oldest first. Missing, expired or undecodable state reads as empty.
    pub async fn read(&self, key: &str) -> Result<Vec<ConversationTurn>, StoreError> {
        let raw = match self.store.get(key).await? {
            Some(raw) => raw,
            None => {
                record_cache_access("redis", "conversation", false);
                return Ok(Vec::new());
            }
        };
        record_cache_access("redis", "conversation", true);

        match serde_json::from_str::<Vec<ConversationTurn>>(&raw) {
            Ok(turns) => Ok(turns),
            Err(e) => {
                warn!(key = %key, error = %e, "⚠️ Discarding undecodable conversation state");
                Ok(Vec::new())
            }
        }
    }

    /// Append turns, keep the newest `max_turns`, and restart the TTL.
    pub async fn append(&self, key: &str, new_turns: Vec<ConversationTurn>) -> Result<(), StoreError> {
        if new_turns.is_empty() {
            return Ok(());
        }

        let mut turns = self.read(key).await?;
        turns.extend(new_turns);
        if turns.len() > self.max_turns {
            let excess = turns.len() - self.max_turns;
            turns.drain(..excess);
        }

        let serialized = match serde_json::to_string(&turns) {
            Ok(s) => s,
            Err(e) => {
                warn!(key = %key, error = %e, "⚠️ Failed to serialize conversation state");
                return Ok(());
            }
        };
        self.store.set_ex(key, &serialized, self.ttl).await?;
        debug!(key = %key, turns = turns.len(), "💬 Conversation state saved");
        Ok(())
    }

    /// Remove all state for a key immediately, regardless of TTL.
    pub async fn clear(&self, key: &str) -> Result<bool, StoreError> {
        let removed = self.store.delete(key).await?;
        info!(key = %key, removed, "🧹 Conversation state cleared");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::kv_store::MemoryStore;
    use tokio::time::sleep;

    fn store_with(max_turns: usize, ttl: Duration) -> ConversationStore {
        ConversationStore::new(Arc::new(MemoryStore::new()), max_turns, ttl)
    }

    #[tokio::test]
    async fn test_read_missing_key_is_empty() {
        let store = store_with(20, Duration::from_secs(60));
        assert!(store.read("conversation:t:1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_window_keeps_most_recent_turns_oldest_first() {
        let store = store_with(20, Duration::from_secs(60));
        let key = "conversation:t:353871234567";

        for i in 0..25 {
            store
                .append(key, vec![ConversationTurn::user(format!("turn {}", i))])
                .await
                .unwrap();
        }

        let turns = store.read(key).await.unwrap();
        assert_eq!(turns.len(), 20);
        assert_eq!(turns.first().unwrap().content, "turn 5");
        assert_eq!(turns.last().unwrap().content, "turn 24");
    }

    #[tokio::test]
    async fn test_state_expires_after_ttl_without_writes() {
        let store = store_with(20, Duration::from_millis(80));
        let key = "conversation:t:1";

        store
            .append(key, vec![ConversationTurn::user("hola"), ConversationTurn::assistant("¡Hola!")])
            .await
            .unwrap();
        let turns = store.read(key).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, Role::Assistant);

        sleep(Duration::from_millis(150)).await;

        assert!(store.read(key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_resets_ttl() {
        let store = store_with(20, Duration::from_millis(120));
        let key = "conversation:t:2";

        store.append(key, vec![ConversationTurn::user("one")]).await.unwrap();
        sleep(Duration::from_millis(80)).await;
        store.append(key, vec![ConversationTurn::user("two")]).await.unwrap();
        sleep(Duration::from_millis(80)).await;

        // 160ms after the first write but only 80ms after the last one.
        assert_eq!(store.read(key).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_removes_state_immediately() {
        let store = store_with(20, Duration::from_secs(60));
        let key = "conversation:t:3";

        store.append(key, vec![ConversationTurn::user("hello")]).await.unwrap();
        assert!(store.clear(key).await.unwrap());
        assert!(store.read(key).await.unwrap().is_empty());
        assert!(!store.clear(key).await.unwrap());
    }

    #[tokio::test]
    async fn test_undecodable_state_reads_as_empty() {
        let backing = Arc::new(MemoryStore::new());
        backing
            .set_ex("conversation:t:4", "not json", Duration::from_secs(60))
            .await
            .unwrap();
        let store = ConversationStore::new(backing, 20, Duration::from_secs(60));

        assert!(store.read("conversation:t:4").await.unwrap().is_empty());
    }
}
