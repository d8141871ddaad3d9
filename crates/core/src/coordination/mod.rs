//! Shared key-value store used to coordinate the liquidator fleet.
//!
//! Every instance writes only its own TTL-scoped key; fleet-wide counters are
//! mutated exclusively through [`CoordinationStore::atomic_increment`].

#[cfg(feature = "redis")]
mod redis_store;

#[cfg(feature = "redis")]
pub use redis_store::RedisCoordinationStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};

/// Cross-process coordination primitives.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Read a TTL-scoped value. Expired or missing keys yield `None`.
    async fn get_with_ttl(&self, key: &str) -> Result<Option<String>>;

    /// Write a value that expires after `ttl_secs`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Atomically add `amount` to a counter field, returning the new value.
    async fn atomic_increment(&self, key: &str, field: &str, amount: i64) -> Result<i64>;

    /// Read all counter fields stored under `key`.
    async fn get_counters(&self, key: &str) -> Result<HashMap<String, i64>>;

    /// All live keys starting with `prefix`.
    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Single-process store with TTL semantics. Counter keys never expire.
pub struct MemoryCoordinationStore {
    values: DashMap<String, StoredValue>,
    counters: DashMap<String, HashMap<String, i64>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MemoryCoordinationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCoordinationStore")
            .field("values", &self.values.len())
            .field("counters", &self.counters.len())
            .finish()
    }
}

impl Default for MemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store whose TTLs are measured against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            values: DashMap::new(),
            counters: DashMap::new(),
            clock,
        }
    }

    fn purge_expired(&self) {
        let now = self.clock.now();
        self.values.retain(|_, v| v.expires_at > now);
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn get_with_ttl(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let expired = match self.values.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.values.remove(key);
        }
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let ttl = Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX).min(i64::MAX / 1000));
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.values.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn atomic_increment(&self, key: &str, field: &str, amount: i64) -> Result<i64> {
        let mut fields = self.counters.entry(key.to_string()).or_default();
        let value = fields.entry(field.to_string()).or_insert(0);
        *value += amount;
        Ok(*value)
    }

    async fn get_counters(&self, key: &str) -> Result<HashMap<String, i64>> {
        Ok(self
            .counters
            .get(key)
            .map(|fields| fields.clone())
            .unwrap_or_default())
    }

    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.purge_expired();
        let mut keys: Vec<String> = self
            .values
            .iter()
            .map(|e| e.key().clone())
            .chain(self.counters.iter().map(|e| e.key().clone()))
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.remove(key);
        self.counters.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_values_expire_after_ttl() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = MemoryCoordinationStore::with_clock(clock.clone());

        store.set_with_ttl("fleet:instance:a", "{}", 60).await.unwrap();
        assert_eq!(store.get_with_ttl("fleet:instance:a").await.unwrap().as_deref(), Some("{}"));

        clock.advance(Duration::seconds(59));
        assert!(store.get_with_ttl("fleet:instance:a").await.unwrap().is_some());

        clock.advance(Duration::seconds(1));
        assert!(store.get_with_ttl("fleet:instance:a").await.unwrap().is_none());
        assert!(store.list_keys_by_prefix("fleet:").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_atomic_increment_and_delete() {
        let store = MemoryCoordinationStore::new();
        assert_eq!(store.atomic_increment("fleet:global", "checks", 1).await.unwrap(), 1);
        assert_eq!(store.atomic_increment("fleet:global", "checks", 2).await.unwrap(), 3);
        assert_eq!(store.atomic_increment("fleet:global", "liqs", 5).await.unwrap(), 5);

        let counters = store.get_counters("fleet:global").await.unwrap();
        assert_eq!(counters["checks"], 3);
        assert_eq!(counters["liqs"], 5);

        store.delete("fleet:global").await.unwrap();
        assert!(store.get_counters("fleet:global").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_keys_by_prefix_includes_counters() {
        let store = MemoryCoordinationStore::new();
        store.set_with_ttl("fleet:instance:a", "1", 60).await.unwrap();
        store.set_with_ttl("other:b", "2", 60).await.unwrap();
        store.atomic_increment("fleet:global", "checks", 1).await.unwrap();

        let keys = store.list_keys_by_prefix("fleet:").await.unwrap();
        assert_eq!(keys, vec!["fleet:global".to_string(), "fleet:instance:a".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_increments_do_not_lose_updates() {
        let store = Arc::new(MemoryCoordinationStore::new());
        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.atomic_increment("k", "f", 1).await.unwrap() })
            })
            .collect();
        futures::future::join_all(tasks).await;
        assert_eq!(store.get_counters("k").await.unwrap()["f"], 50);
    }
}
