//! Redis-backed coordination store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use tracing::info;

use super::CoordinationStore;

const SCAN_BATCH: usize = 200;

/// Coordination store shared by all instances through one Redis server.
#[derive(Clone)]
pub struct RedisCoordinationStore {
    connection: MultiplexedConnection,
}

impl std::fmt::Debug for RedisCoordinationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCoordinationStore").finish()
    }
}

impl RedisCoordinationStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid Redis URL")?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to establish Redis connection")?;
        info!("Connected to Redis coordination store");
        Ok(Self { connection })
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn get_with_ttl(&self, key: &str) -> Result<Option<String>> {
        let mut con = self.connection.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut con)
            .await
            .with_context(|| format!("GET {} failed", key))?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut con = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut con)
            .await
            .with_context(|| format!("SET {} failed", key))?;
        Ok(())
    }

    async fn atomic_increment(&self, key: &str, field: &str, amount: i64) -> Result<i64> {
        let mut con = self.connection.clone();
        let value: i64 = redis::cmd("HINCRBY")
            .arg(key)
            .arg(field)
            .arg(amount)
            .query_async(&mut con)
            .await
            .with_context(|| format!("HINCRBY {} {} failed", key, field))?;
        Ok(value)
    }

    async fn get_counters(&self, key: &str) -> Result<HashMap<String, i64>> {
        let mut con = self.connection.clone();
        let fields: HashMap<String, i64> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut con)
            .await
            .with_context(|| format!("HGETALL {} failed", key))?;
        Ok(fields)
    }

    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut con = self.connection.clone();
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut con)
                .await
                .with_context(|| format!("SCAN {} failed", pattern))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut con = self.connection.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut con)
            .await
            .with_context(|| format!("DEL {} failed", key))?;
        Ok(())
    }
}
