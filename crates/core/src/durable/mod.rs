//! Durable storage for liquidation records and token state.
//!
//! This is the only cross-process consistent view of liquidations; the
//! ledger's in-memory history is per process.

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::PgDurableStore;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::ledger::{LiquidationRecord, TokenBlacklistUpdate};

/// Persistence for liquidation outcomes. Writes must be safe to repeat.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn create_liquidation_record(&self, record: &LiquidationRecord) -> Result<()>;

    async fn update_token_blacklist(&self, token_mint: &str, update: TokenBlacklistUpdate) -> Result<()>;
}

/// In-process durable store. Records are deduplicated by loan id.
#[derive(Debug, Default)]
pub struct MemoryDurableStore {
    records: RwLock<Vec<LiquidationRecord>>,
    tokens: DashMap<String, TokenBlacklistUpdate>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored records in insertion order.
    pub fn records(&self) -> Vec<LiquidationRecord> {
        self.records.read().clone()
    }

    /// Current blacklist state of a token, if it was ever updated.
    pub fn token_state(&self, token_mint: &str) -> Option<TokenBlacklistUpdate> {
        self.tokens.get(token_mint).map(|t| t.clone())
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn create_liquidation_record(&self, record: &LiquidationRecord) -> Result<()> {
        let mut records = self.records.write();
        if !records.iter().any(|r| r.loan_id == record.loan_id) {
            records.push(record.clone());
        }
        Ok(())
    }

    async fn update_token_blacklist(&self, token_mint: &str, update: TokenBlacklistUpdate) -> Result<()> {
        self.tokens.insert(token_mint.to_string(), update);
        Ok(())
    }
}
