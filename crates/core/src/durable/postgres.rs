//! Postgres durable store.
//!
//! Expects `liquidation_records` and `token_configs` tables to exist; schema
//! management is owned by the API service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::DurableStore;
use crate::ledger::{LiquidationRecord, TokenBlacklistUpdate};

fn to_i64(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("{} {} exceeds BIGINT range", field, value))
}

/// Durable store writing through a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PgDurableStore {
    pool: PgPool,
}

impl PgDurableStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a small pool (the sentinel writes rarely).
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;
        info!("Connected to Postgres durable store");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl DurableStore for PgDurableStore {
    async fn create_liquidation_record(&self, record: &LiquidationRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO liquidation_records \
             (loan_id, loan_pda, token_mint, token_symbol, expected_sol_recovery, \
              actual_sol_recovery, loss_bps, created_at, auto_blacklisted, tx_signature) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (loan_id) DO NOTHING",
        )
        .bind(&record.loan_id)
        .bind(&record.loan_pda)
        .bind(&record.token_mint)
        .bind(&record.token_symbol)
        .bind(to_i64(record.expected_sol_recovery, "expected_sol_recovery")?)
        .bind(to_i64(record.actual_sol_recovery, "actual_sol_recovery")?)
        .bind(to_i64(record.loss_bps, "loss_bps")?)
        .bind(record.timestamp)
        .bind(record.auto_blacklisted)
        .bind(record.tx_signature.as_deref())
        .execute(&self.pool)
        .await
        .context("Failed to insert liquidation record")?;

        debug!(loan_id = %record.loan_id, "Liquidation record persisted");
        Ok(())
    }

    async fn update_token_blacklist(&self, token_mint: &str, update: TokenBlacklistUpdate) -> Result<()> {
        let result = sqlx::query(
            "UPDATE token_configs SET blacklisted = $2, blacklist_reason = $3, updated_at = NOW() \
             WHERE mint = $1",
        )
        .bind(token_mint)
        .bind(update.blacklisted)
        .bind(&update.reason)
        .execute(&self.pool)
        .await
        .context("Failed to update token blacklist state")?;

        debug!(
            mint = token_mint,
            rows = result.rows_affected(),
            "Token blacklist state persisted"
        );
        Ok(())
    }
}
