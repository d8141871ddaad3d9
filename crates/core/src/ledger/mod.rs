//! Liquidation outcome ledger with automatic token blacklisting.
//!
//! Every liquidation is recorded with its realized loss. When the loss is
//! strictly above the configured threshold the token is blacklisted on chain
//! so no new loans can be opened against it.

mod history;
mod record;

pub use record::{
    compute_loss_bps, LiquidationOutcome, LiquidationRecord, RecordResult, TokenBlacklistUpdate,
    TokenLiquidationStats, BPS_DIVISOR,
};

use parking_lot::RwLock;
use sentinel_chain::ChainAdmin;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::alert::{AlertEvent, AlertSeverity, AlertSink};
use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::durable::DurableStore;
use crate::error::SentinelError;
use history::History;

const ALERT_CATEGORY: &str = "liquidation";
const ALERT_SOURCE: &str = "liquidation-ledger";

/// Default page size for [`LiquidationLedger::recent_liquidations`].
pub const DEFAULT_RECENT_LIMIT: usize = 20;

fn as_percent(bps: u64) -> f64 {
    bps as f64 / 100.0
}

/// Run an external call under `limit`, folding a timeout into its error.
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            let ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
            Err(SentinelError::Timeout(ms).into())
        }
    }
}

/// Records liquidation outcomes and enforces the loss threshold.
pub struct LiquidationLedger {
    config: LedgerConfig,
    history: RwLock<History>,
    durable: Arc<dyn DurableStore>,
    chain: Arc<dyn ChainAdmin>,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LiquidationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiquidationLedger")
            .field("threshold_bps", &self.config.auto_blacklist_threshold_bps)
            .field("history", &self.history.read().len())
            .finish()
    }
}

impl LiquidationLedger {
    pub fn new(
        config: LedgerConfig,
        durable: Arc<dyn DurableStore>,
        chain: Arc<dyn ChainAdmin>,
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let history = RwLock::new(History::new(config.history_cap));
        Self {
            config,
            history,
            durable,
            chain,
            alerts,
            clock,
        }
    }

    /// Record a completed liquidation. Never fails: persistence, chain and
    /// alert errors are logged and reported through alerts.
    #[instrument(skip(self, outcome), fields(loan = %outcome.loan_id, mint = %outcome.token_mint))]
    pub async fn record_result(&self, outcome: LiquidationOutcome) -> RecordResult {
        let threshold_bps = self.config.auto_blacklist_threshold_bps;
        let loss_bps = compute_loss_bps(outcome.expected_sol_recovery, outcome.actual_sol_recovery);
        let should_blacklist = loss_bps > threshold_bps;

        let record = LiquidationRecord {
            loan_id: outcome.loan_id,
            loan_pda: outcome.loan_pda,
            token_mint: outcome.token_mint,
            token_symbol: outcome.token_symbol,
            expected_sol_recovery: outcome.expected_sol_recovery,
            actual_sol_recovery: outcome.actual_sol_recovery,
            loss_bps,
            timestamp: self.clock.now(),
            auto_blacklisted: should_blacklist,
            tx_signature: outcome.tx_signature,
        };

        if let Some(evicted) = self.history.write().push(record.clone()) {
            debug!(loan = %evicted.loan_id, "Evicted oldest liquidation from history");
        }

        let persisted = bounded(
            self.config.store_timeout(),
            self.durable.create_liquidation_record(&record),
        )
        .await;
        if let Err(e) = persisted {
            let err = SentinelError::persistence(format!("{:#}", e));
            error!(error = %err, "Failed to persist liquidation record");
        }

        self.emit(self.outcome_alert(&record, should_blacklist)).await;

        if should_blacklist {
            self.auto_blacklist(&record).await;
        }

        info!(
            loss_bps,
            blacklisted = should_blacklist,
            expected = record.expected_sol_recovery,
            actual = record.actual_sol_recovery,
            "Liquidation recorded"
        );

        RecordResult {
            blacklisted: should_blacklist,
            loss_bps,
        }
    }

    fn outcome_alert(&self, record: &LiquidationRecord, should_blacklist: bool) -> AlertEvent {
        let threshold_bps = self.config.auto_blacklist_threshold_bps;
        let (severity, event_type, message) = if should_blacklist {
            (
                AlertSeverity::Critical,
                "LIQUIDATION_LOSS_BLACKLIST",
                format!(
                    "Liquidation of {} lost {:.2}% (threshold {:.2}%), blacklisting token",
                    record.token_symbol,
                    as_percent(record.loss_bps),
                    as_percent(threshold_bps)
                ),
            )
        } else if record.has_loss() {
            (
                AlertSeverity::High,
                "LIQUIDATION_LOSS",
                format!(
                    "Liquidation of {} lost {:.2}%",
                    record.token_symbol,
                    as_percent(record.loss_bps)
                ),
            )
        } else {
            (
                AlertSeverity::Low,
                "LIQUIDATION_FULL_RECOVERY",
                format!("Liquidation of {} fully recovered", record.token_symbol),
            )
        };

        let mut event = AlertEvent::new(
            severity,
            ALERT_CATEGORY,
            event_type,
            ALERT_SOURCE,
            message,
            record.timestamp,
        )
        .with_details(json!({
            "loanId": record.loan_id,
            "loanPda": record.loan_pda,
            "tokenMint": record.token_mint,
            "tokenSymbol": record.token_symbol,
            "expectedSolRecovery": record.expected_sol_recovery,
            "actualSolRecovery": record.actual_sol_recovery,
            "lossLamports": record.loss_lamports(),
            "lossBps": record.loss_bps,
            "thresholdBps": threshold_bps,
        }));
        if let Some(sig) = &record.tx_signature {
            event = event.with_tx_signature(sig.clone());
        }
        event
    }

    /// Blacklist the token on chain, then mirror the flag to durable storage.
    /// A failed transaction is not retried.
    async fn auto_blacklist(&self, record: &LiquidationRecord) {
        let threshold_bps = self.config.auto_blacklist_threshold_bps;
        let mint = record.token_mint.as_str();

        let sent = bounded(
            self.config.blacklist_timeout(),
            self.chain.blacklist_token(mint, &self.config.admin_authority),
        )
        .await;
        match sent {
            Ok(signature) => {
                let reason = format!(
                    "Auto-blacklisted: liquidation loss {:.2}% exceeded threshold {:.2}% (loan {})",
                    as_percent(record.loss_bps),
                    as_percent(threshold_bps),
                    record.loan_id
                );
                warn!(mint, tx = %signature, "Token blacklisted on chain");

                let update = TokenBlacklistUpdate {
                    blacklisted: true,
                    reason: reason.clone(),
                };
                let persisted = bounded(
                    self.config.store_timeout(),
                    self.durable.update_token_blacklist(mint, update),
                )
                .await;
                if let Err(e) = persisted {
                    let err = SentinelError::persistence(format!("{:#}", e));
                    error!(mint, error = %err, "Failed to persist token blacklist state");
                }

                let event = AlertEvent::new(
                    AlertSeverity::Critical,
                    ALERT_CATEGORY,
                    "TOKEN_AUTO_BLACKLISTED",
                    ALERT_SOURCE,
                    format!("Token {} ({}) auto-blacklisted", record.token_symbol, mint),
                    self.clock.now(),
                )
                .with_details(json!({
                    "tokenMint": mint,
                    "tokenSymbol": record.token_symbol,
                    "loanId": record.loan_id,
                    "lossBps": record.loss_bps,
                    "thresholdBps": threshold_bps,
                    "reason": reason,
                }))
                .with_tx_signature(signature);
                self.emit(event).await;
            }
            Err(e) => {
                let err = SentinelError::BlacklistTx {
                    mint: mint.to_string(),
                    reason: format!("{:#}", e),
                };
                error!(error = %err, "Automatic blacklist failed, manual follow-up required");

                let event = AlertEvent::new(
                    AlertSeverity::Critical,
                    ALERT_CATEGORY,
                    "AUTO_BLACKLIST_FAILED",
                    ALERT_SOURCE,
                    format!(
                        "Failed to blacklist {} ({}) after {:.2}% loss: manual action required",
                        record.token_symbol,
                        mint,
                        as_percent(record.loss_bps)
                    ),
                    self.clock.now(),
                )
                .with_details(json!({
                    "tokenMint": mint,
                    "tokenSymbol": record.token_symbol,
                    "loanId": record.loan_id,
                    "lossBps": record.loss_bps,
                    "thresholdBps": threshold_bps,
                    "error": err.to_string(),
                }));
                self.emit(event).await;
            }
        }
    }

    async fn emit(&self, event: AlertEvent) {
        let event_type = event.event_type.clone();
        if let Err(e) = self.alerts.log(event).await {
            let err = SentinelError::AlertDelivery(format!("{:#}", e));
            warn!(event_type = %event_type, error = %err, "Alert not delivered");
        }
    }

    /// Aggregates over the in-process history for one token.
    pub fn token_liquidation_stats(&self, token_mint: &str) -> TokenLiquidationStats {
        let history = self.history.read();
        let mut stats = TokenLiquidationStats::default();
        let mut loss_bps_sum: u128 = 0;

        for record in history.iter().filter(|r| r.token_mint == token_mint) {
            if stats.last_liquidation.is_none() {
                stats.last_liquidation = Some(record.clone());
            }
            stats.total_liquidations += 1;
            stats.total_loss_lamports = stats
                .total_loss_lamports
                .saturating_add(record.loss_lamports());
            loss_bps_sum += record.loss_bps as u128;
        }

        if stats.total_liquidations > 0 {
            stats.avg_loss_bps = loss_bps_sum as f64 / stats.total_liquidations as f64;
        }
        stats
    }

    /// Most recent liquidations, newest first.
    pub fn recent_liquidations(&self, limit: usize) -> Vec<LiquidationRecord> {
        self.history.read().iter().take(limit).cloned().collect()
    }

    /// All liquidations that lost value, newest first.
    pub fn liquidations_with_losses(&self) -> Vec<LiquidationRecord> {
        self.history
            .read()
            .iter()
            .filter(|r| r.has_loss())
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}
