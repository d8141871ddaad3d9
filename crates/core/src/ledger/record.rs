//! Liquidation outcome records and loss math.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Basis points in 100%.
pub const BPS_DIVISOR: u64 = 10_000;

/// Loss of a liquidation in basis points of the expected recovery.
///
/// Zero when the actual recovery meets or exceeds the expectation (or when
/// nothing was expected); otherwise `floor((expected - actual) * 10000 / expected)`.
pub fn compute_loss_bps(expected_sol_recovery: u64, actual_sol_recovery: u64) -> u64 {
    if expected_sol_recovery == 0 || actual_sol_recovery >= expected_sol_recovery {
        return 0;
    }
    let shortfall = (expected_sol_recovery - actual_sol_recovery) as u128;
    (shortfall * BPS_DIVISOR as u128 / expected_sol_recovery as u128) as u64
}

/// Input to [`crate::LiquidationLedger::record_result`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationOutcome {
    pub loan_id: String,
    pub loan_pda: String,
    pub token_mint: String,
    pub token_symbol: String,
    pub expected_sol_recovery: u64,
    pub actual_sol_recovery: u64,
    pub tx_signature: Option<String>,
}

/// Immutable record of one liquidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationRecord {
    pub loan_id: String,
    pub loan_pda: String,
    pub token_mint: String,
    pub token_symbol: String,
    pub expected_sol_recovery: u64,
    pub actual_sol_recovery: u64,
    pub loss_bps: u64,
    pub timestamp: DateTime<Utc>,
    pub auto_blacklisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_signature: Option<String>,
}

impl LiquidationRecord {
    /// Lamports not recovered, zero when fully recovered.
    pub fn loss_lamports(&self) -> u64 {
        self.expected_sol_recovery
            .saturating_sub(self.actual_sol_recovery)
    }

    pub fn has_loss(&self) -> bool {
        self.loss_bps > 0
    }
}

/// What [`crate::LiquidationLedger::record_result`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResult {
    /// Whether the loss crossed the threshold, independent of the on-chain outcome
    pub blacklisted: bool,
    pub loss_bps: u64,
}

/// Per-token aggregates over the in-process history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenLiquidationStats {
    pub total_liquidations: usize,
    pub total_loss_lamports: u64,
    pub avg_loss_bps: f64,
    pub last_liquidation: Option<LiquidationRecord>,
}

/// Token state change persisted after an automatic blacklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBlacklistUpdate {
    pub blacklisted: bool,
    pub reason: String,
}
