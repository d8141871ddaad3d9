//! Liquidation price sanity checks.
//!
//! A liquidation may only proceed when the reference price (aggregator) and
//! the protocol's own pool price agree within a configured deviation.

use futures::future::join;
use sentinel_chain::PriceSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::ledger::BPS_DIVISOR;

/// Default maximum deviation between reference and pool price (20%).
pub const DEFAULT_MAX_DEVIATION_BPS: u64 = 2000;

/// Outcome of a price comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceValidationResult {
    pub valid: bool,
    pub deviation_bps: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PriceValidationResult {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            deviation_bps: BPS_DIVISOR,
            reason: Some(reason.into()),
        }
    }
}

fn as_percent(bps: u64) -> f64 {
    bps as f64 / 100.0
}

/// Compare a reference price against the pool price.
///
/// Deviation is measured relative to the smaller of the two prices, so a pool
/// price 20% above the reference and one 20% below do not yield the same
/// figure. The boundary is inclusive.
pub fn validate(reference_price: u64, pool_price: u64, max_deviation_bps: u64) -> PriceValidationResult {
    if reference_price == 0 || pool_price == 0 {
        return PriceValidationResult::rejected("Zero or negative price");
    }

    let (high, low) = if reference_price > pool_price {
        (reference_price, pool_price)
    } else {
        (pool_price, reference_price)
    };
    let spread = (high - low) as u128;
    let deviation = spread * BPS_DIVISOR as u128 / low as u128;
    let deviation_bps = u64::try_from(deviation).unwrap_or(u64::MAX);

    if deviation_bps <= max_deviation_bps {
        return PriceValidationResult {
            valid: true,
            deviation_bps,
            reason: None,
        };
    }

    PriceValidationResult {
        valid: false,
        deviation_bps,
        reason: Some(format!(
            "Price deviation {:.2}% exceeds maximum {:.2}%",
            as_percent(deviation_bps),
            as_percent(max_deviation_bps)
        )),
    }
}

/// Fetches both prices with a bounded timeout and validates them.
pub struct PriceGate {
    reference: Arc<dyn PriceSource>,
    pool: Arc<dyn PriceSource>,
    max_deviation_bps: u64,
    fetch_timeout: Duration,
}

impl std::fmt::Debug for PriceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceGate")
            .field("reference", &self.reference.name())
            .field("pool", &self.pool.name())
            .field("max_deviation_bps", &self.max_deviation_bps)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl PriceGate {
    pub fn new(
        reference: Arc<dyn PriceSource>,
        pool: Arc<dyn PriceSource>,
        max_deviation_bps: u64,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            reference,
            pool,
            max_deviation_bps,
            fetch_timeout,
        }
    }

    /// Whether a liquidation of `token_mint` may proceed at current prices.
    #[instrument(skip(self), fields(reference = self.reference.name(), pool = self.pool.name()))]
    pub async fn check(&self, token_mint: &str) -> PriceValidationResult {
        let (reference, pool) = join(
            self.fetch(self.reference.as_ref(), token_mint),
            self.fetch(self.pool.as_ref(), token_mint),
        )
        .await;

        let result = match (reference, pool) {
            (Ok(reference_price), Ok(pool_price)) => {
                debug!(reference_price, pool_price, "Fetched prices");
                validate(reference_price, pool_price, self.max_deviation_bps)
            }
            (Err(reason), _) | (_, Err(reason)) => PriceValidationResult::rejected(reason),
        };

        if !result.valid {
            warn!(
                mint = token_mint,
                deviation_bps = result.deviation_bps,
                reason = result.reason.as_deref().unwrap_or(""),
                "Liquidation price rejected"
            );
        }
        result
    }

    async fn fetch(&self, source: &dyn PriceSource, token_mint: &str) -> Result<u64, String> {
        match tokio::time::timeout(self.fetch_timeout, source.fetch_price(token_mint)).await {
            Ok(Ok(price)) => Ok(price),
            Ok(Err(e)) => Err(format!("Price fetch failed ({}): {}", source.name(), e)),
            Err(_) => Err(format!("Price fetch timed out ({})", source.name())),
        }
    }
}
