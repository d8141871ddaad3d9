//! Price source abstraction shared by on-chain and off-chain feeds.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Fixed-point scale for prices: lamports per raw token unit, times 10^9.
///
/// Matches the scale the lending program uses when it reads pool prices, so
/// reference prices and pool prices can be compared directly.
pub const PRICE_SCALE: u128 = 1_000_000_000;

/// Lamports per SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Wrapped SOL mint, used as the quote side of every pool.
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Anything that can produce a scaled price for a token mint.
#[async_trait]
pub trait PriceSource: Send + Sync + Debug {
    /// Short name used in logs and validation reasons.
    fn name(&self) -> &str;

    /// Fetch the current price for `token_mint` in [`PRICE_SCALE`] units.
    async fn fetch_price(&self, token_mint: &str) -> Result<u64>;
}
