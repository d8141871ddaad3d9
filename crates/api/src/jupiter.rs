//! Jupiter price API client (reference prices).

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use sentinel_chain::{PriceSource, LAMPORTS_PER_SOL, PRICE_SCALE, SOL_MINT};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Default token decimals (Pumpfun mints use 6).
const DEFAULT_DECIMALS: u8 = 6;

#[derive(Clone, Copy)]
struct CachedPrice {
    price: u64,
    cached_at: Instant,
}

/// Jupiter price client quoting tokens in SOL.
#[derive(Clone)]
pub struct JupiterPriceClient {
    client: reqwest::Client,
    base_url: String,
    /// Token decimals by mint; unknown mints use [`DEFAULT_DECIMALS`]
    decimals: Arc<DashMap<String, u8>>,
    cache: Arc<DashMap<String, CachedPrice>>,
    /// Cache TTL (default: 2 seconds)
    cache_ttl: Duration,
}

impl std::fmt::Debug for JupiterPriceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JupiterPriceClient")
            .field("base_url", &self.base_url)
            .field("cache_size", &self.cache.len())
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl Default for JupiterPriceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    data: HashMap<String, Option<PriceEntry>>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    price: String,
}

impl JupiterPriceClient {
    /// Create a client against the public Jupiter API.
    pub fn new() -> Self {
        Self::with_base_url("https://api.jup.ag")
    }

    /// Create a client with a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            decimals: Arc::new(DashMap::new()),
            cache: Arc::new(DashMap::new()),
            cache_ttl: Duration::from_secs(2),
        }
    }

    /// Record the decimals of a token mint.
    pub fn register_decimals(&self, token_mint: &str, decimals: u8) {
        self.decimals.insert(token_mint.to_string(), decimals);
    }

    fn decimals_for(&self, token_mint: &str) -> u8 {
        self.decimals
            .get(token_mint)
            .map(|d| *d)
            .unwrap_or(DEFAULT_DECIMALS)
    }

    /// Convert SOL per whole token into lamports per raw unit, scaled by [`PRICE_SCALE`].
    pub fn to_scaled_price(sol_per_token: f64, decimals: u8) -> Option<u64> {
        if !sol_per_token.is_finite() || sol_per_token < 0.0 {
            return None;
        }
        let scaled = sol_per_token * LAMPORTS_PER_SOL as f64 * PRICE_SCALE as f64
            / 10f64.powi(decimals as i32);
        if scaled > u64::MAX as f64 {
            return None;
        }
        Some(scaled.round() as u64)
    }

    /// Drop expired cache entries.
    pub fn cleanup_cache(&self) {
        self.cache.retain(|_, cached| cached.cached_at.elapsed() < self.cache_ttl);
    }

    async fn request_price(&self, token_mint: &str) -> Result<f64> {
        let url = format!("{}/price/v2", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("ids", token_mint), ("vsToken", SOL_MINT)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Jupiter API error: {} - {}", status, body);
        }

        let body: PriceResponse = response.json().await?;
        let entry = body
            .data
            .get(token_mint)
            .and_then(|e| e.as_ref())
            .ok_or_else(|| anyhow!("No Jupiter price for {}", token_mint))?;

        entry
            .price
            .parse::<f64>()
            .map_err(|e| anyhow!("Invalid Jupiter price '{}': {}", entry.price, e))
    }
}

#[async_trait]
impl PriceSource for JupiterPriceClient {
    fn name(&self) -> &str {
        "jupiter"
    }

    #[instrument(skip(self))]
    async fn fetch_price(&self, token_mint: &str) -> Result<u64> {
        if let Some(cached) = self.cache.get(token_mint) {
            if cached.cached_at.elapsed() < self.cache_ttl {
                return Ok(cached.price);
            }
        }

        let sol_per_token = self.request_price(token_mint).await?;
        let decimals = self.decimals_for(token_mint);
        let price = Self::to_scaled_price(sol_per_token, decimals)
            .ok_or_else(|| anyhow!("Unusable Jupiter price {} for {}", sol_per_token, token_mint))?;

        debug!(mint = token_mint, sol_per_token, decimals, price, "Fetched reference price");

        self.cache.insert(
            token_mint.to_string(),
            CachedPrice {
                price,
                cached_at: Instant::now(),
            },
        );

        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_scaled_price() {
        // 0.000001 SOL per token, 6 decimals: 1 lamport per raw unit / 1e6 * 1e9
        assert_eq!(JupiterPriceClient::to_scaled_price(0.000001, 6), Some(1_000_000));
        // 1 SOL per token, 9 decimals: 1 lamport per raw unit
        assert_eq!(JupiterPriceClient::to_scaled_price(1.0, 9), Some(1_000_000_000));
        assert_eq!(JupiterPriceClient::to_scaled_price(-1.0, 6), None);
        assert_eq!(JupiterPriceClient::to_scaled_price(f64::NAN, 6), None);
    }

    #[test]
    fn test_decimals_registry() {
        let client = JupiterPriceClient::new();
        assert_eq!(client.decimals_for("unknown"), DEFAULT_DECIMALS);
        client.register_decimals("mint", 9);
        assert_eq!(client.decimals_for("mint"), 9);
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"data":{"abc":{"id":"abc","type":"derivedPrice","price":"0.0000312"},"missing":null},"timeTaken":0.01}"#;
        let parsed: PriceResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data["abc"].as_ref().unwrap().price, "0.0000312");
        assert!(parsed.data["missing"].is_none());
    }
}
