//! On-chain pool price reading.
//!
//! Reads the protocol's own pool accounts (the same accounts the lending
//! program uses for price checks) and converts reserves into a scaled price.
//! Supported layouts:
//! - Pumpfun / PumpSwap bonding curves (virtual reserves)
//! - Raydium / Orca constant-product pools

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::price::{PriceSource, PRICE_SCALE, SOL_MINT};

// Bonding curve layout (after the 8 byte account discriminator)
const CURVE_VIRTUAL_TOKEN_OFFSET: usize = 8;
const CURVE_VIRTUAL_SOL_OFFSET: usize = 16;
const CURVE_MIN_LEN: usize = 24;

// Raydium AMM layout
const AMM_TOKEN_A_AMOUNT_OFFSET: usize = 128;
const AMM_TOKEN_B_AMOUNT_OFFSET: usize = 136;
const AMM_TOKEN_A_MINT_OFFSET: usize = 400;
const AMM_TOKEN_B_MINT_OFFSET: usize = 432;
const AMM_MIN_LEN: usize = 464;

/// Pool program family, mirrors the lending program's `PoolType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolType {
    Raydium,
    Orca,
    Pumpfun,
    PumpSwap,
}

impl FromStr for PoolType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "raydium" => Ok(Self::Raydium),
            "orca" => Ok(Self::Orca),
            "pumpfun" => Ok(Self::Pumpfun),
            "pumpswap" => Ok(Self::PumpSwap),
            other => Err(anyhow!("Unknown pool type: {}", other)),
        }
    }
}

/// Pool registered for a token mint.
#[derive(Debug, Clone, Copy)]
pub struct PoolInfo {
    pub address: Pubkey,
    pub pool_type: PoolType,
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64> {
    let bytes: [u8; 8] = data
        .get(offset..offset + 8)
        .ok_or_else(|| anyhow!("Pool data too short for offset {}", offset))?
        .try_into()?;
    Ok(u64::from_le_bytes(bytes))
}

fn read_pubkey(data: &[u8], offset: usize) -> Result<Pubkey> {
    let bytes = data
        .get(offset..offset + 32)
        .ok_or_else(|| anyhow!("Pool data too short for offset {}", offset))?;
    Ok(Pubkey::try_from(bytes)?)
}

fn scaled_price(sol_amount: u64, token_amount: u64) -> Result<u64> {
    if token_amount == 0 {
        bail!("Pool has zero token reserves");
    }
    let price = (sol_amount as u128) * PRICE_SCALE / token_amount as u128;
    u64::try_from(price).map_err(|_| anyhow!("Pool price overflows u64"))
}

/// Price from a Pumpfun bonding curve account.
pub fn parse_bonding_curve_price(data: &[u8]) -> Result<u64> {
    if data.len() < CURVE_MIN_LEN {
        bail!("Bonding curve data too short: {} bytes", data.len());
    }
    let virtual_token = read_u64(data, CURVE_VIRTUAL_TOKEN_OFFSET)?;
    let virtual_sol = read_u64(data, CURVE_VIRTUAL_SOL_OFFSET)?;
    scaled_price(virtual_sol, virtual_token)
}

/// Price from a Raydium-style AMM account. One side must be wrapped SOL.
pub fn parse_amm_price(data: &[u8], sol_mint: &Pubkey) -> Result<u64> {
    if data.len() < AMM_MIN_LEN {
        bail!("AMM pool data too short: {} bytes", data.len());
    }
    let amount_a = read_u64(data, AMM_TOKEN_A_AMOUNT_OFFSET)?;
    let amount_b = read_u64(data, AMM_TOKEN_B_AMOUNT_OFFSET)?;
    let mint_a = read_pubkey(data, AMM_TOKEN_A_MINT_OFFSET)?;
    let mint_b = read_pubkey(data, AMM_TOKEN_B_MINT_OFFSET)?;

    let (sol_amount, token_amount) = if mint_a == *sol_mint {
        (amount_a, amount_b)
    } else if mint_b == *sol_mint {
        (amount_b, amount_a)
    } else {
        bail!("AMM pool is not paired against SOL");
    };
    scaled_price(sol_amount, token_amount)
}

/// Reads pool prices for registered token mints over RPC.
pub struct PoolPriceReader {
    rpc: Arc<RpcClient>,
    pools: DashMap<String, PoolInfo>,
    sol_mint: Pubkey,
}

impl std::fmt::Debug for PoolPriceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolPriceReader")
            .field("rpc_url", &self.rpc.url())
            .field("pool_count", &self.pools.len())
            .finish()
    }
}

impl PoolPriceReader {
    /// Create a reader on top of a shared RPC client.
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self {
            rpc,
            pools: DashMap::new(),
            sol_mint: Pubkey::from_str(SOL_MINT).unwrap_or_default(),
        }
    }

    /// Register the pool used to price a token mint.
    pub fn register_pool(&self, token_mint: &str, pool: PoolInfo) {
        debug!(
            mint = token_mint,
            pool = %pool.address,
            pool_type = ?pool.pool_type,
            "Registering pool"
        );
        self.pools.insert(token_mint.to_string(), pool);
    }

    /// Pool registered for a mint, if any.
    pub fn pool_for(&self, token_mint: &str) -> Option<PoolInfo> {
        self.pools.get(token_mint).map(|p| *p)
    }

    /// Number of registered pools.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }
}

#[async_trait]
impl PriceSource for PoolPriceReader {
    fn name(&self) -> &str {
        "pool"
    }

    #[instrument(skip(self))]
    async fn fetch_price(&self, token_mint: &str) -> Result<u64> {
        let pool = self
            .pool_for(token_mint)
            .ok_or_else(|| anyhow!("No pool registered for {}", token_mint))?;

        let data = self
            .rpc
            .get_account_data(&pool.address)
            .await
            .with_context(|| format!("Failed to read pool account {}", pool.address))?;

        let price = match pool.pool_type {
            PoolType::Pumpfun | PoolType::PumpSwap => parse_bonding_curve_price(&data)?,
            PoolType::Raydium | PoolType::Orca => parse_amm_price(&data, &self.sol_mint)?,
        };

        debug!(mint = token_mint, price, "Read pool price");
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve_data(virtual_token: u64, virtual_sol: u64) -> Vec<u8> {
        let mut data = vec![0u8; 49];
        data[8..16].copy_from_slice(&virtual_token.to_le_bytes());
        data[16..24].copy_from_slice(&virtual_sol.to_le_bytes());
        data
    }

    fn amm_data(amount_a: u64, amount_b: u64, mint_a: &Pubkey, mint_b: &Pubkey) -> Vec<u8> {
        let mut data = vec![0u8; AMM_MIN_LEN];
        data[128..136].copy_from_slice(&amount_a.to_le_bytes());
        data[136..144].copy_from_slice(&amount_b.to_le_bytes());
        data[400..432].copy_from_slice(mint_a.as_ref());
        data[432..464].copy_from_slice(mint_b.as_ref());
        data
    }

    #[test]
    fn test_bonding_curve_price() {
        // 30 SOL against 1_073_000_000 tokens (6 decimals)
        let data = curve_data(1_073_000_000_000_000, 30_000_000_000);
        let price = parse_bonding_curve_price(&data).unwrap();
        assert_eq!(price, 27_958);
    }

    #[test]
    fn test_bonding_curve_rejects_bad_data() {
        assert!(parse_bonding_curve_price(&[0u8; 10]).is_err());
        assert!(parse_bonding_curve_price(&curve_data(0, 1_000)).is_err());
    }

    #[test]
    fn test_amm_price_either_side() {
        let sol = Pubkey::from_str(SOL_MINT).unwrap();
        let token = Pubkey::new_unique();

        let sol_first = amm_data(2_000_000_000, 1_000_000, &sol, &token);
        assert_eq!(parse_amm_price(&sol_first, &sol).unwrap(), 2_000_000_000_000);

        let sol_second = amm_data(1_000_000, 2_000_000_000, &token, &sol);
        assert_eq!(parse_amm_price(&sol_second, &sol).unwrap(), 2_000_000_000_000);
    }

    #[test]
    fn test_amm_requires_sol_pair() {
        let sol = Pubkey::from_str(SOL_MINT).unwrap();
        let data = amm_data(1, 1, &Pubkey::new_unique(), &Pubkey::new_unique());
        assert!(parse_amm_price(&data, &sol).is_err());
        assert!(parse_amm_price(&[0u8; 100], &sol).is_err());
    }

    #[test]
    fn test_pool_type_parse() {
        assert_eq!("Pumpfun".parse::<PoolType>().unwrap(), PoolType::Pumpfun);
        assert_eq!("raydium".parse::<PoolType>().unwrap(), PoolType::Raydium);
        assert!("uniswap".parse::<PoolType>().is_err());
    }
}
