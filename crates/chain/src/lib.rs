//! Sentinel chain interaction layer.
//!
//! This crate provides:
//! - The `ChainAdmin` interface and its Solana implementation (token blacklist)
//! - The `PriceSource` interface shared with off-chain price feeds
//! - On-chain pool price readers (bonding curves, constant-product AMMs)

mod admin;
mod pool;
mod price;

pub use admin::{
    build_blacklist_instruction, derive_protocol_state, derive_token_config,
    instruction_discriminator, ChainAdmin, SolanaChainAdmin, PROTOCOL_STATE_SEED,
    TOKEN_CONFIG_SEED,
};
pub use pool::{parse_amm_price, parse_bonding_curve_price, PoolInfo, PoolPriceReader, PoolType};
pub use price::{PriceSource, LAMPORTS_PER_SOL, PRICE_SCALE, SOL_MINT};

pub use solana_client::nonblocking::rpc_client::RpcClient;
pub use solana_sdk::pubkey::Pubkey;
