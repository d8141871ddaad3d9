//! Configuration system for the liquidation sentinel.
//!
//! This module provides:
//! - Runtime configuration (profiles, thresholds, timing)
//! - Environment overrides for the recognized variables
//! - `${VAR}` expansion for connection strings

mod env;
mod sentinel;

pub use env::{env_override, expand_env};
pub use sentinel::{
    ConnectionsConfig, FleetConfig, LedgerConfig, PoolEntry, PriceConfig, SentinelConfig,
};
