//! Liquidation sentinel core logic.
//!
//! This crate provides the off-chain safety net around the lending
//! protocol's liquidator fleet:
//! - Price validation (reference feed vs pool price) gating liquidations
//! - Liquidation ledger with loss tracking and automatic token blacklisting
//! - Fleet health monitoring over a shared coordination store
//! - Alert, coordination and durable storage interfaces with in-memory
//!   implementations (Redis and Postgres behind features)

pub mod alert;
pub mod clock;
pub mod config;
pub mod coordination;
pub mod durable;
mod error;
pub mod fleet;
pub mod ledger;
mod price_validator;

pub use alert::{AlertEvent, AlertSeverity, AlertSink, MemoryAlertSink, TracingAlertSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SentinelConfig;
pub use coordination::{CoordinationStore, MemoryCoordinationStore};
pub use durable::{DurableStore, MemoryDurableStore};
pub use error::{Result, SentinelError};
pub use fleet::{
    generate_instance_id, FleetHealthMonitor, FleetInstanceHealth, GlobalMetrics, InstanceStatus,
    JobToken,
};
pub use ledger::{
    compute_loss_bps, LiquidationLedger, LiquidationOutcome, LiquidationRecord, RecordResult,
    TokenBlacklistUpdate, TokenLiquidationStats,
};
pub use price_validator::{validate, PriceGate, PriceValidationResult, DEFAULT_MAX_DEVIATION_BPS};

#[cfg(feature = "redis")]
pub use coordination::RedisCoordinationStore;

#[cfg(feature = "postgres")]
pub use durable::PgDurableStore;
