//! Liquidator fleet health monitoring.

mod health;
mod monitor;

pub use health::{
    generate_instance_id, FleetInstanceHealth, GlobalMetrics, InstanceStatus, JobToken,
    TOTAL_CHECKS_FIELD, TOTAL_LIQUIDATIONS_FIELD,
};
pub use monitor::{until_next_local_midnight, FleetHealthMonitor};
