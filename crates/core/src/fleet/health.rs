//! Fleet health snapshot types and health derivation.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::FleetConfig;

/// Coordination store field holding the fleet-wide check count.
pub const TOTAL_CHECKS_FIELD: &str = "totalChecks24h";
/// Coordination store field holding the fleet-wide liquidation count.
pub const TOTAL_LIQUIDATIONS_FIELD: &str = "totalLiquidations24h";

/// Lifecycle of one liquidator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// No heartbeat recorded yet
    #[default]
    Unknown,
    Healthy,
    /// Healthy, but at least one failure since the last success
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstanceStatus::Unknown => "unknown",
            InstanceStatus::Healthy => "healthy",
            InstanceStatus::Degraded => "degraded",
            InstanceStatus::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Health snapshot of one instance, as written to the coordination store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetInstanceHealth {
    pub instance_id: String,
    pub last_successful_run: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Fleet-wide, not per instance
    pub total_liquidations_24h: u64,
    /// Fleet-wide, not per instance
    pub total_checks_24h: u64,
    pub avg_processing_time_ms: f64,
    pub is_healthy: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: InstanceStatus,
}

impl FleetInstanceHealth {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            last_successful_run: None,
            consecutive_failures: 0,
            total_liquidations_24h: 0,
            total_checks_24h: 0,
            avg_processing_time_ms: 0.0,
            is_healthy: false,
            last_heartbeat: None,
            status: InstanceStatus::Unknown,
        }
    }

    /// Recompute `is_healthy` and `status` as of `now`.
    ///
    /// Healthy requires failures under the threshold, a recent (or absent)
    /// successful run, and a heartbeat within three intervals.
    pub fn evaluate(&mut self, now: DateTime<Utc>, config: &FleetConfig) {
        let failures_ok = self.consecutive_failures < config.consecutive_failure_threshold;
        let run_ok = self
            .last_successful_run
            .map_or(true, |at| now - at < config.no_run_threshold());
        let heartbeat_ok = self
            .last_heartbeat
            .is_some_and(|at| now - at < config.heartbeat_stale_after());

        self.is_healthy = failures_ok && run_ok && heartbeat_ok;
        self.status = if self.last_heartbeat.is_none() {
            InstanceStatus::Unknown
        } else if !self.is_healthy {
            InstanceStatus::Unhealthy
        } else if self.consecutive_failures > 0 {
            InstanceStatus::Degraded
        } else {
            InstanceStatus::Healthy
        };
    }

    /// Whether the last successful run is older than the no-run threshold.
    pub fn is_run_stale(&self, now: DateTime<Utc>, config: &FleetConfig) -> bool {
        self.last_successful_run
            .is_some_and(|at| now - at >= config.no_run_threshold())
    }
}

/// Fleet-wide counters, reset by the daily cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalMetrics {
    pub total_liquidations_24h: u64,
    pub total_checks_24h: u64,
}

/// Start marker returned by `record_job_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobToken(pub(crate) DateTime<Utc>);

/// Host name, process id and a random suffix, e.g. `worker-3-4121-9f0c2a`.
pub fn generate_instance_id() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    let suffix: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
    format!("{}-{}-{:06x}", host, std::process::id(), suffix)
}
