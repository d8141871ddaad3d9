//! Fleet health monitor.
//!
//! Each instance owns one TTL-scoped key in the coordination store and
//! refreshes it from a heartbeat task. Job outcomes update the local state,
//! the key, and two fleet-wide counters. Without a usable store the monitor
//! keeps working on process-local state.

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use super::health::{
    generate_instance_id, FleetInstanceHealth, GlobalMetrics, JobToken, TOTAL_CHECKS_FIELD,
    TOTAL_LIQUIDATIONS_FIELD,
};
use crate::alert::{AlertEvent, AlertSeverity, AlertSink};
use crate::clock::Clock;
use crate::config::FleetConfig;
use crate::coordination::CoordinationStore;
use crate::error::SentinelError;

const ALERT_CATEGORY: &str = "fleet";
const ALERT_SOURCE: &str = "fleet-monitor";

const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Process-local view of this instance.
#[derive(Debug, Default)]
struct LocalState {
    last_successful_run: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    last_heartbeat: Option<DateTime<Utc>>,
    samples: VecDeque<u64>,
    avg_processing_time_ms: f64,
    /// Counter fallback when the shared counters are unreachable
    checks: u64,
    liquidations: u64,
}

/// Liveness and success tracking for one liquidator instance.
pub struct FleetHealthMonitor {
    instance_id: String,
    config: FleetConfig,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    store: RwLock<Option<Arc<dyn CoordinationStore>>>,
    state: Mutex<LocalState>,
    /// Shared by both alert kinds
    last_alert: Mutex<Option<DateTime<Utc>>>,
    shutdown_tx: watch::Sender<bool>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for FleetHealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetHealthMonitor")
            .field("instance_id", &self.instance_id)
            .field("store_bound", &self.store.read().is_some())
            .field("consecutive_failures", &self.state.lock().consecutive_failures)
            .finish()
    }
}

impl FleetHealthMonitor {
    /// Create a monitor with a generated instance id.
    pub fn new(config: FleetConfig, alerts: Arc<dyn AlertSink>, clock: Arc<dyn Clock>) -> Self {
        Self::with_instance_id(generate_instance_id(), config, alerts, clock)
    }

    pub fn with_instance_id(
        instance_id: impl Into<String>,
        config: FleetConfig,
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            instance_id: instance_id.into(),
            config,
            alerts,
            clock,
            store: RwLock::new(None),
            state: Mutex::new(LocalState::default()),
            last_alert: Mutex::new(None),
            shutdown_tx,
            heartbeat: Mutex::new(None),
            cleanup: Mutex::new(None),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn instance_key(&self) -> String {
        format!("{}instance:{}", self.config.key_prefix, self.instance_id)
    }

    fn instance_key_prefix(&self) -> String {
        format!("{}instance:", self.config.key_prefix)
    }

    fn global_key(&self) -> String {
        format!("{}global", self.config.key_prefix)
    }

    /// Bind the shared store, write the first heartbeat and start the
    /// heartbeat task. Calling again only rebinds the store.
    #[instrument(skip(self, store), fields(instance = %self.instance_id))]
    pub async fn initialize(self: &Arc<Self>, store: Arc<dyn CoordinationStore>) {
        *self.store.write() = Some(store);
        self.heartbeat_once().await;

        let mut slot = self.heartbeat.lock();
        if slot.is_some() {
            debug!("Heartbeat already running, store rebound");
            return;
        }

        let monitor = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        let period = self.config.heartbeat_interval();
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => monitor.heartbeat_once().await,
                    _ = shutdown.changed() => break,
                }
            }
            debug!(instance = %monitor.instance_id, "Heartbeat stopped");
        }));

        info!(
            heartbeat_ms = self.config.heartbeat_interval_ms,
            ttl_secs = self.config.instance_ttl_seconds,
            "Fleet health monitor initialized"
        );
    }

    async fn heartbeat_once(&self) {
        self.state.lock().last_heartbeat = Some(self.clock.now());
        self.persist_snapshot().await;
    }

    /// Start the daily task that resets the fleet counters at local midnight.
    pub fn spawn_daily_cleanup(self: &Arc<Self>) {
        let mut slot = self.cleanup.lock();
        if slot.is_some() {
            return;
        }

        let monitor = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        *slot = Some(tokio::spawn(async move {
            loop {
                let delay = until_next_local_midnight(Local::now());
                debug!(secs = delay.as_secs(), "Next metrics cleanup scheduled");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => monitor.cleanup_old_metrics().await,
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles = [self.heartbeat.lock().take(), self.cleanup.lock().take()];
        for handle in handles.into_iter().flatten() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Fleet monitor task ended abnormally");
            }
        }
        info!(instance = %self.instance_id, "Fleet health monitor stopped");
    }

    pub fn record_job_start(&self) -> JobToken {
        JobToken(self.clock.now())
    }

    /// Record a successful run, resetting the failure streak.
    #[instrument(skip(self, token), fields(instance = %self.instance_id))]
    pub async fn record_job_success(&self, token: JobToken, liquidation_count: u64) {
        let now = self.clock.now();
        let duration_ms = (now - token.0).num_milliseconds().max(0) as u64;

        {
            let mut state = self.state.lock();
            state.samples.push_back(duration_ms);
            while state.samples.len() > self.config.rolling_sample_cap.max(1) {
                state.samples.pop_front();
            }
            state.avg_processing_time_ms =
                state.samples.iter().sum::<u64>() as f64 / state.samples.len() as f64;
            state.consecutive_failures = 0;
            state.last_successful_run = Some(now);
            state.checks += 1;
            state.liquidations += liquidation_count;
        }
        debug!(duration_ms, liquidation_count, "Job succeeded");

        self.persist_snapshot().await;

        if let Some(store) = self.bound_store() {
            let key = self.global_key();
            self.bounded(
                "increment checks",
                store.atomic_increment(&key, TOTAL_CHECKS_FIELD, 1),
            )
            .await;
            if liquidation_count > 0 {
                let amount = i64::try_from(liquidation_count).unwrap_or(i64::MAX);
                self.bounded(
                    "increment liquidations",
                    store.atomic_increment(&key, TOTAL_LIQUIDATIONS_FIELD, amount),
                )
                .await;
            }
        }
    }

    /// Record a failed run; alerts once the streak reaches the threshold.
    #[instrument(skip(self), fields(instance = %self.instance_id))]
    pub async fn record_job_failure(&self, error: &str) {
        let failures = {
            let mut state = self.state.lock();
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.consecutive_failures
        };
        warn!(failures, error, "Job failed");

        self.persist_snapshot().await;

        if failures >= self.config.consecutive_failure_threshold {
            self.try_alert(
                "FLEET_CONSECUTIVE_FAILURES",
                format!(
                    "Instance {} failed {} consecutive runs",
                    self.instance_id, failures
                ),
                json!({
                    "instanceId": self.instance_id,
                    "consecutiveFailures": failures,
                    "threshold": self.config.consecutive_failure_threshold,
                    "lastError": error,
                }),
            )
            .await;
        }
    }

    /// This instance's health with fleet-wide counters. Raises the no-run
    /// alert when the last successful run is stale.
    pub async fn instance_health(&self) -> FleetInstanceHealth {
        let now = self.clock.now();
        let mut health = self.local_snapshot();
        let metrics = self.global_metrics().await;
        health.total_checks_24h = metrics.total_checks_24h;
        health.total_liquidations_24h = metrics.total_liquidations_24h;
        health.evaluate(now, &self.config);

        if health.is_run_stale(now, &self.config) {
            let last_run = health.last_successful_run;
            self.try_alert(
                "FLEET_NO_SUCCESSFUL_RUN",
                format!(
                    "Instance {} has not completed a successful run in over {}s",
                    self.instance_id,
                    self.config.no_run_alert_threshold_ms / 1000
                ),
                json!({
                    "instanceId": self.instance_id,
                    "lastSuccessfulRun": last_run,
                    "thresholdMs": self.config.no_run_alert_threshold_ms,
                }),
            )
            .await;
        }
        health
    }

    /// Health of every live instance in the fleet. Falls back to this
    /// instance alone when the store is unavailable.
    pub async fn all_instances_health(&self) -> Vec<FleetInstanceHealth> {
        let now = self.clock.now();
        let local = || {
            let mut health = self.local_snapshot();
            health.evaluate(now, &self.config);
            vec![health]
        };

        let Some(store) = self.bound_store() else {
            return local();
        };
        let prefix = self.instance_key_prefix();
        let Some(keys) = self
            .bounded("list instances", store.list_keys_by_prefix(&self.config.key_prefix))
            .await
        else {
            return local();
        };

        let global_key = self.global_key();
        let mut instances = Vec::new();
        for key in keys
            .iter()
            .filter(|k| **k != global_key && k.starts_with(&prefix))
        {
            let Some(Some(raw)) = self.bounded("read instance", store.get_with_ttl(key)).await else {
                continue;
            };
            match serde_json::from_str::<FleetInstanceHealth>(&raw) {
                Ok(mut health) => {
                    health.evaluate(now, &self.config);
                    instances.push(health);
                }
                Err(e) => {
                    warn!(key = %key, error = %SentinelError::from(e), "Skipping unparseable instance snapshot");
                }
            }
        }
        instances
    }

    /// Fleet-wide counters, or this process's own counts in degraded mode.
    pub async fn global_metrics(&self) -> GlobalMetrics {
        let local = {
            let state = self.state.lock();
            GlobalMetrics {
                total_liquidations_24h: state.liquidations,
                total_checks_24h: state.checks,
            }
        };

        let Some(store) = self.bound_store() else {
            return local;
        };
        let key = self.global_key();
        match self.bounded("read counters", store.get_counters(&key)).await {
            Some(counters) => {
                let read = |field: &str| counters.get(field).copied().unwrap_or(0).max(0) as u64;
                GlobalMetrics {
                    total_liquidations_24h: read(TOTAL_LIQUIDATIONS_FIELD),
                    total_checks_24h: read(TOTAL_CHECKS_FIELD),
                }
            }
            None => local,
        }
    }

    /// Reset the 24h counters.
    #[instrument(skip(self), fields(instance = %self.instance_id))]
    pub async fn cleanup_old_metrics(&self) {
        {
            let mut state = self.state.lock();
            state.checks = 0;
            state.liquidations = 0;
        }
        if let Some(store) = self.bound_store() {
            let key = self.global_key();
            self.bounded("reset counters", store.delete(&key)).await;
        }
        info!("Fleet 24h metrics reset");
    }

    fn local_snapshot(&self) -> FleetInstanceHealth {
        let state = self.state.lock();
        FleetInstanceHealth {
            instance_id: self.instance_id.clone(),
            last_successful_run: state.last_successful_run,
            consecutive_failures: state.consecutive_failures,
            total_liquidations_24h: state.liquidations,
            total_checks_24h: state.checks,
            avg_processing_time_ms: state.avg_processing_time_ms,
            is_healthy: false,
            last_heartbeat: state.last_heartbeat,
            status: Default::default(),
        }
    }

    async fn persist_snapshot(&self) {
        let Some(store) = self.bound_store() else {
            debug!("No coordination store bound, snapshot kept local");
            return;
        };

        let mut snapshot = self.local_snapshot();
        snapshot.evaluate(self.clock.now(), &self.config);
        let payload = match serde_json::to_string(&snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %SentinelError::from(e), "Failed to encode instance snapshot");
                return;
            }
        };

        let key = self.instance_key();
        self.bounded(
            "write snapshot",
            store.set_with_ttl(&key, &payload, self.config.instance_ttl_seconds),
        )
        .await;
    }

    fn bound_store(&self) -> Option<Arc<dyn CoordinationStore>> {
        self.store.read().clone()
    }

    /// Run a store call under the store timeout. Failures are logged and
    /// yield `None`.
    async fn bounded<T>(&self, op: &str, call: impl Future<Output = Result<T>>) -> Option<T> {
        let timeout = self.config.store_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(op, error = %SentinelError::store(format!("{:#}", e)), "Coordination store call failed");
                None
            }
            Err(_) => {
                let err = SentinelError::Timeout(self.config.store_timeout_ms);
                warn!(op, error = %err, "Coordination store call timed out");
                None
            }
        }
    }

    /// Emit an alert unless any alert fired within the cooldown window.
    async fn try_alert(&self, event_type: &str, message: String, details: serde_json::Value) -> bool {
        let now = self.clock.now();
        {
            let mut last = self.last_alert.lock();
            if let Some(at) = *last {
                if now - at < self.config.alert_cooldown() {
                    debug!(event_type, "Alert suppressed by cooldown");
                    return false;
                }
            }
            *last = Some(now);
        }

        let event = AlertEvent::new(
            AlertSeverity::High,
            ALERT_CATEGORY,
            event_type,
            ALERT_SOURCE,
            message,
            now,
        )
        .with_details(details);
        if let Err(e) = self.alerts.log(event).await {
            let err = SentinelError::AlertDelivery(format!("{:#}", e));
            warn!(event_type, error = %err, "Alert not delivered");
        }
        true
    }
}

/// Time from `now` until the next local midnight, never zero.
pub fn until_next_local_midnight(now: DateTime<Local>) -> Duration {
    now.date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .and_then(|midnight| (midnight - now).to_std().ok())
        .filter(|d| !d.is_zero())
        .unwrap_or(ONE_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::MemoryAlertSink;
    use crate::clock::ManualClock;
    use crate::coordination::MemoryCoordinationStore;
    use crate::fleet::InstanceStatus;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;

    const FAILURES: &str = "FLEET_CONSECUTIVE_FAILURES";
    const NO_RUN: &str = "FLEET_NO_SUCCESSFUL_RUN";

    struct Harness {
        monitor: Arc<FleetHealthMonitor>,
        alerts: Arc<MemoryAlertSink>,
        clock: Arc<ManualClock>,
    }

    fn harness(id: &str, clock: Arc<ManualClock>) -> Harness {
        let alerts = Arc::new(MemoryAlertSink::new());
        let monitor = Arc::new(FleetHealthMonitor::with_instance_id(
            id,
            FleetConfig::default(),
            alerts.clone(),
            clock.clone(),
        ));
        Harness {
            monitor,
            alerts,
            clock,
        }
    }

    #[tokio::test]
    async fn test_failure_alert_respects_cooldown() {
        let h = harness("node-1", Arc::new(ManualClock::starting_now()));

        for _ in 0..3 {
            h.monitor.record_job_failure("rpc timeout").await;
        }
        assert_eq!(h.alerts.events_of_type(FAILURES).len(), 1);

        h.monitor.record_job_failure("rpc timeout").await;
        assert_eq!(h.alerts.events_of_type(FAILURES).len(), 1);

        h.clock.advance(ChronoDuration::minutes(5));
        h.monitor.record_job_failure("rpc timeout").await;
        let events = h.alerts.events_of_type(FAILURES);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].details["consecutiveFailures"], 5);
        assert_eq!(events[1].source, "fleet-monitor");
    }

    #[tokio::test]
    async fn test_success_resets_failures_and_tracks_timing() {
        let h = harness("node-1", Arc::new(ManualClock::starting_now()));
        h.monitor.record_job_failure("boom").await;
        h.monitor.record_job_failure("boom").await;

        let token = h.monitor.record_job_start();
        h.clock.advance(ChronoDuration::milliseconds(250));
        h.monitor.record_job_success(token, 2).await;

        let token = h.monitor.record_job_start();
        h.clock.advance(ChronoDuration::milliseconds(750));
        h.monitor.record_job_success(token, 0).await;

        let health = h.monitor.instance_health().await;
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.avg_processing_time_ms, 500.0);
        assert_eq!(health.total_checks_24h, 2);
        assert_eq!(health.total_liquidations_24h, 2);
    }

    #[tokio::test]
    async fn test_rolling_window_drops_oldest() {
        let clock = Arc::new(ManualClock::starting_now());
        let alerts = Arc::new(MemoryAlertSink::new());
        let config = FleetConfig {
            rolling_sample_cap: 2,
            ..Default::default()
        };
        let monitor = FleetHealthMonitor::with_instance_id("node-1", config, alerts, clock.clone());

        for ms in [1_000, 100, 300] {
            let token = monitor.record_job_start();
            clock.advance(ChronoDuration::milliseconds(ms));
            monitor.record_job_success(token, 0).await;
        }
        assert_eq!(monitor.instance_health().await.avg_processing_time_ms, 200.0);
    }

    #[tokio::test]
    async fn test_stale_heartbeat_reports_unhealthy() {
        let clock = Arc::new(ManualClock::starting_now());
        let h = harness("node-1", clock.clone());
        let store = Arc::new(MemoryCoordinationStore::with_clock(clock.clone()));
        h.monitor.initialize(store).await;

        let health = h.monitor.instance_health().await;
        assert!(health.is_healthy);
        assert_eq!(health.status, InstanceStatus::Healthy);

        h.clock.advance(ChronoDuration::seconds(91));
        let health = h.monitor.instance_health().await;
        assert_eq!(health.consecutive_failures, 0);
        assert!(!health.is_healthy);
        assert_eq!(health.status, InstanceStatus::Unhealthy);

        h.monitor.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_run_alert_shares_cooldown() {
        let h = harness("node-1", Arc::new(ManualClock::starting_now()));

        // No successful run yet: nothing to be stale
        h.monitor.instance_health().await;
        assert!(h.alerts.is_empty());

        let token = h.monitor.record_job_start();
        h.monitor.record_job_success(token, 0).await;
        h.clock.advance(ChronoDuration::minutes(6));

        h.monitor.instance_health().await;
        assert_eq!(h.alerts.events_of_type(NO_RUN).len(), 1);

        // A failure alert inside the same window is suppressed
        for _ in 0..3 {
            h.monitor.record_job_failure("boom").await;
        }
        assert!(h.alerts.events_of_type(FAILURES).is_empty());
        h.monitor.instance_health().await;
        assert_eq!(h.alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_degraded_mode_uses_local_state() {
        let h = harness("solo", Arc::new(ManualClock::starting_now()));

        let token = h.monitor.record_job_start();
        h.monitor.record_job_success(token, 3).await;

        assert_eq!(
            h.monitor.global_metrics().await,
            GlobalMetrics {
                total_liquidations_24h: 3,
                total_checks_24h: 1
            }
        );

        let all = h.monitor.all_instances_health().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].instance_id, "solo");
        assert_eq!(all[0].status, InstanceStatus::Unknown);

        h.monitor.cleanup_old_metrics().await;
        assert_eq!(h.monitor.global_metrics().await, GlobalMetrics::default());
    }

    #[tokio::test]
    async fn test_fleet_shares_counters_and_lists_instances() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryCoordinationStore::with_clock(clock.clone()));
        let a = harness("node-a", clock.clone());
        let b = harness("node-b", clock.clone());
        a.monitor.initialize(store.clone()).await;
        b.monitor.initialize(store.clone()).await;

        let token = a.monitor.record_job_start();
        a.monitor.record_job_success(token, 2).await;
        let token = b.monitor.record_job_start();
        b.monitor.record_job_success(token, 0).await;
        b.monitor.record_job_failure("slot skipped").await;

        let metrics = a.monitor.global_metrics().await;
        assert_eq!(metrics.total_checks_24h, 2);
        assert_eq!(metrics.total_liquidations_24h, 2);

        let all = a.monitor.all_instances_health().await;
        let mut ids: Vec<_> = all.iter().map(|h| h.instance_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["node-a", "node-b"]);
        let node_b = all.iter().find(|h| h.instance_id == "node-b").unwrap();
        assert_eq!(node_b.status, InstanceStatus::Degraded);

        a.monitor.cleanup_old_metrics().await;
        assert_eq!(b.monitor.global_metrics().await, GlobalMetrics::default());

        a.monitor.shutdown().await;
        b.monitor.shutdown().await;

        // Dead instances disappear once their keys expire
        clock.advance(ChronoDuration::seconds(3601));
        assert!(a.monitor.all_instances_health().await.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_snapshot_skipped() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryCoordinationStore::with_clock(clock.clone()));
        store
            .set_with_ttl("fleet:instance:garbage", "not json", 60)
            .await
            .unwrap();
        let h = harness("node-1", clock);
        h.monitor.initialize(store).await;

        let all = h.monitor.all_instances_health().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].instance_id, "node-1");
        h.monitor.shutdown().await;
    }

    struct BrokenStore;

    #[async_trait]
    impl CoordinationStore for BrokenStore {
        async fn get_with_ttl(&self, _key: &str) -> Result<Option<String>> {
            anyhow::bail!("connection reset")
        }
        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<()> {
            anyhow::bail!("connection reset")
        }
        async fn atomic_increment(&self, _key: &str, _field: &str, _amount: i64) -> Result<i64> {
            anyhow::bail!("connection reset")
        }
        async fn get_counters(&self, _key: &str) -> Result<HashMap<String, i64>> {
            anyhow::bail!("connection reset")
        }
        async fn list_keys_by_prefix(&self, _prefix: &str) -> Result<Vec<String>> {
            anyhow::bail!("connection reset")
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            anyhow::bail!("connection reset")
        }
    }

    struct HangingStore;

    #[async_trait]
    impl CoordinationStore for HangingStore {
        async fn get_with_ttl(&self, _key: &str) -> Result<Option<String>> {
            std::future::pending().await
        }
        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<()> {
            std::future::pending().await
        }
        async fn atomic_increment(&self, _key: &str, _field: &str, _amount: i64) -> Result<i64> {
            std::future::pending().await
        }
        async fn get_counters(&self, _key: &str) -> Result<HashMap<String, i64>> {
            std::future::pending().await
        }
        async fn list_keys_by_prefix(&self, _prefix: &str) -> Result<Vec<String>> {
            std::future::pending().await
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_failing_store_falls_back() {
        let h = harness("node-1", Arc::new(ManualClock::starting_now()));
        h.monitor.initialize(Arc::new(BrokenStore)).await;

        let token = h.monitor.record_job_start();
        h.monitor.record_job_success(token, 1).await;

        assert_eq!(h.monitor.global_metrics().await.total_checks_24h, 1);
        assert_eq!(h.monitor.all_instances_health().await.len(), 1);
        h.monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_store_bounded_by_timeout() {
        let h = harness("node-1", Arc::new(ManualClock::starting_now()));
        h.monitor.initialize(Arc::new(HangingStore)).await;

        let token = h.monitor.record_job_start();
        h.monitor.record_job_success(token, 4).await;

        assert_eq!(h.monitor.global_metrics().await.total_liquidations_24h, 4);
        h.monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_task_refreshes_until_shutdown() {
        let clock = Arc::new(ManualClock::starting_now());
        let h = harness("node-1", clock.clone());
        let store = Arc::new(MemoryCoordinationStore::with_clock(clock.clone()));
        h.monitor.initialize(store).await;

        let t0 = h.monitor.instance_health().await.last_heartbeat.unwrap();
        let period = h.monitor.config.heartbeat_interval();

        h.clock.advance(ChronoDuration::seconds(30));
        tokio::time::sleep(period + Duration::from_millis(1)).await;

        let beat = h.monitor.instance_health().await.last_heartbeat.unwrap();
        assert_eq!(beat, t0 + ChronoDuration::seconds(30));
        let fleet = h.monitor.all_instances_health().await;
        assert_eq!(fleet.len(), 1);
        assert_eq!(fleet[0].last_heartbeat, Some(beat));

        h.monitor.shutdown().await;
        h.clock.advance(ChronoDuration::seconds(60));
        tokio::time::sleep(period * 2).await;

        let after = h.monitor.instance_health().await.last_heartbeat.unwrap();
        assert_eq!(after, beat);
    }

    #[test]
    fn test_next_midnight_within_a_day() {
        let delay = until_next_local_midnight(Local::now());
        assert!(!delay.is_zero());
        // DST transitions can stretch a local day to 25h
        assert!(delay <= ONE_DAY + Duration::from_secs(3600));
    }
}
