//! Configuration management with profile support.
//!
//! Precedence, lowest to highest: profile defaults, TOML file
//! (`SENTINEL_CONFIG`), then individual environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::env::{env_override, expand_env};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Liquidation ledger and auto-blacklist
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Price validation
    #[serde(default)]
    pub price: PriceConfig,

    /// Fleet health monitoring
    #[serde(default)]
    pub fleet: FleetConfig,

    /// External endpoints
    #[serde(default)]
    pub connections: ConnectionsConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Liquidation ledger parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Loss above which a token is blacklisted (strictly greater than)
    #[serde(default = "default_blacklist_threshold")]
    pub auto_blacklist_threshold_bps: u64,

    /// In-memory history capacity
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    /// Admin authority passed to the blacklist transaction
    #[serde(default)]
    pub admin_authority: String,

    /// Upper bound on each durable store write (milliseconds)
    #[serde(default = "default_ledger_store_timeout")]
    pub store_timeout_ms: u64,

    /// Upper bound on sending and confirming the blacklist transaction (milliseconds)
    #[serde(default = "default_blacklist_timeout")]
    pub blacklist_timeout_ms: u64,
}

fn default_blacklist_threshold() -> u64 {
    1000
}
fn default_history_cap() -> usize {
    1000
}
fn default_ledger_store_timeout() -> u64 {
    5_000
}
fn default_blacklist_timeout() -> u64 {
    60_000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            auto_blacklist_threshold_bps: default_blacklist_threshold(),
            history_cap: default_history_cap(),
            admin_authority: String::new(),
            store_timeout_ms: default_ledger_store_timeout(),
            blacklist_timeout_ms: default_blacklist_timeout(),
        }
    }
}

impl LedgerConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
    pub fn blacklist_timeout(&self) -> Duration {
        Duration::from_millis(self.blacklist_timeout_ms)
    }
}

/// Price validation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    /// Maximum reference/pool deviation (inclusive)
    #[serde(default = "default_max_deviation")]
    pub max_price_deviation_bps: u64,

    /// Timeout for each price fetch (milliseconds)
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,

    /// Pools used as the on-chain price for each monitored token
    #[serde(default)]
    pub pools: Vec<PoolEntry>,
}

/// One `[[price.pools]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub token_mint: String,
    pub pool_address: String,
    /// raydium, orca, pumpfun or pumpswap
    pub pool_type: String,
    /// Token decimals for the reference feed (defaults to 6)
    #[serde(default)]
    pub decimals: Option<u8>,
}

fn default_max_deviation() -> u64 {
    2000
}
fn default_fetch_timeout() -> u64 {
    8000
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            max_price_deviation_bps: default_max_deviation(),
            fetch_timeout_ms: default_fetch_timeout(),
            pools: Vec::new(),
        }
    }
}

impl PriceConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Fleet health monitoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// TTL of each instance key (seconds)
    #[serde(default = "default_instance_ttl")]
    pub instance_ttl_seconds: u64,

    /// Heartbeat period (milliseconds)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Consecutive failures that mark an instance unhealthy and raise an alert
    #[serde(default = "default_failure_threshold")]
    pub consecutive_failure_threshold: u32,

    /// Age of the last successful run that counts as stale (milliseconds)
    #[serde(default = "default_no_run_threshold")]
    pub no_run_alert_threshold_ms: u64,

    /// Minimum gap between two alerts from one instance (milliseconds)
    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown_ms: u64,

    /// Processing time samples kept for the rolling average
    #[serde(default = "default_rolling_sample_cap")]
    pub rolling_sample_cap: usize,

    /// Upper bound on any single coordination store call (milliseconds)
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    /// Namespace of fleet keys in the coordination store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_instance_ttl() -> u64 {
    3600
}
fn default_heartbeat_interval() -> u64 {
    30_000
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_no_run_threshold() -> u64 {
    300_000
}
fn default_alert_cooldown() -> u64 {
    300_000
}
fn default_rolling_sample_cap() -> usize {
    100
}
fn default_store_timeout() -> u64 {
    2_000
}
fn default_key_prefix() -> String {
    "fleet:".to_string()
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            instance_ttl_seconds: default_instance_ttl(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            consecutive_failure_threshold: default_failure_threshold(),
            no_run_alert_threshold_ms: default_no_run_threshold(),
            alert_cooldown_ms: default_alert_cooldown(),
            rolling_sample_cap: default_rolling_sample_cap(),
            store_timeout_ms: default_store_timeout(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl FleetConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
    pub fn no_run_threshold(&self) -> chrono::Duration {
        millis(self.no_run_alert_threshold_ms)
    }
    pub fn alert_cooldown(&self) -> chrono::Duration {
        millis(self.alert_cooldown_ms)
    }
    /// An instance that has not heartbeated for this long is considered hung.
    pub fn heartbeat_stale_after(&self) -> chrono::Duration {
        millis(self.heartbeat_interval_ms.saturating_mul(3))
    }
}

/// Millisecond count as a chrono duration, saturating at the largest
/// representable value.
fn millis(ms: u64) -> chrono::Duration {
    chrono::Duration::try_milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
        .unwrap_or(chrono::Duration::MAX)
}

/// External endpoints. String values may contain `${VAR}` references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    #[serde(default)]
    pub solana_rpc_url: Option<String>,

    /// Path to the admin keypair JSON file used for blacklist transactions
    #[serde(default)]
    pub admin_keypair_path: Option<String>,

    /// Lending program id
    #[serde(default)]
    pub program_id: Option<String>,

    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_jupiter_url")]
    pub jupiter_api_url: String,

    /// How often the binary logs fleet status (seconds)
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

fn default_jupiter_url() -> String {
    "https://api.jup.ag".to_string()
}
fn default_status_interval() -> u64 {
    60
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            solana_rpc_url: None,
            admin_keypair_path: None,
            program_id: None,
            redis_url: None,
            database_url: None,
            jupiter_api_url: default_jupiter_url(),
            status_interval_secs: default_status_interval(),
        }
    }
}

impl ConnectionsConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }

    /// Expand environment variables in connection values.
    pub fn expand_env_vars(&mut self) {
        for value in [
            &mut self.solana_rpc_url,
            &mut self.admin_keypair_path,
            &mut self.program_id,
            &mut self.redis_url,
            &mut self.database_url,
        ]
        .into_iter()
        .flatten()
        {
            *value = expand_env(value);
        }
        self.jupiter_api_url = expand_env(&self.jupiter_api_url);
    }
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            ledger: LedgerConfig::default(),
            price: PriceConfig::default(),
            fleet: FleetConfig::default(),
            connections: ConnectionsConfig::default(),
        }
    }
}

impl SentinelConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Short intervals for local runs and integration environments.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            fleet: FleetConfig {
                instance_ttl_seconds: 120,
                heartbeat_interval_ms: 5_000,
                no_run_alert_threshold_ms: 60_000,
                alert_cooldown_ms: 30_000,
                ..Default::default()
            },
            connections: ConnectionsConfig {
                solana_rpc_url: Some("http://127.0.0.1:8899".to_string()),
                status_interval_secs: 10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Conservative settings for mainnet.
    pub fn production() -> Self {
        Self {
            profile: "production".to_string(),
            price: PriceConfig {
                max_price_deviation_bps: default_max_deviation(),
                fetch_timeout_ms: 5_000,
                ..Default::default()
            },
            connections: ConnectionsConfig {
                solana_rpc_url: Some("https://api.mainnet-beta.solana.com".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Profile selected by `SENTINEL_PROFILE`.
    /// Supported values: testing, production
    pub fn from_profile_env() -> Self {
        let profile = std::env::var("SENTINEL_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "production" | "prod" => Self::production(),
            _ => Self::default(),
        }
    }

    /// Resolve the effective configuration from profile, file and environment.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("SENTINEL_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::from_profile_env(),
        };
        config.apply_env_overrides();
        config.connections.expand_env_vars();
        Ok(config)
    }

    /// Apply the recognized environment variables on top of current values.
    pub fn apply_env_overrides(&mut self) {
        env_override("AUTO_BLACKLIST_THRESHOLD_BPS", &mut self.ledger.auto_blacklist_threshold_bps);
        env_override("HISTORY_CAP", &mut self.ledger.history_cap);
        env_override("LEDGER_STORE_TIMEOUT_MS", &mut self.ledger.store_timeout_ms);
        env_override("BLACKLIST_TIMEOUT_MS", &mut self.ledger.blacklist_timeout_ms);
        env_override("MAX_PRICE_DEVIATION_BPS", &mut self.price.max_price_deviation_bps);
        env_override("PRICE_FETCH_TIMEOUT_MS", &mut self.price.fetch_timeout_ms);
        env_override("INSTANCE_TTL_SECONDS", &mut self.fleet.instance_ttl_seconds);
        env_override("HEARTBEAT_INTERVAL_MS", &mut self.fleet.heartbeat_interval_ms);
        env_override("CONSECUTIVE_FAILURE_THRESHOLD", &mut self.fleet.consecutive_failure_threshold);
        env_override("NO_RUN_ALERT_THRESHOLD_MS", &mut self.fleet.no_run_alert_threshold_ms);
        env_override("ALERT_COOLDOWN_MS", &mut self.fleet.alert_cooldown_ms);
        env_override("ROLLING_SAMPLE_CAP", &mut self.fleet.rolling_sample_cap);

        if let Ok(authority) = std::env::var("ADMIN_AUTHORITY") {
            self.ledger.admin_authority = authority;
        }
        for (name, slot) in [
            ("SOLANA_RPC_URL", &mut self.connections.solana_rpc_url),
            ("ADMIN_KEYPAIR_PATH", &mut self.connections.admin_keypair_path),
            ("PROGRAM_ID", &mut self.connections.program_id),
            ("REDIS_URL", &mut self.connections.redis_url),
            ("DATABASE_URL", &mut self.connections.database_url),
        ] {
            if let Ok(value) = std::env::var(name) {
                *slot = Some(value);
            }
        }
        if let Ok(url) = std::env::var("JUPITER_API_URL") {
            self.connections.jupiter_api_url = url;
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Sentinel configuration loaded");
        tracing::info!(
            blacklist_threshold_bps = self.ledger.auto_blacklist_threshold_bps,
            history_cap = self.ledger.history_cap,
            "Ledger parameters"
        );
        tracing::info!(
            max_deviation_bps = self.price.max_price_deviation_bps,
            fetch_timeout_ms = self.price.fetch_timeout_ms,
            pools = self.price.pools.len(),
            "Price validation parameters"
        );
        tracing::info!(
            ttl_secs = self.fleet.instance_ttl_seconds,
            heartbeat_ms = self.fleet.heartbeat_interval_ms,
            failure_threshold = self.fleet.consecutive_failure_threshold,
            no_run_ms = self.fleet.no_run_alert_threshold_ms,
            cooldown_ms = self.fleet.alert_cooldown_ms,
            sample_cap = self.fleet.rolling_sample_cap,
            "Fleet parameters"
        );
        tracing::info!(
            rpc = self.connections.solana_rpc_url.is_some(),
            redis = self.connections.redis_url.is_some(),
            database = self.connections.database_url.is_some(),
            "Connections configured"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SentinelConfig::default();
        assert_eq!(config.ledger.auto_blacklist_threshold_bps, 1000);
        assert_eq!(config.ledger.history_cap, 1000);
        assert_eq!(config.price.max_price_deviation_bps, 2000);
        assert_eq!(config.fleet.instance_ttl_seconds, 3600);
        assert_eq!(config.fleet.heartbeat_interval_ms, 30_000);
        assert_eq!(config.fleet.consecutive_failure_threshold, 3);
        assert_eq!(config.fleet.no_run_alert_threshold_ms, 300_000);
        assert_eq!(config.fleet.alert_cooldown_ms, 300_000);
        assert_eq!(config.fleet.rolling_sample_cap, 100);
        assert_eq!(config.fleet.heartbeat_stale_after(), chrono::Duration::seconds(90));
    }

    #[test]
    fn test_huge_durations_saturate() {
        let config = FleetConfig {
            no_run_alert_threshold_ms: u64::MAX,
            alert_cooldown_ms: u64::MAX,
            heartbeat_interval_ms: u64::MAX,
            ..Default::default()
        };
        assert!(config.no_run_threshold() > chrono::Duration::zero());
        assert!(config.alert_cooldown() > chrono::Duration::days(365));
        assert!(config.heartbeat_stale_after() > chrono::Duration::zero());
    }

    #[test]
    fn test_testing_profile() {
        let config = SentinelConfig::testing();
        assert_eq!(config.profile, "testing");
        assert!(config.fleet.heartbeat_interval_ms < 30_000);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: SentinelConfig = toml::from_str(
            r#"
            [ledger]
            auto_blacklist_threshold_bps = 500

            [fleet]
            alert_cooldown_ms = 1000
            "#,
        )
        .unwrap();
        assert_eq!(parsed.profile, "default");
        assert_eq!(parsed.ledger.auto_blacklist_threshold_bps, 500);
        assert_eq!(parsed.ledger.history_cap, 1000);
        assert_eq!(parsed.fleet.alert_cooldown_ms, 1000);
        assert_eq!(parsed.fleet.heartbeat_interval_ms, 30_000);
    }

    #[test]
    fn test_pool_registry_from_toml() {
        let parsed: SentinelConfig = toml::from_str(
            r#"
            [price]
            max_price_deviation_bps = 1500

            [[price.pools]]
            token_mint = "MintA"
            pool_address = "PoolA"
            pool_type = "pumpfun"

            [[price.pools]]
            token_mint = "MintB"
            pool_address = "PoolB"
            pool_type = "raydium"
            decimals = 9
            "#,
        )
        .unwrap();
        assert_eq!(parsed.price.max_price_deviation_bps, 1500);
        assert_eq!(parsed.price.fetch_timeout_ms, 8000);
        assert_eq!(parsed.price.pools.len(), 2);
        assert_eq!(parsed.price.pools[0].pool_type, "pumpfun");
        assert_eq!(parsed.price.pools[0].decimals, None);
        assert_eq!(parsed.price.pools[1].token_mint, "MintB");
        assert_eq!(parsed.price.pools[1].decimals, Some(9));

        assert!(SentinelConfig::default().price.pools.is_empty());
    }

    #[test]
    fn test_ledger_timeouts() {
        let config = LedgerConfig::default();
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
        assert_eq!(config.blacklist_timeout(), Duration::from_secs(60));

        let parsed: SentinelConfig = toml::from_str(
            r#"
            [ledger]
            blacklist_timeout_ms = 1500
            "#,
        )
        .unwrap();
        assert_eq!(parsed.ledger.blacklist_timeout_ms, 1500);
        assert_eq!(parsed.ledger.store_timeout_ms, 5_000);
    }

    #[test]
    fn test_serialization() {
        let config = SentinelConfig::testing();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"testing\""));

        let parsed: SentinelConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.profile, "testing");
        assert_eq!(parsed.fleet.heartbeat_interval_ms, 5_000);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("ROLLING_SAMPLE_CAP", "25");
        std::env::set_var("ALERT_COOLDOWN_MS", "not-a-number");
        let mut config = SentinelConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.fleet.rolling_sample_cap, 25);
        assert_eq!(config.fleet.alert_cooldown_ms, 300_000);
        std::env::remove_var("ROLLING_SAMPLE_CAP");
        std::env::remove_var("ALERT_COOLDOWN_MS");
    }
}
