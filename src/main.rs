//! Liquidation Sentinel
//!
//! Off-chain safety net for the memecoin lending protocol's liquidator fleet.
//! Features:
//! - Fleet heartbeats and health reporting over a shared coordination store
//! - Liquidation loss ledger with automatic on-chain token blacklisting
//! - Reference vs pool price validation before liquidations

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sentinel_api::JupiterPriceClient;
use sentinel_chain::{
    ChainAdmin, PoolInfo, PoolPriceReader, PoolType, Pubkey, RpcClient, SolanaChainAdmin,
};
use sentinel_core::config::PoolEntry;
use sentinel_core::{
    AlertSink, Clock, CoordinationStore, DurableStore, FleetHealthMonitor, LiquidationLedger,
    MemoryCoordinationStore, MemoryDurableStore, PriceGate, SentinelConfig, SystemClock,
    TracingAlertSink,
};

const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    // SENTINEL_CONFIG (file) or SENTINEL_PROFILE selects the base, env overrides on top
    let mut config = SentinelConfig::load().context("Failed to load sentinel config")?;
    config.log_config();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let alerts: Arc<dyn AlertSink> = Arc::new(TracingAlertSink);

    let rpc_url = config
        .connections
        .solana_rpc_url
        .clone()
        .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
    let rpc = Arc::new(RpcClient::new(rpc_url.clone()));
    info!(rpc = %rpc_url, "Solana RPC configured");

    let store = coordination_store(&config, clock.clone()).await?;
    let durable = durable_store(&config).await?;
    let chain = chain_admin(&mut config, rpc.clone())?;

    let ledger = Arc::new(LiquidationLedger::new(
        config.ledger.clone(),
        durable,
        chain,
        alerts.clone(),
        clock.clone(),
    ));

    let reference = Arc::new(JupiterPriceClient::with_base_url(
        config.connections.jupiter_api_url.clone(),
    ));
    let pools = Arc::new(PoolPriceReader::new(rpc));
    let watched = register_pools(&config.price.pools, &pools, &reference);
    info!(
        pools = pools.pool_count(),
        skipped = config.price.pools.len() - watched.len(),
        "Pool registry loaded"
    );
    let price_gate = PriceGate::new(
        reference.clone(),
        pools,
        config.price.max_price_deviation_bps,
        config.price.fetch_timeout(),
    );
    info!(gate = ?price_gate, "Price gate ready");

    let monitor = Arc::new(FleetHealthMonitor::new(
        config.fleet.clone(),
        alerts,
        clock,
    ));
    info!(instance = monitor.instance_id(), "Starting liquidation sentinel");

    monitor.initialize(store).await;
    monitor.spawn_daily_cleanup();

    let mut status = tokio::time::interval(config.connections.status_interval());
    loop {
        tokio::select! {
            _ = status.tick() => {
                report_status(&monitor, &ledger).await;
                check_prices(&price_gate, &watched).await;
                reference.cleanup_cache();
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for shutdown signal");
                }
                break;
            }
        }
    }

    info!("Shutdown requested");
    monitor.shutdown().await;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sentinel_core=debug,sentinel_chain=debug"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[cfg(feature = "redis")]
async fn coordination_store(
    config: &SentinelConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn CoordinationStore>> {
    if let Some(url) = &config.connections.redis_url {
        let store = sentinel_core::RedisCoordinationStore::connect(url).await?;
        return Ok(Arc::new(store));
    }
    warn!("REDIS_URL not set, fleet state is process-local");
    Ok(Arc::new(MemoryCoordinationStore::with_clock(clock)))
}

#[cfg(not(feature = "redis"))]
async fn coordination_store(
    config: &SentinelConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn CoordinationStore>> {
    if config.connections.redis_url.is_some() {
        warn!("REDIS_URL set but built without the redis feature, fleet state is process-local");
    }
    Ok(Arc::new(MemoryCoordinationStore::with_clock(clock)))
}

#[cfg(feature = "postgres")]
async fn durable_store(config: &SentinelConfig) -> Result<Arc<dyn DurableStore>> {
    if let Some(url) = &config.connections.database_url {
        let store = sentinel_core::PgDurableStore::connect(url).await?;
        return Ok(Arc::new(store));
    }
    warn!("DATABASE_URL not set, liquidation records are kept in memory");
    Ok(Arc::new(MemoryDurableStore::new()))
}

#[cfg(not(feature = "postgres"))]
async fn durable_store(config: &SentinelConfig) -> Result<Arc<dyn DurableStore>> {
    if config.connections.database_url.is_some() {
        warn!("DATABASE_URL set but built without the postgres feature, records are kept in memory");
    }
    Ok(Arc::new(MemoryDurableStore::new()))
}

/// Solana admin client when a program id and keypair are configured.
/// Defaults the ledger's admin authority to the keypair's public key.
fn chain_admin(config: &mut SentinelConfig, rpc: Arc<RpcClient>) -> Result<Arc<dyn ChainAdmin>> {
    let (Some(program_id), Some(keypair_path)) = (
        config.connections.program_id.as_deref(),
        config.connections.admin_keypair_path.as_deref(),
    ) else {
        warn!("PROGRAM_ID or ADMIN_KEYPAIR_PATH missing, automatic blacklisting disabled");
        return Ok(Arc::new(UnconfiguredChainAdmin));
    };

    let program_id = Pubkey::from_str(program_id)
        .with_context(|| format!("Invalid PROGRAM_ID: {}", program_id))?;
    let admin = SolanaChainAdmin::from_keypair_file(rpc, program_id, keypair_path)?;

    if config.ledger.admin_authority.is_empty() {
        config.ledger.admin_authority = admin.admin_pubkey().to_string();
    }
    info!(
        program = %program_id,
        admin = %admin.admin_pubkey(),
        "Chain admin initialized"
    );
    Ok(Arc::new(admin))
}

/// Fails every blacklist request so the ledger raises a manual-action alert.
struct UnconfiguredChainAdmin;

#[async_trait]
impl ChainAdmin for UnconfiguredChainAdmin {
    async fn blacklist_token(&self, token_mint: &str, _admin_authority: &str) -> Result<String> {
        anyhow::bail!("Chain admin not configured, cannot blacklist {}", token_mint)
    }
}

/// Register configured pools with the price readers. Invalid entries are
/// skipped. Returns the mints that can be price-checked.
fn register_pools(
    entries: &[PoolEntry],
    pools: &PoolPriceReader,
    reference: &JupiterPriceClient,
) -> Vec<String> {
    let mut watched = Vec::with_capacity(entries.len());
    for entry in entries {
        let parsed = Pubkey::from_str(&entry.pool_address)
            .map_err(anyhow::Error::from)
            .and_then(|address| Ok((address, PoolType::from_str(&entry.pool_type)?)));
        let (address, pool_type) = match parsed {
            Ok(pool) => pool,
            Err(e) => {
                warn!(mint = %entry.token_mint, error = %e, "Skipping invalid pool entry");
                continue;
            }
        };

        pools.register_pool(&entry.token_mint, PoolInfo { address, pool_type });
        if let Some(decimals) = entry.decimals {
            reference.register_decimals(&entry.token_mint, decimals);
        }
        watched.push(entry.token_mint.clone());
    }
    watched
}

/// Compare reference and pool prices for every watched mint.
async fn check_prices(gate: &PriceGate, mints: &[String]) {
    for mint in mints {
        let result = gate.check(mint).await;
        if result.valid {
            debug!(mint = %mint, deviation_bps = result.deviation_bps, "Price check passed");
        } else {
            warn!(
                mint = %mint,
                deviation_bps = result.deviation_bps,
                reason = result.reason.as_deref().unwrap_or("deviation above limit"),
                "Price check failed, liquidations for this token should be held"
            );
        }
    }
}

async fn report_status(monitor: &FleetHealthMonitor, ledger: &LiquidationLedger) {
    let local = monitor.instance_health().await;
    let fleet = monitor.all_instances_health().await;
    let healthy = fleet.iter().filter(|h| h.is_healthy).count();

    info!(
        status = %local.status,
        failures = local.consecutive_failures,
        avg_ms = local.avg_processing_time_ms,
        checks_24h = local.total_checks_24h,
        liquidations_24h = local.total_liquidations_24h,
        fleet_size = fleet.len(),
        fleet_healthy = healthy,
        ledger_records = ledger.history_len(),
        ledger_losses = ledger.liquidations_with_losses().len(),
        "Fleet status"
    );

    match serde_json::to_string(&fleet) {
        Ok(snapshot) => debug!(snapshot = %snapshot, "Fleet snapshot"),
        Err(e) => warn!(error = %e, "Failed to encode fleet snapshot"),
    }
}

/// Print startup banner.
fn print_banner() {
    println!(
        r#"
    Liquidation Sentinel v{}
    "#,
        env!("CARGO_PKG_VERSION")
    );
}
