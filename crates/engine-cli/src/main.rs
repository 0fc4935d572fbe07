//! engine-cli: thin wrapper around `ScanOrchestrator::run_scan` and the store's
//! admin sweeps, grounded on `data-loader/src/main.rs`'s manual-arg-parsing,
//! bounded-concurrency, progress-counter style.
//!
//! Usage:
//!   engine-cli scan --strategy penny_explosion --symbols AAPL MSFT GME
//!   engine-cli backfill
//!   engine-cli cleanup-duplicates --strategy squeeze
//!   engine-cli expire-signals
//!   engine-cli cleanup-noise
//!
//! Exit codes: 0 success, 1 general failure, 2 configuration error.

mod config;

use std::sync::Arc;

use calendar_oracle::CalendarOracle;
use chrono::Utc;
use config::EnvConfig;
use market_data::{CachingFetcher, FetcherConfig, HttpProviderClient};
use rate_limiter::RateLimiter;
use scan_orchestrator::{ScanCancellation, ScanOrchestrator, ScanOrchestratorConfig};
use signal_core::{MarketDataProvider, Strategy, Ticker, TickerType};
use signal_store::{NoiseRules, SignalStore};
use sqlx::AnyPool;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "engine_cli=info,scan_orchestrator=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).cloned() else {
        print_usage();
        std::process::exit(1);
    };

    let env = match EnvConfig::from_env() {
        Ok(env) => env,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            std::process::exit(2);
        }
    };

    match run(command, &args, env).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  engine-cli scan --strategy <name> --symbols SYM [SYM...]");
    eprintln!("  engine-cli backfill");
    eprintln!("  engine-cli cleanup-duplicates --strategy <name>");
    eprintln!("  engine-cli expire-signals");
    eprintln!("  engine-cli cleanup-noise");
}

async fn connect_store(env: &EnvConfig) -> anyhow::Result<SignalStore> {
    sqlx::any::install_default_drivers();
    let pool = AnyPool::connect(&env.db_url).await?;
    let store = SignalStore::new(pool).with_batch_size(env.batch_size);
    store.migrate().await?;
    Ok(store)
}

fn build_market_data(env: &EnvConfig) -> Arc<dyn MarketDataProvider> {
    let limiter = RateLimiter::new(env.rate_limit);
    let client = HttpProviderClient::new(env.provider_base_url.clone(), env.provider_api_key.clone(), limiter);
    Arc::new(CachingFetcher::new(client, FetcherConfig::default()))
}

fn parse_strategy(args: &[String]) -> anyhow::Result<Strategy> {
    let raw = args
        .iter()
        .position(|a| a == "--strategy")
        .and_then(|i| args.get(i + 1))
        .ok_or_else(|| anyhow::anyhow!("--strategy is required"))?;
    Strategy::from_str_opt(raw).ok_or_else(|| anyhow::anyhow!("unknown strategy {raw}"))
}

fn parse_symbols(args: &[String]) -> Vec<Ticker> {
    let Some(idx) = args.iter().position(|a| a == "--symbols") else {
        return Vec::new();
    };
    args[idx + 1..]
        .iter()
        .take_while(|a| !a.starts_with("--"))
        .map(|symbol| Ticker {
            symbol: symbol.clone(),
            name: None,
            exchange: None,
            country: None,
            currency: None,
            sector: None,
            industry: None,
            market_cap: None,
            ticker_type: TickerType::Stock,
            is_active: true,
            last_fetched: None,
        })
        .collect()
}

async fn run(command: String, args: &[String], env: EnvConfig) -> anyhow::Result<()> {
    match command.as_str() {
        "scan" => cmd_scan(args, env).await,
        "backfill" => cmd_backfill(env).await,
        "cleanup-duplicates" => cmd_cleanup_duplicates(args, env).await,
        "expire-signals" => cmd_expire_signals(env).await,
        "cleanup-noise" => cmd_cleanup_noise(env).await,
        other => {
            print_usage();
            Err(anyhow::anyhow!("unknown command {other}"))
        }
    }
}

async fn cmd_scan(args: &[String], env: EnvConfig) -> anyhow::Result<()> {
    let strategy = parse_strategy(args)?;
    let universe = parse_symbols(args);
    if universe.is_empty() {
        anyhow::bail!("--symbols must name at least one ticker");
    }

    let store = Arc::new(connect_store(&env).await?);
    let market_data = build_market_data(&env);
    let calendar = Arc::new(CalendarOracle::new());

    let mut config = ScanOrchestratorConfig::default();
    config.analysis_parallelism = env.scan_parallelism;

    let orchestrator = ScanOrchestrator::new(market_data, store, calendar, config);
    let today = Utc::now().date_naive();

    let report = orchestrator.run_scan(strategy, universe, today, ScanCancellation::new()).await?;

    tracing::info!(
        strategy = strategy.as_str(),
        universe_size = report.counts.universe_size,
        fetched = report.counts.fetched,
        candidates_detected = report.counts.candidates_detected,
        persisted = report.counts.persisted,
        alerts_emitted = report.counts.alerts_emitted,
        cancelled = report.cancelled,
        "scan complete"
    );

    if report.persist_failed {
        anyhow::bail!("scan persisted zero rows out of {} attempted", report.counts.persisted);
    }
    Ok(())
}

async fn cmd_backfill(env: EnvConfig) -> anyhow::Result<()> {
    let store = connect_store(&env).await?;
    let market_data = build_market_data(&env);

    let records = store.active_performance_records().await?;
    let mut backfilled = 0u64;
    for record in records {
        let bars = market_data.get_ohlcv(&record.symbol, 30).await.unwrap_or_default();
        if bars.is_empty() {
            continue;
        }
        let updated = performance_tracker::backfill_targets(&record, &bars);
        store.upsert_performance_record(&updated).await?;
        backfilled += 1;
    }

    tracing::info!(backfilled, "backfill complete");
    Ok(())
}

async fn cmd_cleanup_duplicates(args: &[String], env: EnvConfig) -> anyhow::Result<()> {
    let strategy = parse_strategy(args)?;
    let store = connect_store(&env).await?;
    let today = Utc::now().date_naive();
    let removed = store.reconcile_duplicates(today, strategy).await?;
    tracing::info!(removed, strategy = strategy.as_str(), "duplicate cleanup complete");
    Ok(())
}

async fn cmd_expire_signals(env: EnvConfig) -> anyhow::Result<()> {
    let store = connect_store(&env).await?;
    let today = Utc::now().date_naive();
    let expired = store.expire_past(today).await?;
    tracing::info!(expired, "expiry sweep complete");
    Ok(())
}

async fn cmd_cleanup_noise(env: EnvConfig) -> anyhow::Result<()> {
    let store = connect_store(&env).await?;
    let removed = store.cleanup_noise(NoiseRules::default()).await?;
    tracing::info!(removed, "noise cleanup complete");
    Ok(())
}
