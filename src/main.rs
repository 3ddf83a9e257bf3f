// =============================================================================
// Flotilla — multi-bot spot trading daemon: main entry point
// =============================================================================
//
// Boot order: environment -> shared singletons (exchange, caches, analyzer,
// notifier, counters) -> registry -> supervisor -> orphan reconciliation ->
// resume persisted workers -> dashboard HTTP server -> wait for Ctrl+C or a
// dashboard-requested restart -> stop all workers, flush state, exit 0.
//
// Exit codes: 0 on clean shutdown, non-zero when the data directory or the
// dashboard port cannot be acquired.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod ai;
mod api;
mod binance;
mod bot;
mod config;
mod counters;
mod indicators;
mod market_data;
mod news;
mod notifier;
mod registry;
mod singleflight;
mod storage;
mod strategy;
mod supervisor;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::ai::NewsAnalyzer;
use crate::binance::{BinanceClient, SymbolCache};
use crate::config::AppConfig;
use crate::counters::ApiCounters;
use crate::market_data::CandleCache;
use crate::news::{NewsProviders, SharedNewsCache};
use crate::notifier::SmsNotifier;
use crate::registry::BotRegistry;
use crate::strategy::StrategyServices;
use crate::supervisor::Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           Flotilla Spot Fleet — Starting Up              ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = Arc::new(AppConfig::from_env()?);
    // Fatal: without a writable data dir nothing can be persisted.
    config.ensure_data_dir()?;

    // ── 2. Shared singletons ─────────────────────────────────────────────
    let exchange = Arc::new(BinanceClient::new(
        config.exchange_api_key.clone(),
        config.exchange_api_secret.clone(),
        config.use_testnet,
    ));
    let symbols = Arc::new(SymbolCache::new(exchange.clone()));
    let candles = Arc::new(CandleCache::new(exchange.clone()));
    let counters = Arc::new(ApiCounters::load(&config.data_dir));
    let notifier = Arc::new(SmsNotifier::new(&config));

    let news = Arc::new(SharedNewsCache::new(
        NewsProviders::new(config.cryptonews_api_key.clone(), config.newsapi_key.clone()),
        counters.clone(),
        config.news_ttl,
        config.news_daily_budget,
        &config.data_dir,
    ));
    let analyzer = Arc::new(NewsAnalyzer::new(
        config.openai_api_key.clone(),
        counters.clone(),
    ));
    let services = StrategyServices {
        news,
        analyzer,
        symbols: symbols.clone(),
    };

    // ── 3. Registry & supervisor ─────────────────────────────────────────
    let registry = Arc::new(BotRegistry::load(&config.data_dir)?);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let supervisor = Arc::new(Supervisor::new(
        config.clone(),
        exchange,
        symbols,
        candles,
        counters,
        notifier,
        registry,
        services,
        shutdown_tx,
    ));

    // ── 4. Boot-time orphan reconciliation (guarded by config) ──────────
    if config.adopt_orphans_on_boot {
        match supervisor.reconcile_orphans().await {
            Ok(adopted) if !adopted.is_empty() => {
                info!(count = adopted.len(), "orphan assets adopted at boot");
            }
            Ok(_) => info!("no orphan assets found at boot"),
            Err(e) => warn!(error = %e, "boot reconciliation failed, continuing"),
        }
    } else {
        info!("boot-time orphan adoption disabled by config");
    }

    // ── 5. Resume workers persisted as running ───────────────────────────
    supervisor.start_marked_running();

    // ── 6. Dashboard HTTP server ─────────────────────────────────────────
    let bind_addr = format!("0.0.0.0:{}", config.dashboard_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("cannot bind dashboard to {bind_addr}"))?;
    info!(addr = %bind_addr, "dashboard API listening");

    let app = api::rest::router(supervisor.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "dashboard server exited");
        }
    });

    info!("all subsystems running; press Ctrl+C to stop");

    // ── 7. Wait for shutdown (Ctrl+C or dashboard restart) ───────────────
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received");
        }
        _ = shutdown_rx.changed() => {
            warn!("shutdown requested via dashboard");
        }
    }

    // ── 8. Graceful teardown ─────────────────────────────────────────────
    supervisor.shutdown_all().await;
    info!("flotilla shut down complete");
    Ok(())
}
