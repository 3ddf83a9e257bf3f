// =============================================================================
// Supervisor — owns the fleet: lifecycle, orphan adoption, and the overview
// =============================================================================
//
// The supervisor is a singleton. It is the only component that starts and
// stops workers, the gatekeeper for every dashboard mutation, and the boot
// pass that adopts orphaned wallet assets into Auto-Manager bots.
//
// Orphan reconciliation NEVER trades and never starts a worker: it only adds
// stopped bots to the roster for the operator to start.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::binance::rate_limit::RateLimitSnapshot;
use crate::binance::{BinanceClient, SymbolCache};
use crate::bot::{spawn_worker, Position, PositionStore, WorkerContext, WorkerHandle};
use crate::config::AppConfig;
use crate::counters::{ApiCounters, DailyCounters};
use crate::market_data::CandleCache;
use crate::notifier::SmsNotifier;
use crate::registry::{Bot, BotPatch, BotRegistry, NewBotSpec};
use crate::strategy::{base_asset, usdt_pair, StrategyKind, StrategyServices};
use crate::types::{is_stablecoin, BalanceInfo, BotStatus};

/// Default seed size for auto-created orphan managers.
const ORPHAN_TRADE_AMOUNT_USDT: f64 = 100.0;

/// How long `stop` waits for a worker to wind down before abandoning it.
const STOP_TIMEOUT: Duration = Duration::from_secs(45);

// =============================================================================
// Operation errors
// =============================================================================

/// Errors surfaced to the dashboard; each maps to a stable machine code.
#[derive(Debug)]
pub enum OpError {
    NotFound(u64),
    BotRunning(u64),
    SymbolLocked,
    SymbolNotTradeable(String),
    InvalidRequest(String),
    Upstream(anyhow::Error),
    Internal(anyhow::Error),
}

impl OpError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "bot_not_found",
            Self::BotRunning(_) => "bot_running",
            Self::SymbolLocked => "symbol_locked_while_position_open",
            Self::SymbolNotTradeable(_) => "symbol_not_tradeable",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Upstream(_) => "upstream_failure",
            Self::Internal(_) => "internal_error",
        }
    }

    /// True for errors the client caused (4xx); false for upstream/internal
    /// failures (5xx).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Upstream(_) | Self::Internal(_))
    }
}

impl std::fmt::Display for OpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "bot {id} not found"),
            Self::BotRunning(id) => write!(f, "bot {id} is running; stop it first"),
            Self::SymbolLocked => {
                write!(f, "symbol cannot change while a position is open")
            }
            Self::SymbolNotTradeable(s) => write!(f, "symbol {s} is not tradeable"),
            Self::InvalidRequest(msg) => write!(f, "{msg}"),
            Self::Upstream(e) => write!(f, "upstream failure: {e:#}"),
            Self::Internal(e) => write!(f, "internal error: {e:#}"),
        }
    }
}

impl From<anyhow::Error> for OpError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}

// =============================================================================
// Overview payloads
// =============================================================================

#[derive(Debug, Serialize)]
pub struct BotOverview {
    #[serde(flatten)]
    pub bot: Bot,
    pub position: Option<Position>,
    pub current_price: Option<f64>,
    pub unrealized_pnl_usdt: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct Overview {
    pub server_time: i64,
    pub wallet: Vec<BalanceInfo>,
    pub usdt_free: f64,
    pub bots: Vec<BotOverview>,
    /// asset -> ids of the bots whose symbol covers it.
    pub managed_assets: HashMap<String, Vec<u64>>,
    /// Non-stable, non-zero assets no bot covers.
    pub orphans: Vec<String>,
    pub api_counters: DailyCounters,
    pub rate_limit: RateLimitSnapshot,
}

#[derive(Debug, Serialize)]
pub struct CoinDetail {
    pub asset: String,
    pub symbol: String,
    pub price: Option<f64>,
    pub balance: Option<BalanceInfo>,
    pub managed_by: Vec<ManagingBot>,
}

#[derive(Debug, Serialize)]
pub struct ManagingBot {
    pub id: u64,
    pub name: String,
    pub status: BotStatus,
    pub position: Option<Position>,
}

// =============================================================================
// Supervisor
// =============================================================================

pub struct Supervisor {
    pub config: Arc<AppConfig>,
    pub exchange: Arc<BinanceClient>,
    pub symbols: Arc<SymbolCache>,
    pub candles: Arc<CandleCache>,
    pub counters: Arc<ApiCounters>,
    pub notifier: Arc<SmsNotifier>,
    pub registry: Arc<BotRegistry>,
    pub services: StrategyServices,
    workers: Mutex<HashMap<u64, WorkerHandle>>,
    /// Set to true to ask main for a graceful shutdown (restart endpoint).
    shutdown_tx: watch::Sender<bool>,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<AppConfig>,
        exchange: Arc<BinanceClient>,
        symbols: Arc<SymbolCache>,
        candles: Arc<CandleCache>,
        counters: Arc<ApiCounters>,
        notifier: Arc<SmsNotifier>,
        registry: Arc<BotRegistry>,
        services: StrategyServices,
        shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            config,
            exchange,
            symbols,
            candles,
            counters,
            notifier,
            registry,
            services,
            workers: Mutex::new(HashMap::new()),
            shutdown_tx,
        }
    }

    fn worker_context(&self, bot_id: u64) -> WorkerContext {
        WorkerContext {
            bot_id,
            config: self.config.clone(),
            exchange: self.exchange.clone(),
            symbols: self.symbols.clone(),
            candles: self.candles.clone(),
            registry: self.registry.clone(),
            services: self.services.clone(),
            notifier: self.notifier.clone(),
        }
    }

    fn position_store(&self, bot_id: u64) -> PositionStore {
        PositionStore::new(&self.config.data_dir, bot_id)
    }

    /// Drop handles of workers that ended on their own (config errors park
    /// the worker task; its roster entry is already `stopped`).
    fn prune_finished(&self) {
        self.workers.lock().retain(|_, w| !w.handle.is_finished());
    }

    // -------------------------------------------------------------------------
    // Lifecycle operations
    // -------------------------------------------------------------------------

    /// Create a bot. The symbol must be tradeable; ownership by another
    /// running bot is advisory and can be overridden by the caller.
    pub async fn create_bot(&self, spec: NewBotSpec) -> Result<Bot, OpError> {
        let symbol = spec.symbol.to_uppercase();
        if !symbol.ends_with("USDT") {
            return Err(OpError::InvalidRequest(format!(
                "only USDT quote pairs are supported, got {symbol}"
            )));
        }
        if spec.trade_amount_usdt <= 0.0 || !spec.trade_amount_usdt.is_finite() {
            return Err(OpError::InvalidRequest(
                "trade_amount_usdt must be positive".into(),
            ));
        }

        if !self.symbols.is_tradeable(&symbol).await {
            return Err(OpError::SymbolNotTradeable(symbol));
        }

        if !spec.allow_duplicate_symbol
            && self.registry.running_symbols().contains(&symbol)
        {
            return Err(OpError::InvalidRequest(format!(
                "symbol {symbol} is already managed by a running bot \
                 (set allow_duplicate_symbol to override)"
            )));
        }

        Ok(self.registry.create(spec)?)
    }

    /// Start the bot's worker. A no-op when it is already running.
    pub fn start(&self, id: u64) -> Result<Bot, OpError> {
        let bot = self.registry.get(id).ok_or(OpError::NotFound(id))?;

        self.prune_finished();
        let mut workers = self.workers.lock();
        if workers.contains_key(&id) {
            return Ok(bot);
        }

        let bot = self.registry.set_status(id, BotStatus::Running)?;
        workers.insert(id, spawn_worker(self.worker_context(id)));
        info!(id, name = %bot.name, symbol = %bot.symbol, "bot started");
        Ok(bot)
    }

    /// Stop the bot's worker and wait for it to wind down. A no-op when it is
    /// already stopped.
    pub async fn stop(&self, id: u64) -> Result<Bot, OpError> {
        self.registry.get(id).ok_or(OpError::NotFound(id))?;

        let handle = self.workers.lock().remove(&id);
        if let Some(worker) = handle {
            worker.signal_stop();
            match tokio::time::timeout(STOP_TIMEOUT, worker.handle).await {
                Ok(_) => info!(id, "worker stopped"),
                Err(_) => warn!(id, "worker did not stop in time, abandoning task"),
            }
        }

        Ok(self.registry.set_status(id, BotStatus::Stopped)?)
    }

    /// Delete a bot. Refused while its worker is running.
    pub fn delete(&self, id: u64) -> Result<(), OpError> {
        self.registry.get(id).ok_or(OpError::NotFound(id))?;
        self.prune_finished();
        if self.workers.lock().contains_key(&id) {
            return Err(OpError::BotRunning(id));
        }

        self.registry.remove(id)?;
        // The position file goes with the bot; the log stays for forensics.
        self.position_store(id).clear().map_err(OpError::Internal)?;
        Ok(())
    }

    /// Patch editable fields. A symbol change is refused while a position
    /// exists and validated against the exchange otherwise.
    pub async fn edit(&self, id: u64, patch: BotPatch) -> Result<Bot, OpError> {
        let bot = self.registry.get(id).ok_or(OpError::NotFound(id))?;

        let new_symbol = match &patch.symbol {
            Some(s) => {
                let s = s.to_uppercase();
                if s != bot.symbol {
                    if self.position_store(id).exists() {
                        return Err(OpError::SymbolLocked);
                    }
                    if !self.symbols.is_tradeable(&s).await {
                        return Err(OpError::SymbolNotTradeable(s));
                    }
                    Some(s)
                } else {
                    None
                }
            }
            None => None,
        };

        if let Some(amount) = patch.trade_amount_usdt {
            if amount <= 0.0 || !amount.is_finite() {
                return Err(OpError::InvalidRequest(
                    "trade_amount_usdt must be positive".into(),
                ));
            }
        }

        Ok(self.registry.update(id, |bot| {
            if let Some(name) = patch.name {
                bot.name = name;
            }
            if let Some(symbol) = new_symbol {
                bot.symbol = symbol;
            }
            if let Some(strategy) = patch.strategy {
                bot.strategy = strategy;
            }
            if let Some(amount) = patch.trade_amount_usdt {
                bot.trade_amount_usdt = amount;
            }
        })?)
    }

    /// Raise a bot's capital quota.
    pub fn add_funds(&self, id: u64, usdt: f64) -> Result<Bot, OpError> {
        self.registry.get(id).ok_or(OpError::NotFound(id))?;
        self.registry
            .add_funds(id, usdt)
            .map_err(|e| OpError::InvalidRequest(e.to_string()))
    }

    /// Spawn workers for every bot persisted as `running` (boot resume).
    pub fn start_marked_running(&self) {
        for bot in self.registry.list() {
            if bot.status == BotStatus::Running {
                let mut workers = self.workers.lock();
                if !workers.contains_key(&bot.id) {
                    info!(id = bot.id, name = %bot.name, "resuming worker from persisted state");
                    workers.insert(bot.id, spawn_worker(self.worker_context(bot.id)));
                }
            }
        }
    }

    /// Ask main to exit gracefully (the process manager restarts us).
    pub fn request_restart(&self) {
        info!("restart requested via dashboard");
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop every worker and flush shared state (process shutdown).
    pub async fn shutdown_all(&self) {
        let handles: Vec<(u64, WorkerHandle)> = self.workers.lock().drain().collect();
        for (_, worker) in &handles {
            worker.signal_stop();
        }
        for (id, worker) in handles {
            if tokio::time::timeout(STOP_TIMEOUT, worker.handle).await.is_err() {
                warn!(id, "worker did not stop before shutdown deadline");
            }
        }

        if let Err(e) = self.services.news.flush() {
            warn!(error = %e, "failed to flush news cache on shutdown");
        }
        if let Err(e) = self.counters.flush() {
            warn!(error = %e, "failed to flush counters on shutdown");
        }
        info!("all workers stopped, shared state flushed");
    }

    // -------------------------------------------------------------------------
    // Orphan reconciliation
    // -------------------------------------------------------------------------

    /// Adopt wallet assets no bot covers: for each non-zero, non-stablecoin
    /// asset whose USDT pair trades, add a stopped `Auto-Manager` bot running
    /// the autonomous news strategy. Never trades, never starts workers.
    pub async fn reconcile_orphans(&self) -> Result<Vec<Bot>, OpError> {
        let balances = self
            .exchange
            .get_balances()
            .await
            .map_err(OpError::Upstream)?;

        let covered: HashSet<String> = self
            .registry
            .list()
            .iter()
            .map(|b| base_asset(&b.symbol).to_string())
            .collect();

        let mut adopted = Vec::new();
        for balance in balances {
            if balance.total() <= 0.0 || is_stablecoin(&balance.asset) {
                continue;
            }
            if covered.contains(&balance.asset) {
                continue;
            }

            let pair = usdt_pair(&balance.asset);
            if !self.symbols.is_tradeable(&pair).await {
                info!(
                    asset = %balance.asset,
                    pair = %pair,
                    "orphan asset has no tradeable USDT pair, skipping"
                );
                continue;
            }

            let bot = self.registry.create(NewBotSpec {
                name: format!("Auto-Manager: {}", balance.asset),
                symbol: pair,
                strategy: StrategyKind::NewsAutonomous,
                allocated_capital_usdt: 0.0,
                trade_amount_usdt: ORPHAN_TRADE_AMOUNT_USDT,
                allow_duplicate_symbol: false,
            })?;
            info!(
                id = bot.id,
                asset = %balance.asset,
                qty = balance.total(),
                "orphan asset adopted"
            );
            adopted.push(bot);
        }

        Ok(adopted)
    }

    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    /// Full dashboard overview: wallet, fleet, per-asset coverage, orphans.
    pub async fn overview(&self) -> Result<Overview, OpError> {
        let wallet = self
            .exchange
            .get_balances()
            .await
            .map_err(OpError::Upstream)?;

        let usdt_free = wallet
            .iter()
            .find(|b| b.asset == "USDT")
            .map(|b| b.free)
            .unwrap_or(0.0);

        let bots = self.registry.list();

        // One price lookup per distinct symbol that has a position.
        let mut bot_views = Vec::with_capacity(bots.len());
        let mut prices: HashMap<String, f64> = HashMap::new();
        for bot in &bots {
            let position = self.position_store(bot.id).load().unwrap_or_default();
            let current_price = match &position {
                Some(pos) => {
                    if let Some(p) = prices.get(&pos.symbol) {
                        Some(*p)
                    } else {
                        match self.exchange.get_ticker_price(&pos.symbol).await {
                            Ok(p) => {
                                prices.insert(pos.symbol.clone(), p);
                                Some(p)
                            }
                            Err(e) => {
                                warn!(symbol = %pos.symbol, error = %e, "price lookup failed for overview");
                                None
                            }
                        }
                    }
                }
                None => None,
            };
            let unrealized_pnl_usdt = match (&position, current_price) {
                (Some(pos), Some(price)) => Some(pos.unrealized_pnl(price)),
                _ => None,
            };
            bot_views.push(BotOverview {
                bot: bot.clone(),
                position,
                current_price,
                unrealized_pnl_usdt,
            });
        }

        let mut managed_assets: HashMap<String, Vec<u64>> = HashMap::new();
        for bot in &bots {
            managed_assets
                .entry(base_asset(&bot.symbol).to_string())
                .or_default()
                .push(bot.id);
        }

        let orphans: Vec<String> = wallet
            .iter()
            .filter(|b| b.total() > 0.0 && !is_stablecoin(&b.asset))
            .filter(|b| !managed_assets.contains_key(&b.asset))
            .map(|b| b.asset.clone())
            .collect();

        Ok(Overview {
            server_time: Utc::now().timestamp_millis(),
            wallet,
            usdt_free,
            bots: bot_views,
            managed_assets,
            orphans,
            api_counters: self.counters.snapshot(),
            rate_limit: self.exchange.rate_limit.snapshot(),
        })
    }

    /// Per-asset drill-down for the dashboard's coin page.
    pub async fn coin_detail(&self, asset: &str) -> Result<CoinDetail, OpError> {
        let asset = asset.to_uppercase();
        let symbol = usdt_pair(&asset);

        let price = self.exchange.get_ticker_price(&symbol).await.ok();

        let balance = self
            .exchange
            .get_balances()
            .await
            .map_err(OpError::Upstream)?
            .into_iter()
            .find(|b| b.asset == asset);

        let managed_by: Vec<ManagingBot> = self
            .registry
            .list()
            .into_iter()
            .filter(|b| base_asset(&b.symbol) == asset)
            .map(|b| ManagingBot {
                position: self.position_store(b.id).load().unwrap_or_default(),
                id: b.id,
                name: b.name,
                status: b.status,
            })
            .collect();

        Ok(CoinDetail {
            asset,
            symbol,
            price,
            balance,
            managed_by,
        })
    }

    /// Last `n` logbook records for a bot.
    pub fn bot_logs(&self, id: u64, n: usize) -> Result<Vec<crate::bot::logbook::LogRecord>, OpError> {
        self.registry.get(id).ok_or(OpError::NotFound(id))?;
        let logbook = crate::bot::Logbook::new(&self.config.data_dir, id);
        Ok(logbook.tail(n))
    }

    /// True when the bot has a live worker task.
    pub fn is_running(&self, id: u64) -> bool {
        self.prune_finished();
        self.workers.lock().contains_key(&id)
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("workers", &self.workers.lock().len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::NewsAnalyzer;
    use crate::binance::client::SymbolRules;
    use crate::news::{NewsProviders, SharedNewsCache};

    fn test_supervisor() -> (Supervisor, std::path::PathBuf) {
        let mut config = AppConfig::for_tests();
        let dir = config.data_dir.clone();
        std::fs::create_dir_all(&dir).unwrap();
        // Long tick so test workers stay parked in their first sleep.
        config.tick_interval = Duration::from_secs(3600);

        let config = Arc::new(config);
        let exchange = Arc::new(BinanceClient::new("", "", true));
        let symbols = Arc::new(SymbolCache::new(exchange.clone()));
        let candles = Arc::new(CandleCache::new(exchange.clone()));
        let counters = Arc::new(ApiCounters::load(&dir));
        let notifier = Arc::new(SmsNotifier::new(&config));
        let registry = Arc::new(BotRegistry::load(&dir).unwrap());
        let news = Arc::new(SharedNewsCache::new(
            NewsProviders::new(None, None),
            counters.clone(),
            Duration::from_secs(8 * 3600),
            3,
            &dir,
        ));
        let services = StrategyServices {
            news,
            analyzer: Arc::new(NewsAnalyzer::new(None, counters.clone())),
            symbols: symbols.clone(),
        };
        let (shutdown_tx, _) = watch::channel(false);

        let supervisor = Supervisor::new(
            config, exchange, symbols, candles, counters, notifier, registry, services,
            shutdown_tx,
        );
        (supervisor, dir)
    }

    fn tradeable_rules() -> SymbolRules {
        SymbolRules {
            tradeable: true,
            lot_step: 0.001,
            min_notional: 5.0,
        }
    }

    fn spec(symbol: &str) -> NewBotSpec {
        NewBotSpec {
            name: format!("bot-{symbol}"),
            symbol: symbol.into(),
            strategy: StrategyKind::Enhanced,
            allocated_capital_usdt: 200.0,
            trade_amount_usdt: 100.0,
            allow_duplicate_symbol: false,
        }
    }

    #[tokio::test]
    async fn create_rejects_unknown_symbol() {
        let (supervisor, dir) = test_supervisor();
        // Nothing primed and the exchange is unreachable: not tradeable.
        let err = supervisor.create_bot(spec("NOPEUSDT")).await.unwrap_err();
        assert_eq!(err.code(), "symbol_not_tradeable");
        assert!(err.is_client_error());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn create_rejects_non_usdt_quote() {
        let (supervisor, dir) = test_supervisor();
        let err = supervisor.create_bot(spec("ETHBTC")).await.unwrap_err();
        assert_eq!(err.code(), "invalid_request");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn duplicate_running_symbol_is_advisory() {
        let (supervisor, dir) = test_supervisor();
        supervisor.symbols.prime("SOLUSDT", tradeable_rules());

        let a = supervisor.create_bot(spec("SOLUSDT")).await.unwrap();
        supervisor.registry.set_status(a.id, BotStatus::Running).unwrap();

        // Second bot on the same running symbol is refused...
        let err = supervisor.create_bot(spec("SOLUSDT")).await.unwrap_err();
        assert_eq!(err.code(), "invalid_request");

        // ...unless the caller overrides.
        let mut dup = spec("SOLUSDT");
        dup.allow_duplicate_symbol = true;
        assert!(supervisor.create_bot(dup).await.is_ok());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn start_is_idempotent_and_delete_refused_while_running() {
        let (supervisor, dir) = test_supervisor();
        supervisor.symbols.prime("ETHUSDT", tradeable_rules());
        let bot = supervisor.create_bot(spec("ETHUSDT")).await.unwrap();

        supervisor.start(bot.id).unwrap();
        assert!(supervisor.is_running(bot.id));
        // Start on a running bot is a no-op, not an error.
        supervisor.start(bot.id).unwrap();

        let err = supervisor.delete(bot.id).unwrap_err();
        assert_eq!(err.code(), "bot_running");

        supervisor.stop(bot.id).await.unwrap();
        assert!(!supervisor.is_running(bot.id));
        // Stop on a stopped bot is a no-op.
        supervisor.stop(bot.id).await.unwrap();

        supervisor.delete(bot.id).unwrap();
        assert!(supervisor.registry.get(bot.id).is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn edit_refuses_symbol_change_with_open_position() {
        let (supervisor, dir) = test_supervisor();
        supervisor.symbols.prime("ETHUSDT", tradeable_rules());
        supervisor.symbols.prime("SOLUSDT", tradeable_rules());
        let bot = supervisor.create_bot(spec("ETHUSDT")).await.unwrap();

        // Simulate an open position on disk.
        supervisor
            .position_store(bot.id)
            .save(&Position::open("ETHUSDT", 0.05, 4366.87, 0.97, 1.05, None))
            .unwrap();

        let err = supervisor
            .edit(
                bot.id,
                BotPatch {
                    symbol: Some("SOLUSDT".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "symbol_locked_while_position_open");

        // Non-symbol edits stay allowed.
        let updated = supervisor
            .edit(
                bot.id,
                BotPatch {
                    name: Some("renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "renamed");

        // After the position clears, the symbol unlocks.
        supervisor.position_store(bot.id).clear().unwrap();
        let updated = supervisor
            .edit(
                bot.id,
                BotPatch {
                    symbol: Some("SOLUSDT".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.symbol, "SOLUSDT");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn add_funds_raises_quota() {
        let (supervisor, dir) = test_supervisor();
        supervisor.symbols.prime("ADAUSDT", tradeable_rules());
        let bot = supervisor.create_bot(spec("ADAUSDT")).await.unwrap();

        let updated = supervisor.add_funds(bot.id, 55.5).unwrap();
        assert!((updated.allocated_capital_usdt - 255.5).abs() < 1e-9);

        let err = supervisor.add_funds(bot.id, -1.0).unwrap_err();
        assert!(err.is_client_error());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn logs_for_unknown_bot_is_not_found() {
        let (supervisor, dir) = test_supervisor();
        let err = supervisor.bot_logs(999, 10).unwrap_err();
        assert_eq!(err.code(), "bot_not_found");
        std::fs::remove_dir_all(&dir).ok();
    }
}
