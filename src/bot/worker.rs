// =============================================================================
// Bot Worker — one long-lived trading loop per bot
// =============================================================================
//
// Tick order (15 min by default):
//   1. reload the roster entry and the position file
//   2. reconcile the position against the wallet (external sells, dust)
//   3. emergency exits: stop-loss, take-profit, max-hold (inclusive bounds)
//   4. run the strategy
//   5. symbol switching (autonomous strategy, flat only)
//   6. apply the decision (sell / first buy / scale-in)
//   7. observe: logbook records + SMS on every state-changing trade
//   8. sleep; a stop signal aborts the sleep promptly
//
// A tick that fails at the exchange is logged and dropped; the next tick
// retries from scratch. Ticks are strictly sequential within one bot.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::binance::client::SymbolRules;
use crate::binance::{BinanceClient, SymbolCache};
use crate::bot::logbook::Logbook;
use crate::bot::position::{Position, PositionStore};
use crate::config::AppConfig;
use crate::market_data::CandleCache;
use crate::notifier::{notify_trade, SmsNotifier};
use crate::registry::{Bot, BotRegistry};
use crate::strategy::{self, base_asset, StrategyContext, StrategyServices, StrategySignal};
use crate::types::{BotStatus, LogCategory, Signal, TradeAction, TradeEvent};

/// Candle window handed to strategies.
const CANDLE_WINDOW: u32 = 100;

/// Everything a worker needs, injected at spawn time.
#[derive(Clone)]
pub struct WorkerContext {
    pub bot_id: u64,
    pub config: Arc<AppConfig>,
    pub exchange: Arc<BinanceClient>,
    pub symbols: Arc<SymbolCache>,
    pub candles: Arc<CandleCache>,
    pub registry: Arc<BotRegistry>,
    pub services: StrategyServices,
    pub notifier: Arc<SmsNotifier>,
}

/// Handle the supervisor keeps per running worker.
pub struct WorkerHandle {
    stop_tx: watch::Sender<bool>,
    pub handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to stop at its next suspension point.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// What a tick tells the loop to do next.
enum TickOutcome {
    Continue,
    /// Unrecoverable configuration problem; the worker parks itself.
    StopSelf(String),
}

/// Spawn the worker task for `ctx.bot_id`.
pub fn spawn_worker(ctx: WorkerContext) -> WorkerHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(run(ctx, stop_rx));
    WorkerHandle { stop_tx, handle }
}

async fn run(ctx: WorkerContext, mut stop_rx: watch::Receiver<bool>) {
    let store = PositionStore::new(&ctx.config.data_dir, ctx.bot_id);
    let logbook = Logbook::new(&ctx.config.data_dir, ctx.bot_id);

    info!(bot_id = ctx.bot_id, "worker started");
    logbook.info(LogCategory::Strategy, "worker started");

    let mut first_tick = true;
    loop {
        if *stop_rx.borrow() {
            break;
        }

        match tick(&ctx, &store, &logbook, first_tick).await {
            Ok(TickOutcome::Continue) => {}
            Ok(TickOutcome::StopSelf(reason)) => {
                logbook.error(&reason);
                if let Err(e) = ctx.registry.set_status(ctx.bot_id, BotStatus::Stopped) {
                    warn!(bot_id = ctx.bot_id, error = %e, "failed to park bot in registry");
                }
                break;
            }
            Err(e) => {
                // Transient: drop the tick, retry on the next one.
                warn!(bot_id = ctx.bot_id, error = %format!("{e:#}"), "tick failed");
                logbook.warn(LogCategory::Error, &format!("tick failed: {e:#}"));
            }
        }
        first_tick = false;

        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(ctx.config.tick_interval) => {}
        }
    }

    logbook.info(LogCategory::Strategy, "worker stopped");
    info!(bot_id = ctx.bot_id, "worker stopped");
}

// ---------------------------------------------------------------------------
// One tick
// ---------------------------------------------------------------------------

async fn tick(
    ctx: &WorkerContext,
    store: &PositionStore,
    logbook: &Logbook,
    first_tick: bool,
) -> Result<TickOutcome> {
    let Some(bot) = ctx.registry.get(ctx.bot_id) else {
        return Ok(TickOutcome::StopSelf("bot removed from registry".into()));
    };
    let symbol = bot.symbol.clone();

    let rules = ctx.symbols.get(&symbol).await?;
    if !rules.tradeable {
        return Ok(TickOutcome::StopSelf(format!(
            "symbol {symbol} is not tradeable on the exchange"
        )));
    }

    let price = ctx.exchange.get_ticker_price(&symbol).await?;

    // ── 1–2. Load and reconcile the position ────────────────────────────
    let mut position = load_position(ctx, store, logbook, &symbol)?;
    position = reconcile_position(ctx, store, logbook, position, price, &rules).await?;
    if first_tick && position.is_none() {
        position = synthesize_position(ctx, store, logbook, &bot, price, &rules).await?;
    }

    // ── 3. Emergency exits (inclusive boundaries) ───────────────────────
    if let Some(pos) = &position {
        let exit_reason = if price <= pos.stop_loss_price {
            Some("stop_loss")
        } else if price >= pos.take_profit_price {
            Some("take_profit")
        } else if pos.held_for(Utc::now()).to_std().unwrap_or_default() >= ctx.config.max_hold {
            Some("max_hold")
        } else {
            None
        };

        if let Some(reason) = exit_reason {
            logbook.info(
                LogCategory::Position,
                &format!("emergency exit ({reason}) at {price:.4}"),
            );
            sell_all(ctx, store, logbook, pos.clone(), &rules, reason).await?;
            return Ok(TickOutcome::Continue);
        }
    }

    // ── 4. Strategy ─────────────────────────────────────────────────────
    let candles = ctx
        .candles
        .get(&symbol, bot.strategy.candle_interval(), CANDLE_WINDOW)
        .await?;
    let sctx = StrategyContext {
        symbol: &symbol,
        candles: &candles,
        position: position.as_ref(),
    };
    let sig = strategy::analyze(bot.strategy, &sctx, &ctx.services).await;
    logbook.info(
        LogCategory::Strategy,
        &format!("{} ({}): {}", sig.signal, sig.confidence, sig.reasoning),
    );

    // ── 5. Symbol switching (autonomous only, flat only) ────────────────
    if bot.strategy.is_autonomous() {
        if position.is_some() {
            // Locked-symbol mode; recommendations (if any leaked) are void.
            logbook.info(
                LogCategory::Strategy,
                &format!("staying focused on {symbol} until the position closes"),
            );
        } else if let Some(recommended) = &sig.recommended_symbol {
            if recommended != &symbol {
                if ctx.symbols.is_tradeable(recommended).await {
                    ctx.registry.set_symbol(ctx.bot_id, recommended)?;
                    logbook.info(
                        LogCategory::Strategy,
                        &format!("switching symbol {symbol} -> {recommended}"),
                    );
                    // Trade against the new pair from the next tick on.
                    return Ok(TickOutcome::Continue);
                }
                logbook.warn(
                    LogCategory::Strategy,
                    &format!("recommended symbol {recommended} is not tradeable, ignoring"),
                );
            }
        }
    }

    // ── 6. Apply the decision ───────────────────────────────────────────
    match (sig.signal, position) {
        (Signal::Sell, Some(pos)) => {
            sell_all(ctx, store, logbook, pos, &rules, "strategy").await?;
        }
        (Signal::Sell, None) => {
            logbook.info(LogCategory::Strategy, "sell signal with no position, ignored");
        }
        (Signal::Buy, None) => {
            initial_buy(ctx, store, logbook, &bot, &rules, &sig).await?;
        }
        (Signal::Buy, Some(pos)) if sig.allow_scale_in => {
            scale_in(ctx, store, logbook, &bot, pos, &rules, &sig).await?;
        }
        (Signal::Buy, Some(_)) => {
            logbook.info(
                LogCategory::Strategy,
                "buy signal while holding without scale-in permission, ignored",
            );
        }
        (Signal::Hold, _) => {}
    }

    Ok(TickOutcome::Continue)
}

// ---------------------------------------------------------------------------
// Position bookkeeping
// ---------------------------------------------------------------------------

/// Load the position file. A corrupt file is cleared (with an ERROR record)
/// rather than wedging the bot forever.
fn load_position(
    ctx: &WorkerContext,
    store: &PositionStore,
    logbook: &Logbook,
    symbol: &str,
) -> Result<Option<Position>> {
    match store.load() {
        Ok(pos) => {
            // A stale file for another symbol can appear after manual edits.
            if let Some(p) = &pos {
                if p.symbol != symbol {
                    logbook.error(&format!(
                        "position file is for {} but bot trades {symbol}; clearing",
                        p.symbol
                    ));
                    store.clear()?;
                    return Ok(None);
                }
            }
            Ok(pos)
        }
        Err(e) => {
            warn!(bot_id = ctx.bot_id, error = %e, "corrupt position file cleared");
            logbook.error(&format!("corrupt position file cleared: {e:#}"));
            store.clear()?;
            Ok(None)
        }
    }
}

/// Shrink the recorded qty when the wallet holds less than the file says
/// (external manual sell); clear entirely when what remains is dust.
async fn reconcile_position(
    ctx: &WorkerContext,
    store: &PositionStore,
    logbook: &Logbook,
    position: Option<Position>,
    price: f64,
    rules: &SymbolRules,
) -> Result<Option<Position>> {
    let Some(mut pos) = position else {
        return Ok(None);
    };

    let wallet_qty = ctx.exchange.get_free_balance(base_asset(&pos.symbol)).await?;
    if wallet_qty < pos.qty * (1.0 - 1e-9) {
        logbook.warn(
            LogCategory::Position,
            &format!(
                "wallet holds {wallet_qty} but position records {}; reconciling down",
                pos.qty
            ),
        );
        pos.qty = wallet_qty;
    }

    if pos.is_dust(price, rules.min_notional) {
        logbook.info(
            LogCategory::Position,
            &format!(
                "position of {} {} is dust below min notional {:.2}, clearing",
                pos.qty,
                base_asset(&pos.symbol),
                rules.min_notional
            ),
        );
        store.clear()?;
        return Ok(None);
    }

    store.save(&pos)?;
    Ok(Some(pos))
}

/// First start over an existing wallet holding (orphan-adopted bots): build a
/// management position from the snapshot at the current market price.
async fn synthesize_position(
    ctx: &WorkerContext,
    store: &PositionStore,
    logbook: &Logbook,
    bot: &Bot,
    price: f64,
    rules: &SymbolRules,
) -> Result<Option<Position>> {
    let asset = base_asset(&bot.symbol);
    let wallet_qty = ctx.exchange.get_free_balance(asset).await?;
    if wallet_qty * price < rules.min_notional {
        return Ok(None);
    }

    let pos = Position::open(
        &bot.symbol,
        wallet_qty,
        price,
        ctx.config.stop_loss_factor(),
        ctx.config.take_profit_factor(),
        Some("adopted existing wallet holding".to_string()),
    );
    store.save(&pos)?;
    logbook.info(
        LogCategory::Position,
        &format!(
            "synthesized position: {wallet_qty} {asset} at market price {price:.4}, SL {:.4}, TP {:.4}",
            pos.stop_loss_price, pos.take_profit_price
        ),
    );
    Ok(Some(pos))
}

// ---------------------------------------------------------------------------
// Order flows
// ---------------------------------------------------------------------------

/// First buy of a position: spend min(trade_amount, quota, free USDT).
async fn initial_buy(
    ctx: &WorkerContext,
    store: &PositionStore,
    logbook: &Logbook,
    bot: &Bot,
    rules: &SymbolRules,
    sig: &StrategySignal,
) -> Result<()> {
    let available = ctx.exchange.get_free_balance("USDT").await?;
    let reserved = ctx
        .registry
        .reserve_spend(ctx.bot_id, bot.trade_amount_usdt, available)?;

    if reserved < rules.min_notional {
        if reserved > 0.0 {
            ctx.registry.rollback_spend(ctx.bot_id, reserved)?;
        }
        logbook.info(
            LogCategory::Trade,
            &format!(
                "buy skipped: spendable {reserved:.2} USDT below min notional {:.2}",
                rules.min_notional
            ),
        );
        return Ok(());
    }

    match ctx.exchange.market_buy(&bot.symbol, reserved, rules).await {
        Ok(fill) => {
            ctx.registry
                .confirm_spend(ctx.bot_id, reserved, fill.cumulative_quote_qty)?;

            let pos = Position::open(
                &bot.symbol,
                fill.executed_qty,
                fill.avg_fill_price,
                ctx.config.stop_loss_factor(),
                ctx.config.take_profit_factor(),
                Some(sig.reasoning.clone()),
            );
            store.save(&pos)?;

            logbook.info(
                LogCategory::Trade,
                &format!(
                    "BUY {} qty {} at {:.4} for {:.2} USDT (SL {:.4}, TP {:.4})",
                    bot.symbol,
                    fill.executed_qty,
                    fill.avg_fill_price,
                    fill.cumulative_quote_qty,
                    pos.stop_loss_price,
                    pos.take_profit_price
                ),
            );
            notify_trade(
                ctx.notifier.clone(),
                TradeEvent {
                    bot_id: ctx.bot_id,
                    action: TradeAction::Buy,
                    symbol: bot.symbol.clone(),
                    price: fill.avg_fill_price,
                    qty: fill.executed_qty,
                    notional_usdt: fill.cumulative_quote_qty,
                    pnl_usdt: None,
                    reasoning: Some(sig.reasoning.clone()),
                },
            );
            Ok(())
        }
        Err(e) => {
            ctx.registry.rollback_spend(ctx.bot_id, reserved)?;
            logbook.warn(LogCategory::Trade, &format!("buy failed, rolled back: {e:#}"));
            Err(e).context("market buy failed")
        }
    }
}

/// Scale-in: spend the entire remaining quota (capped by the wallet).
async fn scale_in(
    ctx: &WorkerContext,
    store: &PositionStore,
    logbook: &Logbook,
    bot: &Bot,
    mut pos: Position,
    rules: &SymbolRules,
    sig: &StrategySignal,
) -> Result<()> {
    let available = ctx.exchange.get_free_balance("USDT").await?;
    let spare = bot.allocated_capital_usdt;
    let reserved = ctx.registry.reserve_spend(ctx.bot_id, spare, available)?;

    if reserved < rules.min_notional {
        if reserved > 0.0 {
            ctx.registry.rollback_spend(ctx.bot_id, reserved)?;
        }
        logbook.info(
            LogCategory::Trade,
            &format!(
                "scale-in skipped: spare {reserved:.2} USDT below min notional {:.2}",
                rules.min_notional
            ),
        );
        return Ok(());
    }

    match ctx.exchange.market_buy(&bot.symbol, reserved, rules).await {
        Ok(fill) => {
            ctx.registry
                .confirm_spend(ctx.bot_id, reserved, fill.cumulative_quote_qty)?;

            pos.scale_in(
                fill.executed_qty,
                fill.avg_fill_price,
                ctx.config.stop_loss_factor(),
                ctx.config.take_profit_factor(),
            );
            pos.ai_reasoning = Some(sig.reasoning.clone());
            store.save(&pos)?;

            logbook.info(
                LogCategory::Trade,
                &format!(
                    "SCALE-IN {} qty {} at {:.4}; new avg {:.4}, SL {:.4}, TP {:.4}",
                    bot.symbol,
                    fill.executed_qty,
                    fill.avg_fill_price,
                    pos.avg_entry_price,
                    pos.stop_loss_price,
                    pos.take_profit_price
                ),
            );
            notify_trade(
                ctx.notifier.clone(),
                TradeEvent {
                    bot_id: ctx.bot_id,
                    action: TradeAction::Buy,
                    symbol: bot.symbol.clone(),
                    price: fill.avg_fill_price,
                    qty: fill.executed_qty,
                    notional_usdt: fill.cumulative_quote_qty,
                    pnl_usdt: None,
                    reasoning: Some(sig.reasoning.clone()),
                },
            );
            Ok(())
        }
        Err(e) => {
            ctx.registry.rollback_spend(ctx.bot_id, reserved)?;
            logbook.warn(
                LogCategory::Trade,
                &format!("scale-in failed, rolled back: {e:#}"),
            );
            Err(e).context("scale-in buy failed")
        }
    }
}

/// Close the whole position. Proceeds are credited back to the quota; the
/// position file is deleted (or shrunk on a partial fill).
async fn sell_all(
    ctx: &WorkerContext,
    store: &PositionStore,
    logbook: &Logbook,
    mut pos: Position,
    rules: &SymbolRules,
    reason: &str,
) -> Result<()> {
    let fill = ctx.exchange.market_sell(&pos.symbol, pos.qty, rules).await?;

    let proceeds = fill.cumulative_quote_qty;
    let cost = fill.executed_qty * pos.avg_entry_price;
    let pnl = proceeds - cost;
    pos.realized_pnl_usdt_cumulative += pnl;

    ctx.registry.credit_sale(ctx.bot_id, proceeds, pnl)?;

    let remaining = pos.qty - fill.executed_qty;
    if remaining * fill.avg_fill_price >= rules.min_notional {
        // Partial fill: keep managing what is left.
        pos.qty = remaining;
        store.save(&pos)?;
        logbook.warn(
            LogCategory::Position,
            &format!("partial sell fill, {remaining} still held"),
        );
    } else {
        store.clear()?;
    }

    logbook.info(
        LogCategory::Trade,
        &format!(
            "SELL {} qty {} at {:.4} for {:.2} USDT ({reason}), pnl {:+.2}",
            pos.symbol, fill.executed_qty, fill.avg_fill_price, proceeds, pnl
        ),
    );
    notify_trade(
        ctx.notifier.clone(),
        TradeEvent {
            bot_id: ctx.bot_id,
            action: TradeAction::Sell,
            symbol: pos.symbol.clone(),
            price: fill.avg_fill_price,
            qty: fill.executed_qty,
            notional_usdt: proceeds,
            pnl_usdt: Some(pnl),
            reasoning: Some(format!("{reason}: {}", pos.ai_reasoning.clone().unwrap_or_default())),
        },
    );
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
//
// The exchange-facing flows are exercised end-to-end by the validator against
// a testnet; here the pure decision pieces are covered: exit boundaries and
// the spend arithmetic live in `Position`/`BotRegistry`, so this module tests
// the boundary conditions the tick applies.
#[cfg(test)]
mod tests {
    use super::*;

    fn position_at(avg: f64, sl: f64, tp: f64) -> Position {
        let mut pos = Position::open("BNBUSDT", 0.10, avg, 0.97, 1.05, None);
        pos.stop_loss_price = sl;
        pos.take_profit_price = tp;
        pos
    }

    fn exit_reason(pos: &Position, price: f64, held_hours: u64, max_hold_hours: u64) -> Option<&'static str> {
        // Mirrors the tick's emergency-exit ladder.
        if price <= pos.stop_loss_price {
            Some("stop_loss")
        } else if price >= pos.take_profit_price {
            Some("take_profit")
        } else if held_hours >= max_hold_hours {
            Some("max_hold")
        } else {
            None
        }
    }

    #[test]
    fn stop_loss_fires_at_exact_boundary() {
        let pos = position_at(700.0, 679.0, 735.0);
        assert_eq!(exit_reason(&pos, 679.0, 0, 48), Some("stop_loss"));
        assert_eq!(exit_reason(&pos, 678.0, 0, 48), Some("stop_loss"));
        assert_eq!(exit_reason(&pos, 679.01, 0, 48), None);
    }

    #[test]
    fn take_profit_fires_at_exact_boundary() {
        let pos = position_at(700.0, 679.0, 735.0);
        assert_eq!(exit_reason(&pos, 735.0, 0, 48), Some("take_profit"));
        assert_eq!(exit_reason(&pos, 734.99, 0, 48), None);
    }

    #[test]
    fn max_hold_fires_at_exact_boundary() {
        let pos = position_at(700.0, 679.0, 735.0);
        assert_eq!(exit_reason(&pos, 700.0, 48, 48), Some("max_hold"));
        assert_eq!(exit_reason(&pos, 700.0, 47, 48), None);
    }

    #[test]
    fn stop_loss_takes_priority_over_max_hold() {
        let pos = position_at(700.0, 679.0, 735.0);
        assert_eq!(exit_reason(&pos, 600.0, 100, 48), Some("stop_loss"));
    }

    #[tokio::test]
    async fn stop_signal_aborts_promptly() {
        // A worker sleeping on a long tick interval must exit quickly once
        // signalled.
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(std::time::Duration::from_secs(900)) => {}
                }
            }
        });

        stop_tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("worker did not stop promptly")
            .unwrap();
    }
}
