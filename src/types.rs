// =============================================================================
// Shared types used across the Flotilla trading fleet
// =============================================================================

use serde::{Deserialize, Serialize};

/// Balance snapshot for a single asset from the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub asset: String,
    #[serde(default)]
    pub free: f64,
    #[serde(default)]
    pub locked: f64,
}

impl BalanceInfo {
    /// Total holding (free + locked).
    pub fn total(&self) -> f64 {
        self.free + self.locked
    }
}

/// Trade direction produced by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Default for Signal {
    fn default() -> Self {
        Self::Hold
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// Whether a bot's worker should be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Stopped,
    Running,
}

impl Default for BotStatus {
    fn default() -> Self {
        Self::Stopped
    }
}

impl std::fmt::Display for BotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Category tag for per-bot log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogCategory {
    Strategy,
    Trade,
    Position,
    News,
    Error,
}

impl std::fmt::Display for LogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strategy => write!(f, "STRATEGY"),
            Self::Trade => write!(f, "TRADE"),
            Self::Position => write!(f, "POSITION"),
            Self::News => write!(f, "NEWS"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Side of an executed trade, as sent to the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// A completed, state-changing trade. Delivered to the notifier and the
/// per-bot logbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub bot_id: u64,
    pub action: TradeAction,
    pub symbol: String,
    pub price: f64,
    pub qty: f64,
    pub notional_usdt: f64,
    #[serde(default)]
    pub pnl_usdt: Option<f64>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl TradeEvent {
    /// PnL as a percentage of cost basis, when both are known.
    pub fn pnl_pct(&self) -> Option<f64> {
        let pnl = self.pnl_usdt?;
        let cost = self.notional_usdt - pnl;
        if cost.abs() < f64::EPSILON {
            return None;
        }
        Some(pnl / cost * 100.0)
    }
}

/// Assets that are never adopted as orphans and never counted as holdings
/// to manage.
pub const STABLECOINS: &[&str] = &["USDT", "USDC", "BUSD", "FDUSD", "TUSD", "DAI"];

/// True when `asset` is a quote/stable asset rather than a managed holding.
pub fn is_stablecoin(asset: &str) -> bool {
    STABLECOINS.iter().any(|s| s.eq_ignore_ascii_case(asset))
}
