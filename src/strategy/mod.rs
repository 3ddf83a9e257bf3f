// =============================================================================
// Strategy — pure signal functions behind a single `analyze` entry point
// =============================================================================
//
// Strategies are a closed set of variants. Every variant implements the same
// contract: given market context (candles, optional position, news services)
// produce a StrategySignal. Strategies never error — any internal failure
// becomes HOLD with a reason — so a worker tick can always proceed.
// =============================================================================

pub mod news_auto;
pub mod technical;
pub mod ticker_news;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ai::NewsAnalyzer;
use crate::binance::SymbolCache;
use crate::bot::Position;
use crate::market_data::Candle;
use crate::news::SharedNewsCache;
use crate::types::Signal;

/// Confidence at or above which a BUY in management mode is treated as an
/// explicit scale-in request.
pub const SCALE_IN_CONFIDENCE: u8 = 85;

/// The closed set of strategy variants a bot can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    // Technical rule sets.
    Volatile,
    MeanReversion,
    Breakout,
    Conservative,
    SimpleProfitable,
    Enhanced,
    Momentum,
    // News-driven.
    TickerNews,
    NewsAutonomous,
}

impl StrategyKind {
    /// True for variants that consume news and the AI analyzer.
    pub fn needs_news(&self) -> bool {
        matches!(self, Self::TickerNews | Self::NewsAutonomous)
    }

    /// True for the variant allowed to recommend symbol switches.
    pub fn is_autonomous(&self) -> bool {
        matches!(self, Self::NewsAutonomous)
    }

    /// Candle interval each variant analyzes.
    pub fn candle_interval(&self) -> &'static str {
        match self {
            Self::Volatile => "5m",
            Self::MeanReversion | Self::Conservative => "1h",
            Self::Breakout
            | Self::SimpleProfitable
            | Self::Enhanced
            | Self::Momentum
            | Self::TickerNews
            | Self::NewsAutonomous => "15m",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Volatile => "volatile",
            Self::MeanReversion => "mean_reversion",
            Self::Breakout => "breakout",
            Self::Conservative => "conservative",
            Self::SimpleProfitable => "simple_profitable",
            Self::Enhanced => "enhanced",
            Self::Momentum => "momentum",
            Self::TickerNews => "ticker_news",
            Self::NewsAutonomous => "news_autonomous",
        };
        write!(f, "{name}")
    }
}

/// What a strategy returns for one tick.
#[derive(Debug, Clone, Serialize)]
pub struct StrategySignal {
    pub signal: Signal,
    /// 0–100.
    pub confidence: u8,
    pub reasoning: String,
    /// Only ever set by the autonomous strategy, and only while flat.
    pub recommended_symbol: Option<String>,
    /// Explicit permission for a scale-in buy while a position is held.
    pub allow_scale_in: bool,
}

impl StrategySignal {
    pub fn hold(reasoning: impl Into<String>) -> Self {
        Self {
            signal: Signal::Hold,
            confidence: 0,
            reasoning: reasoning.into(),
            recommended_symbol: None,
            allow_scale_in: false,
        }
    }

    pub fn buy(confidence: u8, reasoning: impl Into<String>) -> Self {
        Self {
            signal: Signal::Buy,
            confidence,
            reasoning: reasoning.into(),
            recommended_symbol: None,
            allow_scale_in: false,
        }
    }

    pub fn sell(confidence: u8, reasoning: impl Into<String>) -> Self {
        Self {
            signal: Signal::Sell,
            confidence,
            reasoning: reasoning.into(),
            recommended_symbol: None,
            allow_scale_in: false,
        }
    }
}

/// Market context handed to a strategy for one tick.
pub struct StrategyContext<'a> {
    pub symbol: &'a str,
    pub candles: &'a [Candle],
    /// Present puts news strategies into locked-symbol management mode.
    pub position: Option<&'a Position>,
}

/// Shared services news strategies draw on.
#[derive(Clone)]
pub struct StrategyServices {
    pub news: Arc<SharedNewsCache>,
    pub analyzer: Arc<NewsAnalyzer>,
    pub symbols: Arc<SymbolCache>,
}

/// Evaluate `kind` against `ctx`. Never errors.
pub async fn analyze(
    kind: StrategyKind,
    ctx: &StrategyContext<'_>,
    services: &StrategyServices,
) -> StrategySignal {
    let mut signal = match kind {
        StrategyKind::TickerNews => ticker_news::analyze(ctx, services).await,
        StrategyKind::NewsAutonomous => news_auto::analyze(ctx, services).await,
        technical_kind => technical::analyze(technical_kind, ctx),
    };

    // Management mode: a strong BUY against an existing position is an
    // explicit scale-in request; anything weaker stays a plain BUY that the
    // worker will ignore.
    if ctx.position.is_some()
        && signal.signal == Signal::Buy
        && signal.confidence >= SCALE_IN_CONFIDENCE
    {
        signal.allow_scale_in = true;
    }

    signal
}

/// Base asset of a USDT pair ("SOLUSDT" -> "SOL").
pub fn base_asset(symbol: &str) -> &str {
    symbol.strip_suffix("USDT").unwrap_or(symbol)
}

/// USDT pair for a base asset ("SOL" -> "SOLUSDT").
pub fn usdt_pair(asset: &str) -> String {
    format!("{}USDT", asset.to_uppercase())
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&StrategyKind::NewsAutonomous).unwrap(),
            "\"news_autonomous\""
        );
        let kind: StrategyKind = serde_json::from_str("\"mean_reversion\"").unwrap();
        assert_eq!(kind, StrategyKind::MeanReversion);
    }

    #[test]
    fn news_requirements() {
        assert!(StrategyKind::TickerNews.needs_news());
        assert!(StrategyKind::NewsAutonomous.needs_news());
        assert!(!StrategyKind::Enhanced.needs_news());
        assert!(StrategyKind::NewsAutonomous.is_autonomous());
        assert!(!StrategyKind::TickerNews.is_autonomous());
    }

    #[test]
    fn symbol_asset_mapping() {
        assert_eq!(base_asset("SOLUSDT"), "SOL");
        assert_eq!(base_asset("BTC"), "BTC");
        assert_eq!(usdt_pair("ada"), "ADAUSDT");
    }

    #[test]
    fn hold_constructor_is_neutral() {
        let s = StrategySignal::hold("nothing to do");
        assert_eq!(s.signal, Signal::Hold);
        assert_eq!(s.confidence, 0);
        assert!(!s.allow_scale_in);
        assert!(s.recommended_symbol.is_none());
    }
}
