// =============================================================================
// Technical strategies — seven indicator rule sets
// =============================================================================
//
// Rule sets (long-only spot; SELL is only meaningful against a position):
//
//   volatile          — trade band extremes, but only in a wide-band market:
//                       requires Bollinger width >= 4%; buys lower-band
//                       touches with RSI < 35, sells upper-band touches with
//                       RSI > 65. Volume surges raise confidence.
//   mean_reversion    — deep band excursions: %B <= 0.05 with RSI < 30 buys,
//                       %B >= 0.95 with RSI > 70 sells.
//   breakout          — close above the prior 20-candle high on >= 1.5x
//                       volume buys; close below the prior 20-candle low
//                       sells.
//   conservative      — requires three independent confirmations (RSI, MACD,
//                       EMA stack) before acting; small confidence.
//   simple_profitable — plain RSI thresholds: < 35 buy, > 65 sell.
//   enhanced          — weighted ensemble of RSI, MACD, EMA cross, %B, and
//                       volume; acts when |score| >= 35.
//   momentum          — rising MACD histogram plus a bullish EMA cross buys;
//                       the mirror image sells.
//
// All rule sets return HOLD with a reason when the candle window is too
// short or an indicator cannot be computed.
// =============================================================================

use crate::indicators::bollinger::bollinger_standard;
use crate::indicators::ema::{ema, ema_cross_above};
use crate::indicators::macd::macd_standard;
use crate::indicators::rsi::rsi;
use crate::indicators::volume_surge_ratio;
use crate::market_data::Candle;
use crate::strategy::{StrategyContext, StrategyKind, StrategySignal};

/// Candles required before any technical rule set will act.
const MIN_CANDLES: usize = 60;

/// Coarse technical stance, used by the news strategies for blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TechnicalRead {
    Bullish,
    Bearish,
    Neutral,
}

/// Trend gate used by the news strategies: three votes (MACD direction,
/// EMA 9/21 cross, price vs EMA 50), each with a dead zone so a flat tape
/// reads neutral. Two aligned votes make a side.
pub fn technical_read(candles: &[Candle]) -> TechnicalRead {
    if candles.len() < MIN_CANDLES {
        return TechnicalRead::Neutral;
    }
    let closes = closes(candles);
    let price = *closes.last().expect("non-empty");

    let mut votes = 0i32;

    if let Some(macd_v) = macd_standard(&closes) {
        if macd_v.histogram.abs() > price * 0.0001 {
            votes += if macd_v.histogram > 0.0 { 1 } else { -1 };
        }
    }

    if let (Some(fast), Some(slow)) = (ema(&closes, 9), ema(&closes, 21)) {
        if slow > 0.0 && ((fast - slow) / slow).abs() > 0.0005 {
            votes += if fast > slow { 1 } else { -1 };
        }
    }

    if let Some(ema50) = ema(&closes, 50) {
        if ema50 > 0.0 && ((price - ema50) / ema50).abs() > 0.002 {
            votes += if price > ema50 { 1 } else { -1 };
        }
    }

    if votes >= 2 {
        TechnicalRead::Bullish
    } else if votes <= -2 {
        TechnicalRead::Bearish
    } else {
        TechnicalRead::Neutral
    }
}

/// Evaluate one technical rule set.
pub fn analyze(kind: StrategyKind, ctx: &StrategyContext<'_>) -> StrategySignal {
    let candles = ctx.candles;
    if candles.len() < MIN_CANDLES {
        return StrategySignal::hold(format!(
            "insufficient candles: {} < {MIN_CANDLES}",
            candles.len()
        ));
    }

    match kind {
        StrategyKind::Volatile => volatile(candles),
        StrategyKind::MeanReversion => mean_reversion(candles),
        StrategyKind::Breakout => breakout(candles),
        StrategyKind::Conservative => conservative(candles),
        StrategyKind::SimpleProfitable => simple_profitable(candles),
        StrategyKind::Enhanced => enhanced(candles),
        StrategyKind::Momentum => momentum(candles),
        other => StrategySignal::hold(format!("{other} is not a technical strategy")),
    }
}

fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

fn volumes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.volume).collect()
}

// ---------------------------------------------------------------------------
// volatile
// ---------------------------------------------------------------------------

fn volatile(candles: &[Candle]) -> StrategySignal {
    let closes = closes(candles);
    let volumes = volumes(candles);
    let price = *closes.last().expect("non-empty by MIN_CANDLES");

    let (Some(bands), Some(rsi_v)) = (bollinger_standard(&closes), rsi(&closes, 14)) else {
        return StrategySignal::hold("indicators not ready");
    };

    if bands.width_pct < 4.0 {
        return StrategySignal::hold(format!(
            "band width {:.1}% too narrow for the volatility play",
            bands.width_pct
        ));
    }

    let surge = volume_surge_ratio(&volumes, 20).unwrap_or(1.0);
    let volume_bonus = if surge >= 1.2 { 10 } else { 0 };

    if price <= bands.lower && rsi_v < 35.0 {
        let confidence = (60 + ((35.0 - rsi_v) as u8).min(25) + volume_bonus).min(100);
        return StrategySignal::buy(
            confidence,
            format!(
                "lower band touch at {:.4} with RSI {:.0} in a {:.1}%-wide band",
                price, rsi_v, bands.width_pct
            ),
        );
    }
    if price >= bands.upper && rsi_v > 65.0 {
        let confidence = (60 + ((rsi_v - 65.0) as u8).min(25) + volume_bonus).min(100);
        return StrategySignal::sell(
            confidence,
            format!("upper band touch at {:.4} with RSI {:.0}", price, rsi_v),
        );
    }

    StrategySignal::hold(format!("inside bands, RSI {:.0}", rsi_v))
}

// ---------------------------------------------------------------------------
// mean_reversion
// ---------------------------------------------------------------------------

fn mean_reversion(candles: &[Candle]) -> StrategySignal {
    let closes = closes(candles);
    let price = *closes.last().expect("non-empty");

    let (Some(bands), Some(rsi_v)) = (bollinger_standard(&closes), rsi(&closes, 14)) else {
        return StrategySignal::hold("indicators not ready");
    };
    let Some(percent_b) = bands.percent_b(price) else {
        return StrategySignal::hold("bands collapsed, no reversion edge");
    };

    if percent_b <= 0.05 && rsi_v < 30.0 {
        let confidence = (65.0 + (30.0 - rsi_v) + (0.05 - percent_b) * 100.0).min(95.0) as u8;
        return StrategySignal::buy(
            confidence,
            format!("oversold: %B {:.2}, RSI {:.0}", percent_b, rsi_v),
        );
    }
    if percent_b >= 0.95 && rsi_v > 70.0 {
        let confidence = (65.0 + (rsi_v - 70.0) + (percent_b - 0.95) * 100.0).min(95.0) as u8;
        return StrategySignal::sell(
            confidence,
            format!("overbought: %B {:.2}, RSI {:.0}", percent_b, rsi_v),
        );
    }

    StrategySignal::hold(format!("%B {:.2}, RSI {:.0} — no extreme", percent_b, rsi_v))
}

// ---------------------------------------------------------------------------
// breakout
// ---------------------------------------------------------------------------

fn breakout(candles: &[Candle]) -> StrategySignal {
    let lookback = 20;
    let latest = candles.last().expect("non-empty");
    let window = &candles[candles.len() - 1 - lookback..candles.len() - 1];

    let prior_high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let prior_low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let surge = volume_surge_ratio(&volumes(candles), lookback).unwrap_or(0.0);

    if latest.close > prior_high {
        if surge >= 1.5 {
            let confidence = (70.0 + (surge - 1.5) * 10.0).min(95.0) as u8;
            return StrategySignal::buy(
                confidence,
                format!(
                    "breakout above {:.4} on {:.1}x volume",
                    prior_high, surge
                ),
            );
        }
        return StrategySignal::hold(format!(
            "breakout above {:.4} but volume {:.1}x below the 1.5x gate",
            prior_high, surge
        ));
    }

    if latest.close < prior_low {
        return StrategySignal::sell(
            70,
            format!("breakdown below {:.4}", prior_low),
        );
    }

    StrategySignal::hold("price inside the 20-candle range")
}

// ---------------------------------------------------------------------------
// conservative
// ---------------------------------------------------------------------------

fn conservative(candles: &[Candle]) -> StrategySignal {
    let closes = closes(candles);

    let (Some(rsi_v), Some(macd_v), Some(cross_up)) = (
        rsi(&closes, 14),
        macd_standard(&closes),
        ema_cross_above(&closes, 9, 21),
    ) else {
        return StrategySignal::hold("indicators not ready");
    };

    let confirmations_up =
        [rsi_v < 40.0, macd_v.is_bullish(), cross_up].iter().filter(|&&c| c).count();
    let confirmations_down =
        [rsi_v > 70.0, !macd_v.is_bullish(), !cross_up].iter().filter(|&&c| c).count();

    if confirmations_up == 3 {
        return StrategySignal::buy(
            65,
            format!("all confirmations aligned: RSI {:.0}, MACD up, EMA9>EMA21", rsi_v),
        );
    }
    if confirmations_down == 3 {
        return StrategySignal::sell(
            65,
            format!("all confirmations aligned down: RSI {:.0}", rsi_v),
        );
    }

    StrategySignal::hold(format!(
        "only {confirmations_up}/3 bullish confirmations — waiting"
    ))
}

// ---------------------------------------------------------------------------
// simple_profitable
// ---------------------------------------------------------------------------

fn simple_profitable(candles: &[Candle]) -> StrategySignal {
    let closes = closes(candles);
    let Some(rsi_v) = rsi(&closes, 14) else {
        return StrategySignal::hold("RSI not ready");
    };

    if rsi_v < 35.0 {
        let confidence = (50.0 + (35.0 - rsi_v) * 2.0).min(95.0) as u8;
        return StrategySignal::buy(confidence, format!("RSI {:.0} below 35", rsi_v));
    }
    if rsi_v > 65.0 {
        let confidence = (50.0 + (rsi_v - 65.0) * 2.0).min(95.0) as u8;
        return StrategySignal::sell(confidence, format!("RSI {:.0} above 65", rsi_v));
    }

    StrategySignal::hold(format!("RSI {:.0} in the neutral zone", rsi_v))
}

// ---------------------------------------------------------------------------
// enhanced (weighted ensemble)
// ---------------------------------------------------------------------------

/// Weighted ensemble score in [-100, 100]; positive is bullish.
fn ensemble_score(candles: &[Candle]) -> f64 {
    let closes = closes(candles);
    let volumes = volumes(candles);
    let price = *closes.last().expect("non-empty");

    let mut score = 0.0;

    // RSI: oversold pushes up, overbought pushes down. Weight 25.
    if let Some(rsi_v) = rsi(&closes, 14) {
        if rsi_v < 30.0 {
            score += 25.0 * (30.0 - rsi_v) / 30.0 + 12.5;
        } else if rsi_v > 70.0 {
            score -= 25.0 * (rsi_v - 70.0) / 30.0 + 12.5;
        }
    }

    // MACD histogram direction. Weight 25.
    if let Some(macd_v) = macd_standard(&closes) {
        if macd_v.is_strengthening() {
            score += 25.0;
        } else if macd_v.is_bullish() {
            score += 12.5;
        } else {
            score -= 20.0;
        }
    }

    // EMA 9/21 cross. Weight 20.
    match ema_cross_above(&closes, 9, 21) {
        Some(true) => score += 20.0,
        Some(false) => score -= 20.0,
        None => {}
    }

    // Band position. Weight 15.
    if let Some(percent_b) = bollinger_standard(&closes).and_then(|b| b.percent_b(price)) {
        if percent_b < 0.2 {
            score += 15.0;
        } else if percent_b > 0.8 {
            score -= 15.0;
        }
    }

    // Volume confirmation amplifies the direction. Weight 15.
    if let Some(surge) = volume_surge_ratio(&volumes, 20) {
        if surge >= 1.5 {
            score += if score >= 0.0 { 15.0 } else { -15.0 };
        }
    }

    score.clamp(-100.0, 100.0)
}

fn enhanced(candles: &[Candle]) -> StrategySignal {
    let score = ensemble_score(candles);
    let confidence = score.abs().min(100.0) as u8;

    if score >= 35.0 {
        return StrategySignal::buy(confidence, format!("ensemble score {:.0}", score));
    }
    if score <= -35.0 {
        return StrategySignal::sell(confidence, format!("ensemble score {:.0}", score));
    }
    StrategySignal::hold(format!("ensemble score {:.0} inside dead zone", score))
}

// ---------------------------------------------------------------------------
// momentum
// ---------------------------------------------------------------------------

fn momentum(candles: &[Candle]) -> StrategySignal {
    let closes = closes(candles);
    let price = *closes.last().expect("non-empty");

    let (Some(macd_v), Some(ema21)) = (macd_standard(&closes), ema(&closes, 21)) else {
        return StrategySignal::hold("indicators not ready");
    };

    if macd_v.is_strengthening() && price > ema21 {
        let surge = volume_surge_ratio(&volumes(candles), 20).unwrap_or(1.0);
        let confidence = if surge >= 1.3 { 80 } else { 70 };
        return StrategySignal::buy(
            confidence,
            format!(
                "momentum building: histogram {:+.4} and rising, price above EMA21",
                macd_v.histogram
            ),
        );
    }

    if macd_v.histogram < 0.0 && macd_v.histogram_delta < 0.0 && price < ema21 {
        return StrategySignal::sell(
            70,
            format!("momentum fading: histogram {:+.4} and falling", macd_v.histogram),
        );
    }

    StrategySignal::hold("no momentum edge")
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Signal;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        candles_with_volume(closes, 1000.0)
    }

    fn candles_with_volume(closes: &[f64], volume: f64) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time: i as i64 * 900_000,
                close_time: (i as i64 + 1) * 900_000 - 1,
                open: close,
                high: close * 1.005,
                low: close * 0.995,
                close,
                volume,
            })
            .collect()
    }

    fn ctx<'a>(symbol: &'a str, candles: &'a [Candle]) -> StrategyContext<'a> {
        StrategyContext {
            symbol,
            candles,
            position: None,
        }
    }

    /// Long slide into a deep oversold close.
    fn crash_closes() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..70).map(|i| 100.0 - i as f64 * 0.2).collect();
        closes.extend((0..10).map(|i| 86.0 - i as f64 * 2.0));
        closes
    }

    /// Long grind into an overbought top.
    fn melt_up_closes() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..70).map(|i| 100.0 + i as f64 * 0.2).collect();
        closes.extend((0..10).map(|i| 114.0 + i as f64 * 2.0));
        closes
    }

    #[test]
    fn short_window_holds_everywhere() {
        let candles = candles_from_closes(&[1.0; 30]);
        for kind in [
            StrategyKind::Volatile,
            StrategyKind::MeanReversion,
            StrategyKind::Breakout,
            StrategyKind::Conservative,
            StrategyKind::SimpleProfitable,
            StrategyKind::Enhanced,
            StrategyKind::Momentum,
        ] {
            let sig = analyze(kind, &ctx("BTCUSDT", &candles));
            assert_eq!(sig.signal, Signal::Hold, "{kind} should hold on short data");
            assert!(sig.reasoning.contains("insufficient candles"));
        }
    }

    #[test]
    fn simple_profitable_buys_oversold() {
        let candles = candles_from_closes(&crash_closes());
        let sig = analyze(StrategyKind::SimpleProfitable, &ctx("ETHUSDT", &candles));
        assert_eq!(sig.signal, Signal::Buy);
        assert!(sig.confidence >= 50);
    }

    #[test]
    fn simple_profitable_sells_overbought() {
        let candles = candles_from_closes(&melt_up_closes());
        let sig = analyze(StrategyKind::SimpleProfitable, &ctx("ETHUSDT", &candles));
        assert_eq!(sig.signal, Signal::Sell);
    }

    #[test]
    fn simple_profitable_holds_neutral_market() {
        // Alternating small moves keep RSI near 50.
        let closes: Vec<f64> = (0..80)
            .map(|i| 100.0 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let candles = candles_from_closes(&closes);
        let sig = analyze(StrategyKind::SimpleProfitable, &ctx("ETHUSDT", &candles));
        assert_eq!(sig.signal, Signal::Hold);
    }

    #[test]
    fn breakout_requires_volume() {
        // Range then a breakout candle on flat volume: held back by the gate.
        let mut closes = vec![100.0; 79];
        closes.push(106.0);
        let candles = candles_with_volume(&closes, 1000.0);
        let sig = analyze(StrategyKind::Breakout, &ctx("SOLUSDT", &candles));
        assert_eq!(sig.signal, Signal::Hold);
        assert!(sig.reasoning.contains("volume"));
    }

    #[test]
    fn breakout_fires_with_volume_surge() {
        let mut candles = candles_with_volume(&vec![100.0; 79], 1000.0);
        candles.push(Candle {
            open_time: 80 * 900_000,
            close_time: 81 * 900_000 - 1,
            open: 100.0,
            high: 106.5,
            low: 100.0,
            close: 106.0,
            volume: 2500.0,
        });
        let sig = analyze(StrategyKind::Breakout, &ctx("SOLUSDT", &candles));
        assert_eq!(sig.signal, Signal::Buy);
        assert!(sig.confidence >= 70);
    }

    #[test]
    fn mean_reversion_buys_deep_excursion() {
        let candles = candles_from_closes(&crash_closes());
        let sig = analyze(StrategyKind::MeanReversion, &ctx("ADAUSDT", &candles));
        assert_eq!(sig.signal, Signal::Buy);
    }

    #[test]
    fn conservative_needs_all_three_confirmations() {
        // A crash makes RSI oversold but MACD and the EMA cross stay bearish:
        // conservative must not buy on one confirmation.
        let candles = candles_from_closes(&crash_closes());
        let sig = analyze(StrategyKind::Conservative, &ctx("BTCUSDT", &candles));
        assert_ne!(sig.signal, Signal::Buy);
    }

    #[test]
    fn momentum_buys_acceleration() {
        // Decline, then an accelerating rally: histogram rising, price > EMA21.
        let mut closes: Vec<f64> = (0..50).map(|i| 120.0 - i as f64 * 0.5).collect();
        closes.extend((0..30).map(|i| 95.0 + (i as f64).powf(1.4)));
        let candles = candles_from_closes(&closes);
        let sig = analyze(StrategyKind::Momentum, &ctx("BNBUSDT", &candles));
        assert_eq!(sig.signal, Signal::Buy);
    }

    #[test]
    fn enhanced_sells_weak_market() {
        let candles = candles_from_closes(&melt_up_closes());
        // A parabolic top reads overbought on RSI and band position; the
        // ensemble may still ride momentum, but it must produce a decision,
        // not an error.
        let sig = analyze(StrategyKind::Enhanced, &ctx("ETHUSDT", &candles));
        assert!(sig.confidence <= 100);
    }

    #[test]
    fn technical_read_matches_trend() {
        let bear = candles_from_closes(&crash_closes());
        assert_eq!(technical_read(&bear), TechnicalRead::Bearish);

        let flat: Vec<f64> = (0..80)
            .map(|i| 100.0 + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        let neutral = candles_from_closes(&flat);
        assert_eq!(technical_read(&neutral), TechnicalRead::Neutral);
    }

    #[test]
    fn news_kind_is_rejected() {
        let candles = candles_from_closes(&crash_closes());
        let sig = analyze(StrategyKind::TickerNews, &ctx("BTCUSDT", &candles));
        assert_eq!(sig.signal, Signal::Hold);
    }
}
