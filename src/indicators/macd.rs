// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   macd_line   = EMA(close, fast) - EMA(close, slow)
//   signal_line = EMA(macd_line, signal)
//   histogram   = macd_line - signal_line
//
// Standard parameters are (12, 26, 9). A positive, rising histogram reads as
// bullish momentum; a negative, falling one as bearish.
// =============================================================================

use crate::indicators::ema::ema_series;

/// Latest MACD reading.
#[derive(Debug, Clone, Copy)]
pub struct MacdResult {
    pub macd_line: f64,
    pub signal_line: f64,
    pub histogram: f64,
    /// Change of the histogram versus the previous bar (momentum direction).
    pub histogram_delta: f64,
}

impl MacdResult {
    /// Bullish: MACD above its signal line.
    pub fn is_bullish(&self) -> bool {
        self.histogram > 0.0
    }

    /// Momentum building: histogram positive and still expanding.
    pub fn is_strengthening(&self) -> bool {
        self.histogram > 0.0 && self.histogram_delta > 0.0
    }
}

/// Compute the latest MACD with the given periods. `None` when the series is
/// too short (needs at least `slow + signal` closes).
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<MacdResult> {
    if fast == 0 || slow == 0 || signal == 0 || fast >= slow {
        return None;
    }
    if closes.len() < slow + signal {
        return None;
    }

    let fast_series = ema_series(closes, fast);
    let slow_series = ema_series(closes, slow);
    if slow_series.is_empty() {
        return None;
    }

    // Align the two EMA series on their tails; the slow series is shorter.
    let offset = fast_series.len() - slow_series.len();
    let macd_series: Vec<f64> = slow_series
        .iter()
        .enumerate()
        .map(|(i, &s)| fast_series[i + offset] - s)
        .collect();

    let signal_series = ema_series(&macd_series, signal);
    let signal_line = *signal_series.last()?;
    let macd_line = *macd_series.last()?;
    let histogram = macd_line - signal_line;

    // Previous histogram for the momentum delta.
    let histogram_delta = if macd_series.len() >= 2 && signal_series.len() >= 2 {
        let prev = macd_series[macd_series.len() - 2] - signal_series[signal_series.len() - 2];
        histogram - prev
    } else {
        0.0
    };

    if !histogram.is_finite() {
        return None;
    }

    Some(MacdResult {
        macd_line,
        signal_line,
        histogram,
        histogram_delta,
    })
}

/// MACD with the conventional (12, 26, 9) parameters.
pub fn macd_standard(closes: &[f64]) -> Option<MacdResult> {
    macd(closes, 12, 26, 9)
}
