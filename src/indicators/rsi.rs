// =============================================================================
// Relative Strength Index (RSI) — Wilder's smoothing
// =============================================================================
//
// Seed average gain/loss with the SMA of the first `period` deltas, then
// apply Wilder's exponential smoothing:
//   avg_gain = (prev_avg_gain * (period - 1) + gain) / period
//   avg_loss = (prev_avg_loss * (period - 1) + loss) / period
//   RSI      = 100 - 100 / (1 + avg_gain / avg_loss)
//
// Thresholds used by the strategies: > 70 overbought, < 30 oversold.
// =============================================================================

/// Latest RSI value for `closes` over `period`, or `None` when there is not
/// enough data (needs `period + 1` closes).
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    rsi_series(closes, period).last().copied()
}

/// Full RSI series; one value per close starting at index `period`.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for &d in &deltas[..period] {
        if d > 0.0 {
            avg_gain += d;
        } else {
            avg_loss += -d;
        }
    }
    let period_f = period as f64;
    avg_gain /= period_f;
    avg_loss /= period_f;

    let mut series = Vec::with_capacity(deltas.len() - period + 1);
    match value_from(avg_gain, avg_loss) {
        Some(v) => series.push(v),
        None => return Vec::new(),
    }

    for &d in &deltas[period..] {
        let gain = d.max(0.0);
        let loss = (-d).max(0.0);
        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;
        match value_from(avg_gain, avg_loss) {
            Some(v) => series.push(v),
            None => break,
        }
    }

    series
}

fn value_from(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_gain == 0.0 && avg_loss == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };
    rsi.is_finite().then_some(rsi)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_period_plus_one_closes() {
        let closes: Vec<f64> = (1..=14).map(f64::from).collect();
        assert!(rsi(&closes, 14).is_none());
        let closes: Vec<f64> = (1..=15).map(f64::from).collect();
        assert!(rsi(&closes, 14).is_some());
    }

    #[test]
    fn monotonic_rise_saturates_at_100() {
        let closes: Vec<f64> = (1..=40).map(f64::from).collect();
        let v = rsi(&closes, 14).unwrap();
        assert!((v - 100.0).abs() < 1e-9);
    }

    #[test]
    fn monotonic_fall_saturates_at_0() {
        let closes: Vec<f64> = (1..=40).rev().map(f64::from).collect();
        let v = rsi(&closes, 14).unwrap();
        assert!(v.abs() < 1e-9);
    }

    #[test]
    fn flat_series_is_neutral() {
        let closes = vec![250.0; 40];
        let v = rsi(&closes, 14).unwrap();
        assert!((v - 50.0).abs() < 1e-9);
    }

    #[test]
    fn bounded_on_real_shaped_data() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            44.18, 44.22, 44.57, 43.42, 42.66, 43.13, 44.01, 44.95,
        ];
        for v in rsi_series(&closes, 14) {
            assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
        }
    }

    #[test]
    fn period_zero_is_empty() {
        assert!(rsi_series(&[1.0, 2.0, 3.0], 0).is_empty());
    }
}
