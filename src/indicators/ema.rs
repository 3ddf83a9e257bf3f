// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The first value is seeded with the SMA of the first `period` closes.
// =============================================================================

/// EMA series for `closes` over `period`. Empty when the input is too short
/// or the period is zero. Output aligns to closes starting at `period - 1`.
pub fn ema_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return Vec::new();
    }

    let mut series = Vec::with_capacity(closes.len() - period + 1);
    series.push(seed);

    let mut prev = seed;
    for &close in &closes[period..] {
        let next = close * multiplier + prev * (1.0 - multiplier);
        if !next.is_finite() {
            break;
        }
        series.push(next);
        prev = next;
    }
    series
}

/// Latest EMA value, or `None` with insufficient data.
pub fn ema(closes: &[f64], period: usize) -> Option<f64> {
    ema_series(closes, period).last().copied()
}

/// Fast/slow EMA crossover state: `Some(true)` when the fast EMA is above the
/// slow one, `Some(false)` when below, `None` with insufficient data or a
/// dead-equal cross.
pub fn ema_cross_above(closes: &[f64], fast: usize, slow: usize) -> Option<bool> {
    let fast_v = ema(closes, fast)?;
    let slow_v = ema(closes, slow)?;
    if fast_v == slow_v {
        return None;
    }
    Some(fast_v > slow_v)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_sma_of_first_window() {
        let closes = vec![1.0, 2.0, 3.0, 4.0];
        let series = ema_series(&closes, 3);
        assert!((series[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn constant_series_stays_constant() {
        let closes = vec![42.0; 30];
        for v in ema_series(&closes, 10) {
            assert!((v - 42.0).abs() < 1e-9);
        }
    }

    #[test]
    fn ema_tracks_rising_prices_from_below() {
        let closes: Vec<f64> = (1..=50).map(f64::from).collect();
        let latest = ema(&closes, 10).unwrap();
        // EMA lags a rising series but must sit close below the last price.
        assert!(latest < 50.0);
        assert!(latest > 44.0);
    }

    #[test]
    fn insufficient_data_and_zero_period() {
        assert!(ema(&[1.0, 2.0], 3).is_none());
        assert!(ema_series(&[1.0, 2.0, 3.0], 0).is_empty());
    }

    #[test]
    fn cross_detection() {
        // Rising market: fast EMA above slow EMA.
        let rising: Vec<f64> = (1..=60).map(f64::from).collect();
        assert_eq!(ema_cross_above(&rising, 9, 21), Some(true));

        // Falling market: fast below slow.
        let falling: Vec<f64> = (1..=60).rev().map(f64::from).collect();
        assert_eq!(ema_cross_above(&falling, 9, 21), Some(false));

        // Flat market: dead-equal, no side.
        let flat = vec![10.0; 60];
        assert_eq!(ema_cross_above(&flat, 9, 21), None);
    }
}
