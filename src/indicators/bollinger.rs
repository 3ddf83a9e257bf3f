// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Middle band = SMA(period); upper/lower = middle ± k·σ. Width is the
// normalised band distance `(upper - lower) / middle * 100`, used by the
// volatility-seeking strategies.
// =============================================================================

/// Bands computed over the trailing window.
#[derive(Debug, Clone, Copy)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub width_pct: f64,
}

impl Bands {
    /// Position of `price` inside the bands: 0.0 at the lower band, 1.0 at
    /// the upper band; may leave [0, 1] when price escapes the bands.
    pub fn percent_b(&self, price: f64) -> Option<f64> {
        let span = self.upper - self.lower;
        if span <= 0.0 {
            return None;
        }
        Some((price - self.lower) / span)
    }
}

/// Bollinger bands over the last `period` closes with `num_std` deviations.
/// `None` with insufficient data or a zero middle band.
pub fn bollinger(closes: &[f64], period: usize, num_std: f64) -> Option<Bands> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    if middle == 0.0 {
        return None;
    }

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;
    let width_pct = (upper - lower) / middle * 100.0;

    width_pct.is_finite().then_some(Bands {
        upper,
        middle,
        lower,
        width_pct,
    })
}

/// Bands with the conventional (20, 2.0) parameters.
pub fn bollinger_standard(closes: &[f64]) -> Option<Bands> {
    bollinger(closes, 20, 2.0)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_series_collapses_bands() {
        let closes = vec![50.0; 25];
        let bands = bollinger_standard(&closes).unwrap();
        assert!((bands.upper - 50.0).abs() < 1e-9);
        assert!((bands.lower - 50.0).abs() < 1e-9);
        assert!(bands.width_pct.abs() < 1e-9);
        // Collapsed bands have no meaningful %B.
        assert!(bands.percent_b(50.0).is_none());
    }

    #[test]
    fn symmetric_bands_around_sma() {
        let closes = vec![
            10.0, 12.0, 11.0, 13.0, 12.0, 14.0, 13.0, 15.0, 14.0, 16.0, 15.0, 17.0, 16.0, 18.0,
            17.0, 19.0, 18.0, 20.0, 19.0, 21.0,
        ];
        let bands = bollinger(&closes, 20, 2.0).unwrap();
        assert!((bands.upper - bands.middle) - (bands.middle - bands.lower) < 1e-9);
        assert!(bands.upper > bands.middle && bands.middle > bands.lower);
    }

    #[test]
    fn percent_b_is_zero_at_lower_one_at_upper() {
        let closes = vec![
            10.0, 12.0, 11.0, 13.0, 12.0, 14.0, 13.0, 15.0, 14.0, 16.0, 15.0, 17.0, 16.0, 18.0,
            17.0, 19.0, 18.0, 20.0, 19.0, 21.0,
        ];
        let bands = bollinger(&closes, 20, 2.0).unwrap();
        assert!(bands.percent_b(bands.lower).unwrap().abs() < 1e-9);
        assert!((bands.percent_b(bands.upper).unwrap() - 1.0).abs() < 1e-9);
        assert!(bands.percent_b(bands.upper + 1.0).unwrap() > 1.0);
    }

    #[test]
    fn insufficient_data_is_none() {
        assert!(bollinger(&[1.0; 19], 20, 2.0).is_none());
        assert!(bollinger(&[1.0; 20], 0, 2.0).is_none());
    }
}
