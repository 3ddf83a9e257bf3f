// =============================================================================
// Rate-Limit Gauge — tracks Binance request weight to stay clear of 429s
// =============================================================================
//
// Binance allows 1200 request-weight per minute; we hold ourselves below 1000
// and start refusing cache refreshes at 900. The gauge is fed from the
// `X-MBX-USED-WEIGHT-1M` header on every response and read lock-free by all
// workers.
// =============================================================================

use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;
use tracing::{debug, warn};

/// Weight at which non-critical requests (cache refreshes) are refused.
const WEIGHT_SOFT_LIMIT: u32 = 900;
/// Weight at which every further request is refused until the window resets.
const WEIGHT_HARD_LIMIT: u32 = 1000;

/// Lock-free gauge of the exchange's rolling one-minute request weight.
pub struct RateLimitGauge {
    used_weight_1m: AtomicU32,
}

/// Snapshot for the dashboard overview.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitSnapshot {
    pub used_weight_1m: u32,
    pub soft_limit: u32,
    pub hard_limit: u32,
}

impl RateLimitGauge {
    pub fn new() -> Self {
        Self {
            used_weight_1m: AtomicU32::new(0),
        }
    }

    /// Feed the gauge from a Binance response header map.
    pub fn observe_headers(&self, headers: &reqwest::header::HeaderMap) {
        let Some(weight) = headers
            .get("X-MBX-USED-WEIGHT-1M")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            return;
        };

        let prev = self.used_weight_1m.swap(weight, Ordering::Relaxed);
        if weight >= WEIGHT_SOFT_LIMIT && prev < WEIGHT_SOFT_LIMIT {
            warn!(used_weight = weight, "exchange request weight crossed soft limit");
        } else {
            debug!(used_weight = weight, "exchange request weight updated");
        }
    }

    /// True when a non-critical request (candle/symbol cache refresh) should
    /// be skipped this tick. Order placement and sells are never throttled.
    pub fn should_defer_refresh(&self) -> bool {
        self.used_weight_1m.load(Ordering::Relaxed) >= WEIGHT_SOFT_LIMIT
    }

    /// True when even critical requests must wait for the window to reset.
    pub fn at_hard_limit(&self) -> bool {
        self.used_weight_1m.load(Ordering::Relaxed) >= WEIGHT_HARD_LIMIT
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            used_weight_1m: self.used_weight_1m.load(Ordering::Relaxed),
            soft_limit: WEIGHT_SOFT_LIMIT,
            hard_limit: WEIGHT_HARD_LIMIT,
        }
    }

    #[cfg(test)]
    fn set_weight(&self, w: u32) {
        self.used_weight_1m.store(w, Ordering::Relaxed);
    }
}

impl Default for RateLimitGauge {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_gauge_allows_everything() {
        let gauge = RateLimitGauge::new();
        assert!(!gauge.should_defer_refresh());
        assert!(!gauge.at_hard_limit());
    }

    #[test]
    fn soft_limit_defers_refreshes_only() {
        let gauge = RateLimitGauge::new();
        gauge.set_weight(WEIGHT_SOFT_LIMIT);
        assert!(gauge.should_defer_refresh());
        assert!(!gauge.at_hard_limit());
    }

    #[test]
    fn hard_limit_blocks_all() {
        let gauge = RateLimitGauge::new();
        gauge.set_weight(WEIGHT_HARD_LIMIT + 5);
        assert!(gauge.should_defer_refresh());
        assert!(gauge.at_hard_limit());
    }

    #[test]
    fn observe_headers_parses_weight() {
        let gauge = RateLimitGauge::new();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("X-MBX-USED-WEIGHT-1M", "123".parse().unwrap());
        gauge.observe_headers(&headers);
        assert_eq!(gauge.snapshot().used_weight_1m, 123);
    }

    #[test]
    fn observe_headers_ignores_garbage() {
        let gauge = RateLimitGauge::new();
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("X-MBX-USED-WEIGHT-1M", "abc".parse().unwrap());
        gauge.observe_headers(&headers);
        assert_eq!(gauge.snapshot().used_weight_1m, 0);
    }
}
