// =============================================================================
// Market Data — OHLCV candles with a shared, TTL-bounded REST cache
// =============================================================================
//
// Workers pull their candle windows through this cache instead of hitting the
// exchange directly: many bots watching the same pair share one fetch per TTL
// window (15 min by default, matching the tick interval), and concurrent
// refreshes of the same (symbol, interval) are coalesced.
//
// Refreshes are deferrable work: near the exchange weight ceiling a stale
// window is served instead of refetching, and at the hard limit the refresh
// is refused outright.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binance::client::BinanceClient;
use crate::singleflight::KeyedFlight;

/// A single OHLCV candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Composite key identifying a candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CandleKey {
    pub symbol: String,
    pub interval: String,
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}

struct CachedWindow {
    fetched_at: Instant,
    candles: Vec<Candle>,
}

/// Default TTL for a cached candle window.
pub const CANDLE_TTL: Duration = Duration::from_secs(15 * 60);

/// Shared candle cache over the exchange REST klines endpoint.
pub struct CandleCache {
    client: Arc<BinanceClient>,
    ttl: Duration,
    windows: RwLock<HashMap<CandleKey, CachedWindow>>,
    flight: KeyedFlight,
}

impl CandleCache {
    pub fn new(client: Arc<BinanceClient>) -> Self {
        Self::with_ttl(client, CANDLE_TTL)
    }

    pub fn with_ttl(client: Arc<BinanceClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            windows: RwLock::new(HashMap::new()),
            flight: KeyedFlight::new(),
        }
    }

    /// The most recent `limit` candles for `(symbol, interval)`, served from
    /// cache when fresh.
    pub async fn get(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let key = CandleKey {
            symbol: symbol.to_uppercase(),
            interval: interval.to_string(),
        };

        if let Some(candles) = self.window(&key, limit as usize, false) {
            return Ok(candles);
        }

        // Near the weight ceiling a refresh can wait: serve what we have.
        if self.client.rate_limit.should_defer_refresh() {
            if let Some(candles) = self.window(&key, limit as usize, true) {
                debug!(key = %key, "request weight high, serving stale candle window");
                return Ok(candles);
            }
            if self.client.rate_limit.at_hard_limit() {
                bail!("request weight at hard limit, candle refresh for {key} refused");
            }
        }

        let lock = self.flight.lock_for(&key.to_string());
        let _guard = lock.lock().await;

        if let Some(candles) = self.window(&key, limit as usize, false) {
            return Ok(candles);
        }

        let candles = self
            .client
            .get_klines(&key.symbol, &key.interval, limit)
            .await?;
        debug!(key = %key, count = candles.len(), "candle window refreshed");

        self.windows.write().insert(
            key,
            CachedWindow {
                fetched_at: Instant::now(),
                candles: candles.clone(),
            },
        );
        Ok(candles)
    }

    fn window(&self, key: &CandleKey, limit: usize, allow_stale: bool) -> Option<Vec<Candle>> {
        let windows = self.windows.read();
        let window = windows.get(key)?;
        if window.candles.len() < limit {
            return None;
        }
        if !allow_stale && window.fetched_at.elapsed() >= self.ttl {
            return None;
        }
        let start = window.candles.len() - limit;
        Some(window.candles[start..].to_vec())
    }

    /// Inject a window directly (tests and warm-up).
    pub fn prime(&self, symbol: &str, interval: &str, candles: Vec<Candle>) {
        let key = CandleKey {
            symbol: symbol.to_uppercase(),
            interval: interval.to_string(),
        };
        self.windows.write().insert(
            key,
            CachedWindow {
                fetched_at: Instant::now(),
                candles,
            },
        );
    }
}

impl std::fmt::Debug for CandleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleCache")
            .field("windows", &self.windows.read().len())
            .field("ttl_secs", &self.ttl.as_secs())
            .finish()
    }
}
