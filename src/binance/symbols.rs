// =============================================================================
// Symbol Cache — 24-hour TTL cache of per-symbol trading rules
// =============================================================================
//
// Every worker and the orphan reconciler ask "is ASSETUSDT tradeable and what
// are its lot step / min notional?" many times a day. exchangeInfo is a
// heavyweight endpoint, so answers are cached for 24 h and refreshes are
// coalesced per symbol.
//
// A refresh is deferrable work: near the exchange weight ceiling a stale
// entry is served instead, and at the hard limit the refresh is refused.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use parking_lot::RwLock;
use tracing::debug;

use crate::binance::client::{BinanceClient, SymbolRules};
use crate::singleflight::KeyedFlight;

const SYMBOL_TTL: Duration = Duration::from_secs(24 * 3600);

struct CachedRules {
    rules: SymbolRules,
    cached_at: Instant,
}

/// Shared, TTL-cached view of exchange symbol rules.
pub struct SymbolCache {
    client: Arc<BinanceClient>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedRules>>,
    flight: KeyedFlight,
}

impl SymbolCache {
    pub fn new(client: Arc<BinanceClient>) -> Self {
        Self::with_ttl(client, SYMBOL_TTL)
    }

    pub fn with_ttl(client: Arc<BinanceClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            entries: RwLock::new(HashMap::new()),
            flight: KeyedFlight::new(),
        }
    }

    /// Rules for `symbol`, fetched at most once per TTL window.
    pub async fn get(&self, symbol: &str) -> Result<SymbolRules> {
        let symbol = symbol.to_uppercase();

        if let Some(rules) = self.entry(&symbol, false) {
            return Ok(rules);
        }

        // Near the weight ceiling a refresh can wait: serve what we have.
        if self.client.rate_limit.should_defer_refresh() {
            if let Some(rules) = self.entry(&symbol, true) {
                debug!(symbol = %symbol, "request weight high, serving stale symbol rules");
                return Ok(rules);
            }
            if self.client.rate_limit.at_hard_limit() {
                bail!("request weight at hard limit, symbol refresh for {symbol} refused");
            }
        }

        // Coalesce concurrent refreshes of the same symbol.
        let lock = self.flight.lock_for(&symbol);
        let _guard = lock.lock().await;

        if let Some(rules) = self.entry(&symbol, false) {
            return Ok(rules);
        }

        let rules = self.client.get_symbol_info(&symbol).await?;
        debug!(
            symbol = %symbol,
            tradeable = rules.tradeable,
            lot_step = rules.lot_step,
            min_notional = rules.min_notional,
            "symbol rules cached"
        );
        self.entries.write().insert(
            symbol,
            CachedRules {
                rules,
                cached_at: Instant::now(),
            },
        );
        Ok(rules)
    }

    /// True when `symbol` exists and is currently trading.
    pub async fn is_tradeable(&self, symbol: &str) -> bool {
        match self.get(symbol).await {
            Ok(rules) => rules.tradeable,
            Err(_) => false,
        }
    }

    fn entry(&self, symbol: &str, allow_stale: bool) -> Option<SymbolRules> {
        let entries = self.entries.read();
        let entry = entries.get(symbol)?;
        if allow_stale || entry.cached_at.elapsed() < self.ttl {
            Some(entry.rules)
        } else {
            None
        }
    }

    /// Inject an entry directly (tests and boot-time warm-up).
    pub fn prime(&self, symbol: &str, rules: SymbolRules) {
        self.entries.write().insert(
            symbol.to_uppercase(),
            CachedRules {
                rules,
                cached_at: Instant::now(),
            },
        );
    }
}

impl std::fmt::Debug for SymbolCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolCache")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> SymbolCache {
        SymbolCache::new(Arc::new(BinanceClient::new("", "", true)))
    }

    #[tokio::test]
    async fn primed_entry_served_without_network() {
        let cache = cache();
        cache.prime(
            "solusdt",
            SymbolRules {
                tradeable: true,
                lot_step: 0.001,
                min_notional: 5.0,
            },
        );

        // Uppercasing is applied on both prime and get.
        let rules = cache.get("SOLUSDT").await.unwrap();
        assert!(rules.tradeable);
        assert!((rules.lot_step - 0.001).abs() < 1e-12);
        assert!(cache.is_tradeable("solUsdt").await);
    }

    #[tokio::test]
    async fn unknown_symbol_not_tradeable_when_fetch_fails() {
        // No primed entry and no reachable exchange: is_tradeable degrades
        // to false rather than erroring.
        let cache = cache();
        assert!(!cache.is_tradeable("NOPEUSDT").await);
    }

    fn hot_client(weight: &str) -> Arc<BinanceClient> {
        let client = Arc::new(BinanceClient::new("", "", true));
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("X-MBX-USED-WEIGHT-1M", weight.parse().unwrap());
        client.rate_limit.observe_headers(&headers);
        client
    }

    #[tokio::test]
    async fn hot_gauge_serves_stale_rules_instead_of_refreshing() {
        // Soft limit crossed: the expired entry is served rather than spent
        // on another exchangeInfo request.
        let cache = SymbolCache::with_ttl(hot_client("950"), Duration::from_millis(0));
        cache.prime(
            "ADAUSDT",
            SymbolRules {
                tradeable: true,
                lot_step: 0.1,
                min_notional: 5.0,
            },
        );

        let rules = cache.get("ADAUSDT").await.unwrap();
        assert!(rules.tradeable);
        assert!((rules.lot_step - 0.1).abs() < 1e-12);
    }

    #[tokio::test]
    async fn hard_limit_refuses_refresh_with_nothing_cached() {
        let cache = SymbolCache::with_ttl(hot_client("1005"), Duration::from_millis(0));
        let err = cache.get("BTCUSDT").await.unwrap_err();
        assert!(err.to_string().contains("hard limit"));
    }
}
