// =============================================================================
// Single-flight — coalesce concurrent refreshes of the same cache key
// =============================================================================
//
// Callers that want to refresh the same key at the same time serialize on a
// per-key async mutex. The first caller through performs the fetch; the
// others, once the guard is released, re-check the cache and find it fresh.
//
// The key map itself is guarded by a parking_lot mutex held only long enough
// to clone the per-key Arc; the async lock is never awaited while the map
// lock is held.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Per-key async locks handed out to coalescing callers.
pub struct KeyedFlight {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedFlight {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Return the async lock for `key`, creating it on first use.
    ///
    /// Usage: clone the lock, `lock().await`, re-check the cache under the
    /// guard, fetch only if still stale.
    pub fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Number of keys currently tracked. Keys are kept for the process
    /// lifetime; the universe of tickers is small.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeyedFlight {
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
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn same_key_returns_same_lock() {
        let flight = KeyedFlight::new();
        let a = flight.lock_for("BTC");
        let b = flight.lock_for("BTC");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(flight.len(), 1);
    }

    #[test]
    fn distinct_keys_get_distinct_locks() {
        let flight = KeyedFlight::new();
        let a = flight.lock_for("BTC");
        let b = flight.lock_for("ETH");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(flight.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_coalesce_to_one_fetch() {
        let flight = Arc::new(KeyedFlight::new());
        let fetches = Arc::new(AtomicU32::new(0));
        // "Cache" holding the fetched value.
        let cache: Arc<parking_lot::RwLock<Option<u32>>> =
            Arc::new(parking_lot::RwLock::new(None));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = flight.clone();
            let fetches = fetches.clone();
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let lock = flight.lock_for("SOL");
                let _guard = lock.lock().await;
                // Re-check under the guard: only the first caller fetches.
                if cache.read().is_none() {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    *cache.write() = Some(99);
                }
                *cache.read()
            }));
        }

        for h in handles {
            assert_eq!(h.await.unwrap(), Some(99));
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
