// =============================================================================
// Shared News Cache — per-ticker TTL cache with a strict daily call budget
// =============================================================================
//
// All workers read news through this cache. One paid fetch serves every bot
// interested in the same ticker for the whole TTL window (8 h by default),
// and concurrent refreshes coalesce into a single underlying call.
//
// Budget policy: the paid provider is consulted only while the persisted
// daily counter is under budget. Once exhausted, stale entries are served
// (marked so callers can log the age) and the budget-free fallbacks may be
// used. The cache snapshot is written to disk on every successful fetch so a
// restart never re-spends the budget.
// =============================================================================

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::counters::ApiCounters;
use crate::news::providers::NewsProviders;
use crate::news::NewsArticle;
use crate::singleflight::KeyedFlight;
use crate::storage;

/// Cache key used for the "all crypto" feed.
pub const GLOBAL_KEY: &str = "GLOBAL";

/// One persisted cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedNews {
    pub fetched_at: DateTime<Utc>,
    pub articles: Vec<NewsArticle>,
}

/// What a caller gets back: articles plus staleness metadata.
#[derive(Debug, Clone)]
pub struct NewsFetch {
    pub articles: Vec<NewsArticle>,
    /// True when the entry is older than the TTL (budget exhausted or all
    /// fetch paths failed).
    pub stale: bool,
    pub age: Duration,
}

impl NewsFetch {
    fn empty() -> Self {
        Self {
            articles: Vec::new(),
            stale: true,
            age: Duration::ZERO,
        }
    }

    pub fn age_hours(&self) -> u64 {
        self.age.as_secs() / 3600
    }
}

/// Process-wide news cache shared by all workers.
pub struct SharedNewsCache {
    providers: NewsProviders,
    counters: Arc<ApiCounters>,
    ttl: Duration,
    daily_budget: u32,
    snapshot_path: PathBuf,
    entries: RwLock<HashMap<String, CachedNews>>,
    flight: KeyedFlight,
}

impl SharedNewsCache {
    /// Build the cache, restoring any persisted snapshot from `data_dir`.
    pub fn new(
        providers: NewsProviders,
        counters: Arc<ApiCounters>,
        ttl: Duration,
        daily_budget: u32,
        data_dir: &std::path::Path,
    ) -> Self {
        let snapshot_path = storage::news_cache_path(data_dir);

        let entries = match storage::read_json::<HashMap<String, CachedNews>>(&snapshot_path) {
            Ok(Some(map)) => {
                info!(entries = map.len(), "news cache snapshot restored");
                map
            }
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(error = %e, "failed to load news cache snapshot, starting empty");
                HashMap::new()
            }
        };

        Self {
            providers,
            counters,
            ttl,
            daily_budget,
            snapshot_path,
            entries: RwLock::new(entries),
            flight: KeyedFlight::new(),
        }
    }

    /// Latest articles for `ticker` (uppercased key) under the TTL/budget
    /// policy. Never returns an error: on total failure the result is an
    /// empty, stale fetch.
    pub async fn get_for_ticker(&self, ticker: &str) -> NewsFetch {
        self.get(&ticker.to_uppercase()).await
    }

    /// Latest articles across all of crypto (the `GLOBAL` key).
    pub async fn get_global(&self) -> NewsFetch {
        self.get(GLOBAL_KEY).await
    }

    async fn get(&self, key: &str) -> NewsFetch {
        if let Some(fetch) = self.cached(key, false) {
            return fetch;
        }

        // Coalesce refreshes of the same key.
        let lock = self.flight.lock_for(key);
        let _guard = lock.lock().await;

        if let Some(fetch) = self.cached(key, false) {
            return fetch;
        }

        let ticker = if key == GLOBAL_KEY { None } else { Some(key) };

        // --- Paid provider, subject to the daily budget -------------------
        if self.providers.has_paid_provider() {
            if self.counters.news_budget_available(self.daily_budget) {
                match self.providers.fetch_cryptonews(ticker).await {
                    Ok(articles) => {
                        if let Err(e) = self.counters.record_news_call() {
                            warn!(error = %e, "failed to persist news counter");
                        }
                        self.store(key, articles);
                        return self.cached(key, true).unwrap_or_else(NewsFetch::empty);
                    }
                    Err(e) => {
                        // Transient provider failure still spends no budget.
                        warn!(key, error = %e, "paid news fetch failed, trying fallbacks");
                    }
                }
            } else {
                warn!(
                    key,
                    budget = self.daily_budget,
                    spent = self.counters.news_calls_today(),
                    "news_budget_exhausted — serving cache or free fallback"
                );
                if let Some(fetch) = self.cached(key, true) {
                    return fetch;
                }
            }
        }

        // --- Budget-free fallbacks ----------------------------------------
        if self.providers.has_newsapi() {
            if let Ok(articles) = self.providers.fetch_newsapi(ticker).await {
                self.store(key, articles);
                return self.cached(key, true).unwrap_or_else(NewsFetch::empty);
            }
        }

        match self.providers.fetch_coindesk_rss().await {
            Ok(articles) => {
                self.store(key, articles);
                self.cached(key, true).unwrap_or_else(NewsFetch::empty)
            }
            Err(e) => {
                warn!(key, error = %e, "all news sources failed, serving stale cache");
                self.cached(key, true).unwrap_or_else(NewsFetch::empty)
            }
        }
    }

    /// Read the cache. With `allow_stale = false` only fresh entries are
    /// returned; otherwise any entry is, marked with its staleness.
    fn cached(&self, key: &str, allow_stale: bool) -> Option<NewsFetch> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        let age = (Utc::now() - entry.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let stale = age >= self.ttl;
        if stale && !allow_stale {
            return None;
        }
        Some(NewsFetch {
            articles: entry.articles.clone(),
            stale,
            age,
        })
    }

    fn store(&self, key: &str, articles: Vec<NewsArticle>) {
        debug!(key, count = articles.len(), "news cache entry stored");
        let snapshot = {
            let mut entries = self.entries.write();
            entries.insert(
                key.to_string(),
                CachedNews {
                    fetched_at: Utc::now(),
                    articles,
                },
            );
            entries.clone()
        };
        // Persist so a restart does not re-spend the daily budget.
        if let Err(e) = storage::write_json_atomic(&self.snapshot_path, &snapshot) {
            warn!(error = %e, "failed to persist news cache snapshot");
        }
    }

    /// Flush the current snapshot to disk (shutdown path).
    pub fn flush(&self) -> anyhow::Result<()> {
        let snapshot = self.entries.read().clone();
        storage::write_json_atomic(&self.snapshot_path, &snapshot)
    }

    /// Inject an entry with a fixed age (tests).
    #[cfg(test)]
    pub fn prime_with_age(&self, key: &str, articles: Vec<NewsArticle>, age: Duration) {
        self.entries.write().insert(
            key.to_uppercase(),
            CachedNews {
                fetched_at: Utc::now() - chrono::Duration::from_std(age).unwrap(),
                articles,
            },
        );
    }
}

impl std::fmt::Debug for SharedNewsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedNewsCache")
            .field("entries", &self.entries.read().len())
            .field("ttl_secs", &self.ttl.as_secs())
            .field("daily_budget", &self.daily_budget)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn article(title: &str) -> NewsArticle {
        NewsArticle {
            title: title.to_string(),
            text: String::new(),
            source: "test".into(),
            url: String::new(),
            published_at: String::new(),
            tickers: vec!["SOL".into()],
        }
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("flotilla-news-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cache_with_budget(dir: &std::path::Path, budget: u32) -> SharedNewsCache {
        SharedNewsCache::new(
            // A paid key is configured but unreachable in tests; budget and
            // cache behaviour are what is under test.
            NewsProviders::new(Some("test-key".into()), None),
            Arc::new(ApiCounters::load(dir)),
            Duration::from_secs(8 * 3600),
            budget,
            dir,
        )
    }

    #[tokio::test]
    async fn fresh_entry_served_without_fetch() {
        let dir = temp_dir();
        let cache = cache_with_budget(&dir, 3);
        cache.prime_with_age("sol", vec![article("fresh")], Duration::from_secs(60));

        let fetch = cache.get_for_ticker("SOL").await;
        assert!(!fetch.stale);
        assert_eq!(fetch.articles.len(), 1);
        assert_eq!(fetch.articles[0].title, "fresh");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn budget_exhausted_serves_stale_without_paid_call() {
        let dir = temp_dir();
        let cache = cache_with_budget(&dir, 3);

        // Spend the whole budget.
        for _ in 0..3 {
            cache.counters.record_news_call().unwrap();
        }
        // A 9-hour-old entry: past the 8 h TTL.
        cache.prime_with_age("SOL", vec![article("old")], Duration::from_secs(9 * 3600));

        let fetch = cache.get_for_ticker("SOL").await;
        assert!(fetch.stale);
        assert_eq!(fetch.articles[0].title, "old");
        assert_eq!(fetch.age_hours(), 9);
        // No paid call happened.
        assert_eq!(cache.counters.news_calls_today(), 3);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn total_failure_returns_empty_stale() {
        let dir = temp_dir();
        // No providers configured at all, nothing cached.
        let cache = SharedNewsCache::new(
            NewsProviders::new(None, None),
            Arc::new(ApiCounters::load(&dir)),
            Duration::from_secs(8 * 3600),
            3,
            &dir,
        );

        let fetch = cache.get_global().await;
        assert!(fetch.stale);
        assert!(fetch.articles.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn snapshot_restores_across_restart() {
        let dir = temp_dir();
        {
            let cache = cache_with_budget(&dir, 3);
            cache.prime_with_age("ADA", vec![article("persisted")], Duration::from_secs(10));
            cache.flush().unwrap();
        }

        let cache = cache_with_budget(&dir, 3);
        let fetch = cache.get_for_ticker("ADA").await;
        assert!(!fetch.stale);
        assert_eq!(fetch.articles[0].title, "persisted");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn keys_are_uppercased() {
        let dir = temp_dir();
        let cache = cache_with_budget(&dir, 3);
        cache.prime_with_age("eth", vec![article("x")], Duration::from_secs(10));
        let fetch = cache.get_for_ticker("ETH").await;
        assert_eq!(fetch.articles.len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
