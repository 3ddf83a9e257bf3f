// =============================================================================
// Daily API Counters — per-UTC-day call accounting for paid providers
// =============================================================================
//
// The counters survive restarts: they are persisted to api_counters.json on
// every increment, so a crash-loop cannot re-spend the daily news budget.
// The date key rolls at UTC midnight.
// =============================================================================

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::storage;

/// Persisted counter state for one UTC day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyCounters {
    /// UTC day this record covers, formatted `YYYY-MM-DD`.
    pub date_utc: String,
    #[serde(default)]
    pub cryptonews_calls: u32,
    #[serde(default)]
    pub openai_calls: u32,
}

impl DailyCounters {
    fn fresh(date_utc: String) -> Self {
        Self {
            date_utc,
            cryptonews_calls: 0,
            openai_calls: 0,
        }
    }
}

/// Thread-safe daily counter store backing the news/AI budgets.
pub struct ApiCounters {
    path: PathBuf,
    inner: Mutex<DailyCounters>,
}

fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

impl ApiCounters {
    /// Load counters from disk, resetting if the persisted day is not today.
    pub fn load(data_dir: &std::path::Path) -> Self {
        let path = storage::counters_path(data_dir);
        let today = today_utc();

        let counters = match storage::read_json::<DailyCounters>(&path) {
            Ok(Some(c)) if c.date_utc == today => {
                info!(
                    date = %c.date_utc,
                    cryptonews = c.cryptonews_calls,
                    openai = c.openai_calls,
                    "daily API counters restored"
                );
                c
            }
            Ok(Some(c)) => {
                info!(stale_date = %c.date_utc, "daily API counters rolled to new UTC day");
                DailyCounters::fresh(today)
            }
            Ok(None) => DailyCounters::fresh(today),
            Err(e) => {
                warn!(error = %e, "failed to load API counters, starting fresh");
                DailyCounters::fresh(today)
            }
        };

        Self {
            path,
            inner: Mutex::new(counters),
        }
    }

    /// Roll the counters if the UTC day changed since the last access.
    /// Must be called with the lock held.
    fn roll_if_needed(counters: &mut DailyCounters) {
        let today = today_utc();
        if counters.date_utc != today {
            info!(old = %counters.date_utc, new = %today, "UTC day rolled, counters reset");
            *counters = DailyCounters::fresh(today);
        }
    }

    /// Record one paid news-API call. Persisted before returning.
    pub fn record_news_call(&self) -> Result<u32> {
        let mut counters = self.inner.lock();
        Self::roll_if_needed(&mut counters);
        counters.cryptonews_calls += 1;
        let count = counters.cryptonews_calls;
        storage::write_json_atomic(&self.path, &*counters)?;
        Ok(count)
    }

    /// Record one LLM call. Persisted before returning.
    pub fn record_openai_call(&self) -> Result<u32> {
        let mut counters = self.inner.lock();
        Self::roll_if_needed(&mut counters);
        counters.openai_calls += 1;
        let count = counters.openai_calls;
        storage::write_json_atomic(&self.path, &*counters)?;
        Ok(count)
    }

    /// Number of paid news calls spent today.
    pub fn news_calls_today(&self) -> u32 {
        let mut counters = self.inner.lock();
        Self::roll_if_needed(&mut counters);
        counters.cryptonews_calls
    }

    /// True when another paid news call would stay within `budget`.
    pub fn news_budget_available(&self, budget: u32) -> bool {
        self.news_calls_today() < budget
    }

    /// Snapshot for the dashboard.
    pub fn snapshot(&self) -> DailyCounters {
        let mut counters = self.inner.lock();
        Self::roll_if_needed(&mut counters);
        counters.clone()
    }

    /// Flush current state to disk (shutdown path).
    pub fn flush(&self) -> Result<()> {
        let counters = self.inner.lock();
        storage::write_json_atomic(&self.path, &*counters)
    }
}

impl std::fmt::Debug for ApiCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = self.inner.lock();
        f.debug_struct("ApiCounters")
            .field("date_utc", &c.date_utc)
            .field("cryptonews_calls", &c.cryptonews_calls)
            .field("openai_calls", &c.openai_calls)
            .finish()
    }
}
