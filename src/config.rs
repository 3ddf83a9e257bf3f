// =============================================================================
// Configuration — environment-driven settings for the Flotilla daemon
// =============================================================================
//
// All configuration is read once at boot from the environment (a .env file is
// honoured via dotenv in main). API keys are never logged. Missing exchange or
// provider keys are not fatal at boot; the affected subsystem degrades and the
// failure surfaces through bot logs and /api/overview.
// =============================================================================

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

// =============================================================================
// Default-value helpers
// =============================================================================

const DEFAULT_DASHBOARD_PORT: u16 = 5000;
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_TICK_INTERVAL_SEC: u64 = 900;
const DEFAULT_NEWS_TTL_SEC: u64 = 8 * 3600;
const DEFAULT_NEWS_DAILY_BUDGET: u32 = 3;
const DEFAULT_STOP_LOSS_PCT: f64 = 3.0;
const DEFAULT_TAKE_PROFIT_PCT: f64 = 5.0;
const DEFAULT_MAX_HOLD_HOURS: u64 = 48;

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env_string(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "unparseable env value, using default");
            default
        }),
        None => default,
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    match env_string(key) {
        Some(raw) => matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

// =============================================================================
// AppConfig
// =============================================================================

/// Process-wide configuration, loaded once at boot.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // --- Exchange -----------------------------------------------------------
    pub exchange_api_key: String,
    pub exchange_api_secret: String,
    pub use_testnet: bool,

    // --- External data providers -------------------------------------------
    pub openai_api_key: Option<String>,
    pub cryptonews_api_key: Option<String>,
    pub newsapi_key: Option<String>,

    // --- SMS ----------------------------------------------------------------
    pub sms_provider_sid: Option<String>,
    pub sms_provider_token: Option<String>,
    pub sms_from: Option<String>,
    /// Recipient phone numbers (comma-separated in `SMS_TO_LIST`).
    pub sms_to_list: Vec<String>,

    // --- Daemon -------------------------------------------------------------
    pub dashboard_port: u16,
    pub data_dir: PathBuf,
    pub tick_interval: Duration,
    pub news_ttl: Duration,
    pub news_daily_budget: u32,
    pub adopt_orphans_on_boot: bool,

    // --- Position defaults --------------------------------------------------
    /// Stop-loss distance below average entry, in percent (3.0 => SL at 97%).
    pub stop_loss_pct: f64,
    /// Take-profit distance above average entry, in percent.
    pub take_profit_pct: f64,
    /// A position older than this is force-closed.
    pub max_hold: Duration,
}

impl AppConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let data_dir = PathBuf::from(
            env_string("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        );

        let sms_to_list = env_string("SMS_TO_LIST")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            exchange_api_key: env_string("EXCHANGE_API_KEY").unwrap_or_default(),
            exchange_api_secret: env_string("EXCHANGE_API_SECRET").unwrap_or_default(),
            use_testnet: env_flag("USE_TESTNET", false),

            openai_api_key: env_string("OPENAI_API_KEY"),
            cryptonews_api_key: env_string("CRYPTONEWS_API_KEY"),
            newsapi_key: env_string("NEWSAPI_KEY"),

            sms_provider_sid: env_string("SMS_PROVIDER_SID"),
            sms_provider_token: env_string("SMS_PROVIDER_TOKEN"),
            sms_from: env_string("SMS_FROM"),
            sms_to_list,

            dashboard_port: env_parse("DASHBOARD_PORT", DEFAULT_DASHBOARD_PORT),
            data_dir,
            tick_interval: Duration::from_secs(env_parse(
                "TICK_INTERVAL_SEC",
                DEFAULT_TICK_INTERVAL_SEC,
            )),
            news_ttl: Duration::from_secs(env_parse("NEWS_TTL_SEC", DEFAULT_NEWS_TTL_SEC)),
            news_daily_budget: env_parse("NEWS_DAILY_BUDGET", DEFAULT_NEWS_DAILY_BUDGET),
            adopt_orphans_on_boot: env_flag("ADOPT_ORPHANS_ON_BOOT", true),

            stop_loss_pct: env_parse("STOP_LOSS_PCT", DEFAULT_STOP_LOSS_PCT),
            take_profit_pct: env_parse("TAKE_PROFIT_PCT", DEFAULT_TAKE_PROFIT_PCT),
            max_hold: Duration::from_secs(
                env_parse("MAX_HOLD_HOURS", DEFAULT_MAX_HOLD_HOURS) * 3600,
            ),
        };

        if config.exchange_api_key.is_empty() || config.exchange_api_secret.is_empty() {
            warn!("EXCHANGE_API_KEY / EXCHANGE_API_SECRET not set — signed exchange calls will fail");
        }
        if config.openai_api_key.is_none() {
            warn!("OPENAI_API_KEY not set — news analysis degrades to HOLD");
        }
        if config.cryptonews_api_key.is_none() {
            warn!("CRYPTONEWS_API_KEY not set — news cache will rely on fallback sources");
        }

        info!(
            testnet = config.use_testnet,
            port = config.dashboard_port,
            data_dir = %config.data_dir.display(),
            tick_secs = config.tick_interval.as_secs(),
            news_ttl_secs = config.news_ttl.as_secs(),
            news_daily_budget = config.news_daily_budget,
            "configuration loaded"
        );

        Ok(config)
    }

    /// Create the data directory. Failure here is process-fatal.
    pub fn ensure_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("cannot create data directory {}", self.data_dir.display())
        })
    }

    /// True when all SMS settings required for sending are present.
    pub fn sms_configured(&self) -> bool {
        self.sms_provider_sid.is_some()
            && self.sms_provider_token.is_some()
            && self.sms_from.is_some()
            && !self.sms_to_list.is_empty()
    }

    /// Stop-loss multiplier applied to an average entry price (e.g. 0.97).
    pub fn stop_loss_factor(&self) -> f64 {
        1.0 - self.stop_loss_pct / 100.0
    }

    /// Take-profit multiplier applied to an average entry price (e.g. 1.05).
    pub fn take_profit_factor(&self) -> f64 {
        1.0 + self.take_profit_pct / 100.0
    }
}

#[cfg(test)]
impl AppConfig {
    /// Fixed configuration for unit tests: testnet, temp data dir, defaults.
    pub fn for_tests() -> Self {
        Self {
            exchange_api_key: String::new(),
            exchange_api_secret: String::new(),
            use_testnet: true,
            openai_api_key: None,
            cryptonews_api_key: None,
            newsapi_key: None,
            sms_provider_sid: None,
            sms_provider_token: None,
            sms_from: None,
            sms_to_list: Vec::new(),
            dashboard_port: 5000,
            data_dir: std::env::temp_dir().join(format!(
                "flotilla-test-{}",
                uuid::Uuid::new_v4()
            )),
            tick_interval: Duration::from_secs(900),
            news_ttl: Duration::from_secs(8 * 3600),
            news_daily_budget: 3,
            adopt_orphans_on_boot: true,
            stop_loss_pct: 3.0,
            take_profit_pct: 5.0,
            max_hold: Duration::from_secs(48 * 3600),
        }
    }
}
