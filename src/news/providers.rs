// =============================================================================
// News Providers — CryptoNews API (paid), NewsAPI (optional), CoinDesk RSS
// =============================================================================
//
// The paid CryptoNews endpoint is the primary source and the only one subject
// to the daily budget. NewsAPI (when a key is configured) and the CoinDesk
// RSS feed are budget-free fallbacks. All responses are normalized into
// [`NewsArticle`].
// =============================================================================

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, instrument};

use crate::news::NewsArticle;

const CRYPTONEWS_URL: &str = "https://cryptonews-api.com/api/v1";
const NEWSAPI_URL: &str = "https://newsapi.org/v2/everything";
const COINDESK_RSS_URL: &str = "https://www.coindesk.com/arc/outboundfeeds/rss/";

/// Articles requested per fetch.
const FETCH_ITEMS: u32 = 10;

/// HTTP access to the news sources.
pub struct NewsProviders {
    client: reqwest::Client,
    cryptonews_key: Option<String>,
    newsapi_key: Option<String>,
}

impl NewsProviders {
    pub fn new(cryptonews_key: Option<String>, newsapi_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            cryptonews_key,
            newsapi_key,
        }
    }

    /// True when the paid provider can be called at all.
    pub fn has_paid_provider(&self) -> bool {
        self.cryptonews_key.is_some()
    }

    pub fn has_newsapi(&self) -> bool {
        self.newsapi_key.is_some()
    }

    // -------------------------------------------------------------------------
    // CryptoNews API (paid, budgeted by the cache)
    // -------------------------------------------------------------------------

    /// Fetch ticker-specific or global crypto news from the paid provider.
    #[instrument(skip(self), name = "news::cryptonews")]
    pub async fn fetch_cryptonews(&self, ticker: Option<&str>) -> Result<Vec<NewsArticle>> {
        let key = self
            .cryptonews_key
            .as_deref()
            .context("CRYPTONEWS_API_KEY not configured")?;

        let url = match ticker {
            Some(t) => format!(
                "{CRYPTONEWS_URL}?tickers={}&items={FETCH_ITEMS}&token={key}",
                t.to_uppercase()
            ),
            None => format!(
                "{CRYPTONEWS_URL}/category?section=general&items={FETCH_ITEMS}&token={key}"
            ),
        };

        let body: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await
            .context("cryptonews request failed")?
            .error_for_status()
            .context("cryptonews returned error status")?
            .json()
            .await
            .context("failed to parse cryptonews response")?;

        let raw = body["data"]
            .as_array()
            .context("cryptonews response missing 'data' array")?;

        let articles: Vec<NewsArticle> = raw
            .iter()
            .map(|item| NewsArticle {
                title: item["title"].as_str().unwrap_or_default().to_string(),
                text: item["text"].as_str().unwrap_or_default().to_string(),
                source: item["source_name"].as_str().unwrap_or_default().to_string(),
                url: item["news_url"].as_str().unwrap_or_default().to_string(),
                published_at: item["date"].as_str().unwrap_or_default().to_string(),
                tickers: item["tickers"]
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|t| t.as_str())
                            .map(|t| t.to_uppercase())
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .filter(|a| !a.title.is_empty())
            .collect();

        debug!(ticker = ?ticker, count = articles.len(), "cryptonews articles fetched");
        Ok(articles)
    }

    // -------------------------------------------------------------------------
    // NewsAPI (optional fallback, budget-free)
    // -------------------------------------------------------------------------

    /// Fetch from NewsAPI, querying either "<ticker> crypto" or general
    /// cryptocurrency coverage.
    #[instrument(skip(self), name = "news::newsapi")]
    pub async fn fetch_newsapi(&self, ticker: Option<&str>) -> Result<Vec<NewsArticle>> {
        let key = self
            .newsapi_key
            .as_deref()
            .context("NEWSAPI_KEY not configured")?;

        let query = match ticker {
            Some(t) => format!("{} cryptocurrency", t),
            None => "cryptocurrency".to_string(),
        };
        let url = format!(
            "{NEWSAPI_URL}?q={}&pageSize={FETCH_ITEMS}&sortBy=publishedAt&apiKey={key}",
            query.replace(' ', "%20")
        );

        let body: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await
            .context("newsapi request failed")?
            .error_for_status()
            .context("newsapi returned error status")?
            .json()
            .await
            .context("failed to parse newsapi response")?;

        let raw = body["articles"]
            .as_array()
            .context("newsapi response missing 'articles' array")?;

        let ticker_tag: Vec<String> = ticker
            .map(|t| vec![t.to_uppercase()])
            .unwrap_or_default();

        let articles: Vec<NewsArticle> = raw
            .iter()
            .map(|item| NewsArticle {
                title: item["title"].as_str().unwrap_or_default().to_string(),
                text: item["description"].as_str().unwrap_or_default().to_string(),
                source: item["source"]["name"].as_str().unwrap_or_default().to_string(),
                url: item["url"].as_str().unwrap_or_default().to_string(),
                published_at: item["publishedAt"].as_str().unwrap_or_default().to_string(),
                tickers: ticker_tag.clone(),
            })
            .filter(|a| !a.title.is_empty())
            .collect();

        debug!(ticker = ?ticker, count = articles.len(), "newsapi articles fetched");
        Ok(articles)
    }

    // -------------------------------------------------------------------------
    // CoinDesk RSS (free)
    // -------------------------------------------------------------------------

    /// Fetch the CoinDesk headline feed. No API key, no budget.
    #[instrument(skip(self), name = "news::coindesk_rss")]
    pub async fn fetch_coindesk_rss(&self) -> Result<Vec<NewsArticle>> {
        let xml = self
            .client
            .get(COINDESK_RSS_URL)
            .send()
            .await
            .context("coindesk rss request failed")?
            .error_for_status()
            .context("coindesk rss returned error status")?
            .text()
            .await
            .context("failed to read coindesk rss body")?;

        let articles = parse_rss_items(&xml);
        debug!(count = articles.len(), "coindesk rss articles fetched");
        Ok(articles)
    }
}

impl std::fmt::Debug for NewsProviders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsProviders")
            .field("cryptonews", &self.cryptonews_key.is_some())
            .field("newsapi", &self.newsapi_key.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RSS parsing
// ---------------------------------------------------------------------------

/// Pull `<item>` entries out of an RSS feed. Only title, link, and pubDate
/// are extracted; CDATA wrappers are stripped.
fn parse_rss_items(xml: &str) -> Vec<NewsArticle> {
    // (?s) lets `.` span newlines inside an item block.
    let item_re = Regex::new(r"(?s)<item>(.*?)</item>").expect("static regex");
    let title_re = Regex::new(r"(?s)<title>(.*?)</title>").expect("static regex");
    let link_re = Regex::new(r"(?s)<link>(.*?)</link>").expect("static regex");
    let date_re = Regex::new(r"(?s)<pubDate>(.*?)</pubDate>").expect("static regex");

    item_re
        .captures_iter(xml)
        .filter_map(|cap| {
            let item = cap.get(1)?.as_str();
            let title = strip_cdata(title_re.captures(item)?.get(1)?.as_str());
            if title.is_empty() {
                return None;
            }
            Some(NewsArticle {
                title,
                text: String::new(),
                source: "CoinDesk".to_string(),
                url: link_re
                    .captures(item)
                    .and_then(|c| c.get(1))
                    .map(|m| strip_cdata(m.as_str()))
                    .unwrap_or_default(),
                published_at: date_re
                    .captures(item)
                    .and_then(|c| c.get(1))
                    .map(|m| strip_cdata(m.as_str()))
                    .unwrap_or_default(),
                tickers: Vec::new(),
            })
        })
        .collect()
}

fn strip_cdata(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("<![CDATA[")
        .trim_end_matches("]]>")
        .trim()
        .to_string()
}
