pub mod cache;
pub mod providers;

pub use cache::{NewsFetch, SharedNewsCache, GLOBAL_KEY};
pub use providers::NewsProviders;

use serde::{Deserialize, Serialize};

/// One news article, normalized across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub published_at: String,
    /// Tickers the provider tagged on the article (may be empty).
    #[serde(default)]
    pub tickers: Vec<String>,
}
