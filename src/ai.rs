// =============================================================================
// AI Analyzer — turns news batches into structured trading assessments
// =============================================================================
//
// Stateless wrapper around the OpenAI chat-completions endpoint. The model is
// instructed to answer in strict JSON; responses are parsed leniently so that
// minor schema drift degrades a single field, not the whole assessment.
//
// Error semantics: ANY transport or parse failure yields the neutral
// `unavailable()` assessment (HOLD, confidence 0). Workers never see an error
// from this module.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::counters::ApiCounters;
use crate::news::NewsArticle;
use crate::types::Signal;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const MODEL: &str = "gpt-4o-mini";

/// Overall tone the model read from the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

/// Expected market impact. Variant order defines ranking (High > Low).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    #[serde(alias = "med")]
    Medium,
    High,
}

/// How soon the impact is expected. Variant order defines ranking
/// (Immediate > Long).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Long,
    Short,
    Immediate,
}

/// Structured output of one analysis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsAssessment {
    pub signal: Signal,
    /// 0–100.
    pub confidence: u8,
    pub sentiment: Sentiment,
    pub impact: Impact,
    pub urgency: Urgency,
    /// Tickers the model found mentioned, uppercased.
    pub tickers: Vec<String>,
    pub reasoning: String,
}

impl NewsAssessment {
    /// Neutral fallback used whenever the analyzer cannot answer.
    pub fn unavailable() -> Self {
        Self {
            signal: Signal::Hold,
            confidence: 0,
            sentiment: Sentiment::Neutral,
            impact: Impact::Low,
            urgency: Urgency::Long,
            tickers: Vec::new(),
            reasoning: "analyzer unavailable".to_string(),
        }
    }

    /// Sort key for candidate ranking: confidence, then impact, then urgency,
    /// all descending.
    pub fn rank_key(&self) -> (u8, Impact, Urgency) {
        (self.confidence, self.impact, self.urgency)
    }
}

/// Stateless LLM analysis client.
pub struct NewsAnalyzer {
    client: reqwest::Client,
    api_key: Option<String>,
    counters: Arc<ApiCounters>,
}

impl NewsAnalyzer {
    pub fn new(api_key: Option<String>, counters: Arc<ApiCounters>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            api_key,
            counters,
        }
    }

    /// Assess a batch of articles as one combined signal, optionally focused
    /// on a single ticker. Never fails; degrades to `unavailable()`.
    pub async fn assess(&self, articles: &[NewsArticle], ticker: Option<&str>) -> NewsAssessment {
        if articles.is_empty() {
            return NewsAssessment::unavailable();
        }

        let focus = match ticker {
            Some(t) => format!(
                "Focus exclusively on {t}. Judge whether this news justifies buying, \
                 selling, or holding a {t} spot position."
            ),
            None => "Judge the single most actionable trading opportunity across all \
                     mentioned coins."
                .to_string(),
        };

        let prompt = format!(
            "{focus}\n\nRespond with a JSON object: {{\"signal\": \"BUY|SELL|HOLD\", \
             \"confidence\": 0-100, \"sentiment\": \"bullish|bearish|neutral\", \
             \"impact\": \"low|medium|high\", \"urgency\": \"immediate|short|long\", \
             \"tickers\": [\"...\"], \"reasoning\": \"...\"}}\n\nNews:\n{}",
            digest(articles)
        );

        match self.complete(&prompt).await {
            Ok(content) => match serde_json::from_str::<serde_json::Value>(&content) {
                Ok(value) => parse_assessment(&value),
                Err(e) => {
                    warn!(error = %e, "analyzer returned unparseable JSON");
                    NewsAssessment::unavailable()
                }
            },
            Err(e) => {
                warn!(error = %e, "analyzer call failed");
                NewsAssessment::unavailable()
            }
        }
    }

    /// Assess every article independently in a single call. Used by the
    /// autonomous strategy to rank candidate coins. Returns an empty vec on
    /// failure (callers treat that as "no candidates").
    pub async fn assess_each(&self, articles: &[NewsArticle]) -> Vec<NewsAssessment> {
        if articles.is_empty() {
            return Vec::new();
        }

        let prompt = format!(
            "For EACH numbered news item below, produce one assessment object. \
             Respond with a JSON object {{\"assessments\": [...]}} where each element is \
             {{\"signal\": \"BUY|SELL|HOLD\", \"confidence\": 0-100, \
             \"sentiment\": \"bullish|bearish|neutral\", \"impact\": \"low|medium|high\", \
             \"urgency\": \"immediate|short|long\", \"tickers\": [\"...\"], \
             \"reasoning\": \"...\"}}. List the mentioned coin tickers in order of \
             relevance.\n\nNews:\n{}",
            digest(articles)
        );

        match self.complete(&prompt).await {
            Ok(content) => match serde_json::from_str::<serde_json::Value>(&content) {
                Ok(value) => value["assessments"]
                    .as_array()
                    .map(|arr| arr.iter().map(parse_assessment).collect())
                    .unwrap_or_default(),
                Err(e) => {
                    warn!(error = %e, "analyzer returned unparseable JSON array");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(error = %e, "analyzer batch call failed");
                Vec::new()
            }
        }
    }

    /// One chat completion; returns the raw message content.
    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .context("OPENAI_API_KEY not configured")?;

        let request = serde_json::json!({
            "model": MODEL,
            "temperature": 0.2,
            "response_format": { "type": "json_object" },
            "messages": [
                {
                    "role": "system",
                    "content": "You are a cryptocurrency news analyst. You answer only \
                                with the requested JSON object, no prose."
                },
                { "role": "user", "content": prompt }
            ]
        });

        let body: serde_json::Value = self
            .client
            .post(OPENAI_URL)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .context("openai request failed")?
            .error_for_status()
            .context("openai returned error status")?
            .json()
            .await
            .context("failed to parse openai response")?;

        if let Err(e) = self.counters.record_openai_call() {
            warn!(error = %e, "failed to persist openai counter");
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .context("openai response missing message content")?
            .to_string();

        debug!(chars = content.len(), "analyzer completion received");
        Ok(content)
    }
}

impl std::fmt::Debug for NewsAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsAnalyzer")
            .field("configured", &self.api_key.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Compact news digest for the prompt: numbered "title — text" lines.
fn digest(articles: &[NewsArticle]) -> String {
    articles
        .iter()
        .enumerate()
        .map(|(i, a)| {
            // Char-safe truncation; article bodies can be long.
            let text: String = a.text.chars().take(300).collect();
            format!("{}. {} - {}", i + 1, a.title, text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lenient field-by-field parse of one assessment object. Unknown or missing
/// fields fall back to the neutral value rather than failing the whole parse.
fn parse_assessment(value: &serde_json::Value) -> NewsAssessment {
    let signal = match value["signal"].as_str().map(str::to_uppercase).as_deref() {
        Some("BUY") => Signal::Buy,
        Some("SELL") => Signal::Sell,
        _ => Signal::Hold,
    };

    let confidence = value["confidence"]
        .as_u64()
        .or_else(|| value["confidence"].as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
        .min(100) as u8;

    let sentiment = match value["sentiment"].as_str().map(str::to_lowercase).as_deref() {
        Some("bullish") => Sentiment::Bullish,
        Some("bearish") => Sentiment::Bearish,
        _ => Sentiment::Neutral,
    };

    let impact = match value["impact"].as_str().map(str::to_lowercase).as_deref() {
        Some("high") => Impact::High,
        Some("medium") | Some("med") => Impact::Medium,
        _ => Impact::Low,
    };

    let urgency = match value["urgency"].as_str().map(str::to_lowercase).as_deref() {
        Some("immediate") => Urgency::Immediate,
        Some("short") => Urgency::Short,
        _ => Urgency::Long,
    };

    let tickers = value["tickers"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|t| t.as_str())
                .map(|t| t.trim().to_uppercase())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let reasoning = value["reasoning"].as_str().unwrap_or_default().to_string();

    NewsAssessment {
        signal,
        confidence,
        sentiment,
        impact,
        urgency,
        tickers,
        reasoning,
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_assessment() {
        let value = serde_json::json!({
            "signal": "BUY",
            "confidence": 85,
            "sentiment": "bullish",
            "impact": "high",
            "urgency": "immediate",
            "tickers": ["sol", "BTC"],
            "reasoning": "ETF inflows accelerating"
        });
        let a = parse_assessment(&value);
        assert_eq!(a.signal, Signal::Buy);
        assert_eq!(a.confidence, 85);
        assert_eq!(a.sentiment, Sentiment::Bullish);
        assert_eq!(a.impact, Impact::High);
        assert_eq!(a.urgency, Urgency::Immediate);
        assert_eq!(a.tickers, vec!["SOL", "BTC"]);
    }

    #[test]
    fn parse_garbage_degrades_to_neutral() {
        let a = parse_assessment(&serde_json::json!({ "signal": "PANIC", "confidence": "loads" }));
        assert_eq!(a.signal, Signal::Hold);
        assert_eq!(a.confidence, 0);
        assert_eq!(a.sentiment, Sentiment::Neutral);
    }

    #[test]
    fn confidence_is_clamped() {
        let a = parse_assessment(&serde_json::json!({ "signal": "BUY", "confidence": 900 }));
        assert_eq!(a.confidence, 100);
    }

    #[test]
    fn confidence_accepts_string_numbers() {
        let a = parse_assessment(&serde_json::json!({ "signal": "SELL", "confidence": "72" }));
        assert_eq!(a.confidence, 72);
        assert_eq!(a.signal, Signal::Sell);
    }

    #[test]
    fn impact_and_urgency_order_for_ranking() {
        assert!(Impact::High > Impact::Medium);
        assert!(Impact::Medium > Impact::Low);
        assert!(Urgency::Immediate > Urgency::Short);
        assert!(Urgency::Short > Urgency::Long);

        let strong = parse_assessment(&serde_json::json!({
            "signal": "BUY", "confidence": 80, "impact": "high", "urgency": "immediate"
        }));
        let weak = parse_assessment(&serde_json::json!({
            "signal": "BUY", "confidence": 80, "impact": "low", "urgency": "long"
        }));
        assert!(strong.rank_key() > weak.rank_key());
    }

    #[tokio::test]
    async fn unconfigured_analyzer_degrades_to_hold() {
        let dir = std::env::temp_dir().join(format!("flotilla-ai-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let analyzer = NewsAnalyzer::new(None, Arc::new(ApiCounters::load(&dir)));

        let articles = vec![NewsArticle {
            title: "t".into(),
            text: String::new(),
            source: String::new(),
            url: String::new(),
            published_at: String::new(),
            tickers: Vec::new(),
        }];
        let a = analyzer.assess(&articles, Some("BTC")).await;
        assert_eq!(a.signal, Signal::Hold);
        assert_eq!(a.confidence, 0);
        assert_eq!(a.reasoning, "analyzer unavailable");

        assert!(analyzer.assess_each(&articles).await.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        let dir = std::env::temp_dir().join(format!("flotilla-ai-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let analyzer = NewsAnalyzer::new(Some("sk-test".into()), Arc::new(ApiCounters::load(&dir)));
        let a = analyzer.assess(&[], None).await;
        assert_eq!(a.signal, Signal::Hold);
        std::fs::remove_dir_all(&dir).ok();
    }
}
