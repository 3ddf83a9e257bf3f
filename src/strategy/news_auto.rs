// =============================================================================
// News-autonomous strategy — picks its own coin from the global news flow
// =============================================================================
//
// Flat (no position): every article in the global feed is assessed
// individually (one LLM call for the whole batch), candidate tickers are
// validated against the exchange symbol cache, and BUY candidates are ranked
// by (confidence, impact, urgency) descending. The best candidate becomes the
// signal; when its pair differs from the bot's current symbol the signal
// carries a `recommended_symbol` for the worker to switch to.
//
// Holding a position: locked-symbol mode. The strategy behaves exactly like
// ticker-news for the current symbol and never emits a recommendation — the
// bot stays focused until the position is closed.
// =============================================================================

use tracing::debug;

use crate::ai::NewsAssessment;
use crate::strategy::{ticker_news, usdt_pair, StrategyContext, StrategyServices, StrategySignal};
use crate::types::Signal;

/// Candidate tickers examined per tick (bounds symbol-cache lookups).
const MAX_CANDIDATES: usize = 5;

pub async fn analyze(
    ctx: &StrategyContext<'_>,
    services: &StrategyServices,
) -> StrategySignal {
    // Locked-symbol mode while a position is held: no symbol switching, the
    // current pair is managed like a ticker-news bot.
    if ctx.position.is_some() {
        let mut signal = ticker_news::analyze(ctx, services).await;
        signal.recommended_symbol = None;
        return signal;
    }

    let fetch = services.news.get_global().await;
    if fetch.articles.is_empty() {
        return StrategySignal::hold("no global news available");
    }
    if fetch.stale {
        debug!(age_hours = fetch.age_hours(), "using cached global news");
    }

    let assessments = services.analyzer.assess_each(&fetch.articles).await;
    if assessments.is_empty() {
        return StrategySignal::hold("analyzer produced no assessments");
    }

    // Rank BUY candidates best-first.
    let mut candidates: Vec<&NewsAssessment> = assessments
        .iter()
        .filter(|a| a.signal == Signal::Buy && !a.tickers.is_empty())
        .collect();
    candidates.sort_by(|a, b| b.rank_key().cmp(&a.rank_key()));

    for assessment in candidates.into_iter().take(MAX_CANDIDATES) {
        // First mentioned ticker whose USDT pair actually trades wins.
        for ticker in &assessment.tickers {
            let pair = usdt_pair(ticker);
            if !services.symbols.is_tradeable(&pair).await {
                debug!(ticker = %ticker, pair = %pair, "candidate pair not tradeable, skipping");
                continue;
            }

            let mut signal = StrategySignal::buy(
                assessment.confidence,
                format!("{}: {}", ticker, assessment.reasoning),
            );
            if pair != ctx.symbol {
                signal.recommended_symbol = Some(pair);
            }
            return signal;
        }
    }

    StrategySignal::hold("no tradeable buy candidate in the news")
}
