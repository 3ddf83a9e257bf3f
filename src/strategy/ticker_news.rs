// =============================================================================
// Ticker-news strategy — AI sentiment gated by the technical trend
// =============================================================================
//
// Pulls the shared news cache for the bot's ticker, has the analyzer grade
// the batch, then blends with the technical read of the candles:
//
//   BUY  needs analyzer BUY  with confidence >= 70 AND non-bearish technicals
//   SELL needs analyzer SELL with confidence >= 60 AND non-bullish technicals
//
// Anything else is HOLD. Stale news is still used (the cache marks it and we
// log the age); no news at all is a HOLD.
// =============================================================================

use tracing::debug;

use crate::strategy::technical::{technical_read, TechnicalRead};
use crate::strategy::{base_asset, StrategyContext, StrategyServices, StrategySignal};
use crate::types::Signal;

const BUY_CONFIDENCE_GATE: u8 = 70;
const SELL_CONFIDENCE_GATE: u8 = 60;

pub async fn analyze(
    ctx: &StrategyContext<'_>,
    services: &StrategyServices,
) -> StrategySignal {
    let ticker = base_asset(ctx.symbol);

    let fetch = services.news.get_for_ticker(ticker).await;
    if fetch.articles.is_empty() {
        return StrategySignal::hold(format!("no news available for {ticker}"));
    }
    if fetch.stale {
        debug!(ticker, age_hours = fetch.age_hours(), "using cached news");
    }

    let assessment = services.analyzer.assess(&fetch.articles, Some(ticker)).await;
    let tech = technical_read(ctx.candles);

    let news_note = if fetch.stale {
        format!(" [news age {}h]", fetch.age_hours())
    } else {
        String::new()
    };

    match assessment.signal {
        Signal::Buy if assessment.confidence >= BUY_CONFIDENCE_GATE => {
            if tech == TechnicalRead::Bearish {
                return StrategySignal::hold(format!(
                    "news says buy ({}) but technicals are bearish{news_note}",
                    assessment.confidence
                ));
            }
            let mut signal = StrategySignal::buy(
                assessment.confidence,
                format!("{}{news_note}", assessment.reasoning),
            );
            signal.allow_scale_in = false;
            signal
        }
        Signal::Sell if assessment.confidence >= SELL_CONFIDENCE_GATE => {
            if tech == TechnicalRead::Bullish {
                return StrategySignal::hold(format!(
                    "news says sell ({}) but technicals are bullish{news_note}",
                    assessment.confidence
                ));
            }
            StrategySignal::sell(
                assessment.confidence,
                format!("{}{news_note}", assessment.reasoning),
            )
        }
        other => StrategySignal::hold(format!(
            "news signal {other} at confidence {} below gate{news_note}",
            assessment.confidence
        )),
    }
}
