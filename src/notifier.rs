// =============================================================================
// SMS Notifier — fire-and-forget trade alerts over the Twilio REST API
// =============================================================================
//
// Every state-changing trade produces one SMS per configured recipient. The
// notifier is always invoked through `notify_trade` (a tokio::spawn wrapper),
// so a slow or failing SMS provider can never stall a worker tick. Reasoning
// text is truncated to 400 characters before it reaches the wire.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::types::TradeEvent;

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Maximum characters of strategy reasoning carried in one SMS.
const REASONING_LIMIT: usize = 400;

/// Outcome of one send attempt to one recipient.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub recipient: String,
    pub ok: bool,
    pub detail: Option<String>,
}

/// SMS delivery over the provider's REST API.
pub struct SmsNotifier {
    client: reqwest::Client,
    sid: Option<String>,
    token: Option<String>,
    from: Option<String>,
    recipients: Vec<String>,
}

impl SmsNotifier {
    pub fn new(config: &AppConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            sid: config.sms_provider_sid.clone(),
            token: config.sms_provider_token.clone(),
            from: config.sms_from.clone(),
            recipients: config.sms_to_list.clone(),
        }
    }

    pub fn configured(&self) -> bool {
        self.sid.is_some() && self.token.is_some() && self.from.is_some()
            && !self.recipients.is_empty()
    }

    /// Send one trade alert to every recipient; never returns an error. The
    /// per-recipient outcomes are returned for logging.
    pub async fn send_trade(&self, evt: &TradeEvent) -> Vec<SendOutcome> {
        if !self.configured() {
            debug!("sms notifier not configured, skipping alert");
            return Vec::new();
        }

        let body = render_trade_message(evt);
        let mut outcomes = Vec::with_capacity(self.recipients.len());

        for recipient in &self.recipients {
            let outcome = match self.send_one(recipient, &body).await {
                Ok(()) => SendOutcome {
                    recipient: recipient.clone(),
                    ok: true,
                    detail: None,
                },
                Err(e) => {
                    warn!(recipient = %recipient, error = %e, "sms send failed");
                    SendOutcome {
                        recipient: recipient.clone(),
                        ok: false,
                        detail: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let sent = outcomes.iter().filter(|o| o.ok).count();
        info!(
            symbol = %evt.symbol,
            action = %evt.action,
            sent,
            total = outcomes.len(),
            "trade sms fan-out complete"
        );
        outcomes
    }

    async fn send_one(&self, to: &str, body: &str) -> Result<()> {
        let sid = self.sid.as_deref().context("sms sid missing")?;
        let token = self.token.as_deref().context("sms token missing")?;
        let from = self.from.as_deref().context("sms from missing")?;

        let url = format!("{TWILIO_API_BASE}/Accounts/{sid}/Messages.json");
        let params = [("To", to), ("From", from), ("Body", body)];

        let resp = self
            .client
            .post(&url)
            .basic_auth(sid, Some(token))
            .form(&params)
            .send()
            .await
            .context("sms request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("sms provider returned {status}: {detail}");
        }
        Ok(())
    }
}

impl std::fmt::Debug for SmsNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsNotifier")
            .field("configured", &self.configured())
            .field("recipients", &self.recipients.len())
            .finish()
    }
}

/// Spawn the SMS fan-out in the background so callers never wait on it.
pub fn notify_trade(notifier: Arc<SmsNotifier>, evt: TradeEvent) {
    tokio::spawn(async move {
        notifier.send_trade(&evt).await;
    });
}

// ---------------------------------------------------------------------------
// Message rendering
// ---------------------------------------------------------------------------

/// Render the SMS body for one trade event.
fn render_trade_message(evt: &TradeEvent) -> String {
    let mut msg = format!(
        "{} {} @ {:.4} qty {:.6} ({:.2} USDT)",
        evt.action, evt.symbol, evt.price, evt.qty, evt.notional_usdt
    );

    if let Some(pnl) = evt.pnl_usdt {
        match evt.pnl_pct() {
            Some(pct) => msg.push_str(&format!(" | PnL {:+.2} USDT ({:+.1}%)", pnl, pct)),
            None => msg.push_str(&format!(" | PnL {:+.2} USDT", pnl)),
        }
    }

    if let Some(reasoning) = &evt.reasoning {
        let truncated: String = reasoning.chars().take(REASONING_LIMIT).collect();
        if !truncated.is_empty() {
            msg.push_str(" | ");
            msg.push_str(&truncated);
        }
    }

    msg
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TradeAction;

    fn event(reasoning: Option<String>, pnl: Option<f64>) -> TradeEvent {
        TradeEvent {
            bot_id: 3,
            action: TradeAction::Sell,
            symbol: "BNBUSDT".into(),
            price: 678.0,
            qty: 0.10,
            notional_usdt: 67.8,
            pnl_usdt: pnl,
            reasoning,
        }
    }

    #[test]
    fn message_includes_action_symbol_and_amounts() {
        let msg = render_trade_message(&event(None, None));
        assert!(msg.starts_with("SELL BNBUSDT @ 678.0000"));
        assert!(msg.contains("qty 0.100000"));
        assert!(msg.contains("(67.80 USDT)"));
    }

    #[test]
    fn message_includes_pnl_with_pct() {
        let msg = render_trade_message(&event(None, Some(-2.2)));
        assert!(msg.contains("PnL -2.20 USDT"));
        assert!(msg.contains("-3.1%"), "got: {msg}");
    }

    #[test]
    fn reasoning_is_truncated_to_400_chars() {
        let long = "x".repeat(1000);
        let msg = render_trade_message(&event(Some(long), None));
        let tail = msg.split(" | ").last().unwrap();
        assert_eq!(tail.chars().count(), 400);
    }

    #[test]
    fn empty_reasoning_is_omitted() {
        let msg = render_trade_message(&event(Some(String::new()), None));
        assert!(!msg.ends_with(" | "));
    }

    #[tokio::test]
    async fn unconfigured_notifier_sends_nothing() {
        let notifier = SmsNotifier::new(&AppConfig::for_tests());
        assert!(!notifier.configured());
        let outcomes = notifier.send_trade(&event(None, None)).await;
        assert!(outcomes.is_empty());
    }
}
