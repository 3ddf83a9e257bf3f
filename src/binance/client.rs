// =============================================================================
// Binance Spot REST Client — HMAC-SHA256 signed requests
// =============================================================================
//
// SECURITY: the secret key is never logged or serialized. All signed requests
// carry X-MBX-APIKEY as a header and a recvWindow of 5 000 ms to tolerate
// minor clock drift between the daemon and Binance servers.
//
// Quantity quantization to the symbol's lot step and min-notional enforcement
// live HERE, not in the workers: every order that reaches the wire is already
// exchange-legal.
// =============================================================================

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::binance::rate_limit::RateLimitGauge;
use crate::market_data::Candle;
use crate::types::BalanceInfo;

type HmacSha256 = Hmac<Sha256>;

/// Default recv-window sent with every signed request (milliseconds).
const RECV_WINDOW: u64 = 5000;

const MAINNET_URL: &str = "https://api.binance.com";
const TESTNET_URL: &str = "https://testnet.binance.vision";

// ---------------------------------------------------------------------------
// Typed results
// ---------------------------------------------------------------------------

/// Fill summary of a completed market order.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OrderResult {
    pub executed_qty: f64,
    pub avg_fill_price: f64,
    pub cumulative_quote_qty: f64,
    pub status: String,
}

impl OrderResult {
    /// Parse the order-placement response body into a typed result.
    pub(crate) fn from_response(body: &serde_json::Value) -> Result<Self> {
        let executed_qty = parse_str_f64(&body["executedQty"])
            .context("order response missing executedQty")?;
        let cumulative_quote_qty = parse_str_f64(&body["cummulativeQuoteQty"])
            .context("order response missing cummulativeQuoteQty")?;
        let status = body["status"].as_str().unwrap_or("UNKNOWN").to_string();

        let avg_fill_price = if executed_qty > 0.0 {
            cumulative_quote_qty / executed_qty
        } else {
            0.0
        };

        Ok(Self {
            executed_qty,
            avg_fill_price,
            cumulative_quote_qty,
            status,
        })
    }
}

/// Trading rules for one symbol, extracted from exchangeInfo.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct SymbolRules {
    pub tradeable: bool,
    pub lot_step: f64,
    pub min_notional: f64,
}

/// Extract [`SymbolRules`] from one `symbols[]` entry of exchangeInfo.
pub(crate) fn parse_symbol_rules(info: &serde_json::Value) -> Result<SymbolRules> {
    let tradeable = info["status"].as_str() == Some("TRADING");

    let mut lot_step = 0.0_f64;
    let mut min_notional = 0.0_f64;

    let filters = info["filters"]
        .as_array()
        .context("exchangeInfo entry missing filters")?;

    for filter in filters {
        match filter["filterType"].as_str() {
            Some("LOT_SIZE") => {
                lot_step = parse_str_f64(&filter["stepSize"]).unwrap_or(0.0);
            }
            // Binance has used both filter names across API revisions.
            Some("NOTIONAL") | Some("MIN_NOTIONAL") => {
                min_notional = parse_str_f64(&filter["minNotional"]).unwrap_or(0.0);
            }
            _ => {}
        }
    }

    Ok(SymbolRules {
        tradeable,
        lot_step,
        min_notional,
    })
}

// ---------------------------------------------------------------------------
// Quantization helpers
// ---------------------------------------------------------------------------

/// Round `qty` down to a whole multiple of `step`.
pub fn quantize_to_step(qty: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return qty;
    }
    // The epsilon shields against e.g. 0.3/0.1 => 2.9999999999999996.
    let steps = (qty / step + 1e-9).floor();
    let quantized = steps * step;
    // Clamp residual float noise to the step's own precision.
    (quantized * 1e8).round() / 1e8
}

/// Format a quantity with exactly as many decimals as `step` carries.
pub(crate) fn format_qty(qty: f64, step: f64) -> String {
    let mut decimals = 0usize;
    let mut s = step;
    while s > 0.0 && s < 0.999_999_9 && decimals < 8 {
        s *= 10.0;
        decimals += 1;
    }
    format!("{qty:.decimals$}")
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Binance spot REST client with HMAC-SHA256 request signing.
pub struct BinanceClient {
    secret: String,
    base_url: String,
    client: reqwest::Client,
    pub rate_limit: RateLimitGauge,
}

impl BinanceClient {
    /// Create a new client. `use_testnet` switches to the spot testnet.
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, use_testnet: bool) -> Self {
        let api_key = api_key.into();
        let secret = secret.into();

        let mut default_headers = HeaderMap::new();
        if let Ok(val) = HeaderValue::from_str(&api_key) {
            default_headers.insert("X-MBX-APIKEY", val);
        }

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        let base_url = if use_testnet { TESTNET_URL } else { MAINNET_URL }.to_string();
        debug!(base_url = %base_url, "BinanceClient initialised");

        Self {
            secret,
            base_url,
            client,
            rate_limit: RateLimitGauge::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Signing helpers
    // -------------------------------------------------------------------------

    /// Produce an HMAC-SHA256 hex signature of `query`.
    fn sign(&self, query: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Current UNIX timestamp in milliseconds.
    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    /// Build the full query string for a signed request (appends timestamp,
    /// recvWindow, and signature).
    fn signed_query(&self, params: &str) -> String {
        let ts = Self::timestamp_ms();
        let base = if params.is_empty() {
            format!("timestamp={ts}&recvWindow={RECV_WINDOW}")
        } else {
            format!("{params}&timestamp={ts}&recvWindow={RECV_WINDOW}")
        };
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    /// Send a prepared request, feed the rate-limit gauge, and parse JSON.
    async fn send_json(
        &self,
        req: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<serde_json::Value> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("{what} request failed"))?;

        self.rate_limit.observe_headers(resp.headers());

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {what} response"))?;

        if !status.is_success() {
            anyhow::bail!("Binance {what} returned {status}: {body}");
        }
        Ok(body)
    }

    // -------------------------------------------------------------------------
    // Account / balances
    // -------------------------------------------------------------------------

    /// GET /api/v3/account (signed) — all non-zero balances.
    #[instrument(skip(self), name = "binance::get_balances")]
    pub async fn get_balances(&self) -> Result<Vec<BalanceInfo>> {
        let qs = self.signed_query("");
        let url = format!("{}/api/v3/account?{}", self.base_url, qs);
        let body = self.send_json(self.client.get(&url), "GET /api/v3/account").await?;

        let raw = body["balances"]
            .as_array()
            .context("account response missing 'balances' array")?;

        let mut balances = Vec::new();
        for b in raw {
            let asset = b["asset"].as_str().unwrap_or("").to_string();
            let free: f64 = b["free"].as_str().unwrap_or("0").parse().unwrap_or(0.0);
            let locked: f64 = b["locked"].as_str().unwrap_or("0").parse().unwrap_or(0.0);
            if free > 0.0 || locked > 0.0 {
                balances.push(BalanceInfo { asset, free, locked });
            }
        }

        debug!(count = balances.len(), "balances retrieved");
        Ok(balances)
    }

    /// Convenience: the free balance for a single `asset` (0.0 when absent).
    #[instrument(skip(self), name = "binance::get_free_balance")]
    pub async fn get_free_balance(&self, asset: &str) -> Result<f64> {
        let balances = self.get_balances().await?;
        Ok(balances
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free)
            .unwrap_or(0.0))
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /api/v3/klines (public).
    ///
    /// Array indices:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime, [7] quoteAssetVolume, [8] numberOfTrades,
    ///   [9] takerBuyBaseVolume, [10] takerBuyQuoteVolume
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );
        let body = self.send_json(self.client.get(&url), "GET /api/v3/klines").await?;

        let raw = body.as_array().context("klines response is not an array")?;
        let mut candles = Vec::with_capacity(raw.len());

        for entry in raw {
            let arr = entry.as_array().context("kline entry is not an array")?;
            if arr.len() < 7 {
                warn!("skipping malformed kline entry with {} elements", arr.len());
                continue;
            }

            candles.push(Candle {
                open_time: arr[0].as_i64().unwrap_or(0),
                open: parse_str_f64(&arr[1])?,
                high: parse_str_f64(&arr[2])?,
                low: parse_str_f64(&arr[3])?,
                close: parse_str_f64(&arr[4])?,
                volume: parse_str_f64(&arr[5])?,
                close_time: arr[6].as_i64().unwrap_or(0),
            });
        }

        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    /// GET /api/v3/ticker/price (public) — latest trade price.
    #[instrument(skip(self), name = "binance::get_ticker_price")]
    pub async fn get_ticker_price(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, symbol);
        let body = self
            .send_json(self.client.get(&url), "GET /api/v3/ticker/price")
            .await?;
        parse_str_f64(&body["price"]).context("ticker response missing price")
    }

    /// GET /api/v3/exchangeInfo filtered by symbol.
    ///
    /// Returns `tradeable = false` (rather than an error) when the symbol is
    /// unknown to the exchange, so callers can treat "does not exist" and
    /// "not currently trading" uniformly.
    #[instrument(skip(self), name = "binance::get_symbol_info")]
    pub async fn get_symbol_info(&self, symbol: &str) -> Result<SymbolRules> {
        let url = format!("{}/api/v3/exchangeInfo?symbol={}", self.base_url, symbol);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/exchangeInfo request failed")?;
        self.rate_limit.observe_headers(resp.headers());

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse exchangeInfo response")?;

        // Binance answers 400 with code -1121 for unknown symbols.
        if status == reqwest::StatusCode::BAD_REQUEST
            && body["code"].as_i64() == Some(-1121)
        {
            debug!(symbol, "symbol unknown to exchange");
            return Ok(SymbolRules {
                tradeable: false,
                lot_step: 0.0,
                min_notional: 0.0,
            });
        }
        if !status.is_success() {
            anyhow::bail!("Binance GET /api/v3/exchangeInfo returned {status}: {body}");
        }

        let info = body["symbols"]
            .as_array()
            .and_then(|arr| arr.first())
            .context("symbol not found in exchangeInfo response")?;

        parse_symbol_rules(info)
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    /// POST /api/v3/order (signed) — market BUY by quote amount.
    ///
    /// `quote_usdt` is spent via `quoteOrderQty`; the exchange computes the
    /// base quantity at fill time. Rejects below the symbol's min notional.
    #[instrument(skip(self, rules), name = "binance::market_buy")]
    pub async fn market_buy(
        &self,
        symbol: &str,
        quote_usdt: f64,
        rules: &SymbolRules,
    ) -> Result<OrderResult> {
        if quote_usdt < rules.min_notional {
            anyhow::bail!(
                "buy of {quote_usdt:.2} USDT is below min notional {:.2} for {symbol}",
                rules.min_notional
            );
        }

        let client_order_id = Uuid::new_v4().to_string();
        let params = format!(
            "symbol={symbol}&side=BUY&type=MARKET&quoteOrderQty={quote_usdt:.2}&newClientOrderId={client_order_id}"
        );
        let qs = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{}", self.base_url, qs);

        debug!(symbol, quote_usdt, "placing market buy");
        let body = self.send_json(self.client.post(&url), "POST /api/v3/order").await?;
        let result = OrderResult::from_response(&body)?;

        debug!(
            symbol,
            executed_qty = result.executed_qty,
            avg_fill_price = result.avg_fill_price,
            status = %result.status,
            "market buy filled"
        );
        Ok(result)
    }

    /// POST /api/v3/order (signed) — market SELL of a base quantity.
    ///
    /// The quantity is quantized down to the symbol's lot step; the resulting
    /// notional is checked against min notional at the current ticker price,
    /// so dust can never reach the wire.
    #[instrument(skip(self, rules), name = "binance::market_sell")]
    pub async fn market_sell(
        &self,
        symbol: &str,
        base_qty: f64,
        rules: &SymbolRules,
    ) -> Result<OrderResult> {
        let qty = quantize_to_step(base_qty, rules.lot_step);
        if qty <= 0.0 {
            anyhow::bail!("sell qty {base_qty} quantizes to zero for {symbol}");
        }

        let price = self.get_ticker_price(symbol).await?;
        if qty * price < rules.min_notional {
            anyhow::bail!(
                "sell notional {:.2} is below min notional {:.2} for {symbol}",
                qty * price,
                rules.min_notional
            );
        }

        let client_order_id = Uuid::new_v4().to_string();
        let qty_str = format_qty(qty, rules.lot_step);
        let params = format!(
            "symbol={symbol}&side=SELL&type=MARKET&quantity={qty_str}&newClientOrderId={client_order_id}"
        );
        let qs = self.signed_query(&params);
        let url = format!("{}/api/v3/order?{}", self.base_url, qs);

        debug!(symbol, qty = %qty_str, "placing market sell");
        let body = self.send_json(self.client.post(&url), "POST /api/v3/order").await?;
        let result = OrderResult::from_response(&body)?;

        debug!(
            symbol,
            executed_qty = result.executed_qty,
            cumulative_quote_qty = result.cumulative_quote_qty,
            status = %result.status,
            "market sell filled"
        );
        Ok(result)
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_rounds_down_to_step() {
        assert!((quantize_to_step(0.10567, 0.001) - 0.105).abs() < 1e-12);
        assert!((quantize_to_step(1.999, 0.01) - 1.99).abs() < 1e-12);
        assert!((quantize_to_step(5.0, 1.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn quantize_survives_float_noise() {
        // 0.3 / 0.1 is 2.9999999999999996 in f64; must still yield 0.3.
        assert!((quantize_to_step(0.3, 0.1) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn quantize_zero_step_passthrough() {
        assert_eq!(quantize_to_step(0.123, 0.0), 0.123);
    }

    #[test]
    fn format_qty_matches_step_precision() {
        assert_eq!(format_qty(0.105, 0.001), "0.105");
        assert_eq!(format_qty(5.0, 1.0), "5");
        assert_eq!(format_qty(0.5, 0.5), "0.5");
        assert_eq!(format_qty(1.23, 0.01), "1.23");
    }

    #[test]
    fn order_result_from_fill_response() {
        let body = serde_json::json!({
            "symbol": "SOLUSDT",
            "status": "FILLED",
            "executedQty": "0.58400000",
            "cummulativeQuoteQty": "99.98000000"
        });
        let result = OrderResult::from_response(&body).unwrap();
        assert!((result.executed_qty - 0.584).abs() < 1e-9);
        assert!((result.cumulative_quote_qty - 99.98).abs() < 1e-9);
        assert!((result.avg_fill_price - 99.98 / 0.584).abs() < 1e-9);
        assert_eq!(result.status, "FILLED");
    }

    #[test]
    fn order_result_zero_fill_has_zero_price() {
        let body = serde_json::json!({
            "status": "EXPIRED",
            "executedQty": "0.00000000",
            "cummulativeQuoteQty": "0.00000000"
        });
        let result = OrderResult::from_response(&body).unwrap();
        assert_eq!(result.avg_fill_price, 0.0);
    }

    #[test]
    fn symbol_rules_from_exchange_info() {
        let info = serde_json::json!({
            "symbol": "ADAUSDT",
            "status": "TRADING",
            "filters": [
                { "filterType": "PRICE_FILTER", "tickSize": "0.00010000" },
                { "filterType": "LOT_SIZE", "stepSize": "0.10000000", "minQty": "0.10" },
                { "filterType": "NOTIONAL", "minNotional": "5.00000000" }
            ]
        });
        let rules = parse_symbol_rules(&info).unwrap();
        assert!(rules.tradeable);
        assert!((rules.lot_step - 0.1).abs() < 1e-12);
        assert!((rules.min_notional - 5.0).abs() < 1e-12);
    }

    #[test]
    fn symbol_rules_halted_symbol_not_tradeable() {
        let info = serde_json::json!({
            "symbol": "XYZUSDT",
            "status": "BREAK",
            "filters": [
                { "filterType": "LOT_SIZE", "stepSize": "1.00000000" },
                { "filterType": "MIN_NOTIONAL", "minNotional": "10.00000000" }
            ]
        });
        let rules = parse_symbol_rules(&info).unwrap();
        assert!(!rules.tradeable);
        assert!((rules.min_notional - 10.0).abs() < 1e-12);
    }

    #[test]
    fn signing_is_deterministic_hex() {
        let client = BinanceClient::new("key", "secret", true);
        let sig1 = client.sign("symbol=BTCUSDT&timestamp=1");
        let sig2 = client.sign("symbol=BTCUSDT&timestamp=1");
        assert_eq!(sig1, sig2);
        assert_eq!(sig1.len(), 64);
        assert!(sig1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn debug_redacts_secret() {
        let client = BinanceClient::new("key", "supersecret", false);
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains("<redacted>"));
    }
}
