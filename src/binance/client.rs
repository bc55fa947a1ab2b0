// =============================================================================
// Market Data REST Client — public (unsigned) exchange endpoints
// =============================================================================
//
// Request/response only; nothing here is streamed and nothing is signed. A
// network failure is an explicit `Err` for the caller to degrade on -- the
// streaming core never treats it as fatal.
// =============================================================================

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, instrument, warn};

/// Default REST base URL (public market-data mirror, no API key required).
pub const DEFAULT_REST_BASE_URL: &str = "https://data-api.binance.vision";

/// One OHLCV candlestick from the klines endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

/// One entry from the ticker price list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: f64,
}

#[derive(Clone)]
pub struct MarketDataClient {
    base_url: String,
    client: reqwest::Client,
}

impl MarketDataClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    /// Shared GET helper: issues the request and returns the JSON body,
    /// bailing on a non-success status.
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);

        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {path} request failed"))?;

        // Status first: an error body is often not JSON (HTML from a proxy,
        // plain text from a rate limiter) and must surface as the status
        // error, not as a parse failure.
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET {} returned {}: {}", path, status, body);
        }

        resp.json()
            .await
            .with_context(|| format!("failed to parse {path} response"))
    }

    /// GET /api/v3/ping — connectivity check.
    pub async fn ping(&self) -> Result<bool> {
        let url = format!("{}/api/v3/ping", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/ping request failed")?;
        Ok(resp.status().is_success())
    }

    /// GET /api/v3/ticker/price — latest price for every symbol.
    ///
    /// Malformed entries are skipped so one bad row never hides the rest of
    /// the list.
    #[instrument(skip(self), name = "market::get_ticker_prices")]
    pub async fn get_ticker_prices(&self) -> Result<Vec<TickerPrice>> {
        let body = self.get_json("/api/v3/ticker/price", &[]).await?;

        let raw = body
            .as_array()
            .context("ticker price response is not an array")?;

        let mut prices = Vec::with_capacity(raw.len());
        for entry in raw {
            match parse_ticker_price(entry) {
                Ok(price) => prices.push(price),
                Err(e) => warn!(error = %e, "skipping malformed ticker price entry"),
            }
        }

        debug!(count = prices.len(), "ticker prices fetched");
        Ok(prices)
    }

    /// GET /api/v3/klines — candlestick history, oldest first.
    #[instrument(skip(self), name = "market::get_klines")]
    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let body = self
            .get_json(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_uppercase()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let raw = body
            .as_array()
            .context("klines response is not an array")?;

        let mut candles = Vec::with_capacity(raw.len());
        for entry in raw {
            match parse_kline_row(entry) {
                Ok(candle) => candles.push(candle),
                Err(e) => warn!(error = %e, "skipping malformed kline entry"),
            }
        }

        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    /// GET /api/v3/ticker/24hr — rolling 24-hour stats, for one symbol or
    /// the whole market.
    #[instrument(skip(self), name = "market::get_ticker_24hr")]
    pub async fn get_ticker_24hr(&self, symbol: Option<&str>) -> Result<serde_json::Value> {
        let query = match symbol {
            Some(s) => vec![("symbol", s.to_uppercase())],
            None => Vec::new(),
        };
        self.get_json("/api/v3/ticker/24hr", &query).await
    }

    /// GET /api/v3/depth — order-book snapshot.
    #[instrument(skip(self), name = "market::get_depth")]
    pub async fn get_depth(&self, symbol: &str, limit: u32) -> Result<serde_json::Value> {
        self.get_json(
            "/api/v3/depth",
            &[
                ("symbol", symbol.to_uppercase()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    /// GET /api/v3/exchangeInfo — symbol metadata, optionally filtered.
    #[instrument(skip(self), name = "market::get_exchange_info")]
    pub async fn get_exchange_info(&self, symbol: Option<&str>) -> Result<serde_json::Value> {
        let query = match symbol {
            Some(s) => vec![("symbol", s.to_uppercase())],
            None => Vec::new(),
        };
        self.get_json("/api/v3/exchangeInfo", &query).await
    }
}

impl std::fmt::Debug for MarketDataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// =============================================================================
// Parsing helpers
// =============================================================================

fn parse_ticker_price(entry: &serde_json::Value) -> Result<TickerPrice> {
    Ok(TickerPrice {
        symbol: entry["symbol"]
            .as_str()
            .context("missing field symbol")?
            .to_uppercase(),
        price: parse_str_f64(&entry["price"])?,
    })
}

/// Parse one row of the klines array-of-arrays response.
///
/// Array indices:
///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
///   [6] closeTime, ... (remaining fields unused)
fn parse_kline_row(entry: &serde_json::Value) -> Result<Candle> {
    let arr = entry.as_array().context("kline entry is not an array")?;
    if arr.len() < 7 {
        anyhow::bail!("kline entry has only {} elements", arr.len());
    }

    Ok(Candle {
        open_time: arr[0].as_i64().context("invalid openTime")?,
        open: parse_str_f64(&arr[1])?,
        high: parse_str_f64(&arr[2])?,
        low: parse_str_f64(&arr[3])?,
        close: parse_str_f64(&arr[4])?,
        volume: parse_str_f64(&arr[5])?,
        close_time: arr[6].as_i64().context("invalid closeTime")?,
    })
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

// =============================================================================
// Tests
// =============================================================================
