// =============================================================================
// Message Normalization — raw upstream payloads to one tagged union
// =============================================================================
//
// The two feed kinds emit very different JSON shapes: the kline stream sends
// one event object per tick, the ticker stream sends an array of per-symbol
// snapshots. Everything downstream of the connection sees only
// `NormalizedMessage`.
// =============================================================================

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;

use crate::stream::key::{StreamKey, StreamKind};

/// One candlestick update from a `<symbol>@kline_<interval>` feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KlineUpdate {
    pub symbol: String,
    pub interval: String,
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
    pub is_closed: bool,
}

/// One per-symbol snapshot from the `!ticker@arr` feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub price: f64,
    pub price_change_percent: f64,
}

/// Normalized form of every inbound stream payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedMessage {
    Kline(KlineUpdate),
    Ticker(TickerSnapshot),
    TickerBatch { tickers: Vec<TickerSnapshot> },
}

/// Normalize a raw text frame according to the feed kind of `key`.
///
/// A malformed payload is an error for the caller to drop and log; it must
/// never tear down the connection.
pub fn normalize(key: &StreamKey, text: &str) -> Result<NormalizedMessage> {
    match key.kind {
        StreamKind::Kline => parse_kline(text).map(NormalizedMessage::Kline),
        StreamKind::TickerAll => {
            parse_ticker_array(text).map(|tickers| NormalizedMessage::TickerBatch { tickers })
        }
    }
}

/// Parse a kline event.
///
/// Expected shape (single stream; the combined-stream `data` envelope is also
/// accepted):
/// ```json
/// { "e": "kline", "s": "BTCUSDT", "k": { "i": "1m", "t": ..., "o": "...", ... } }
/// ```
fn parse_kline(text: &str) -> Result<KlineUpdate> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse kline JSON")?;

    let data = if root.get("data").is_some() {
        &root["data"]
    } else {
        &root
    };

    let symbol = data["s"]
        .as_str()
        .context("missing field s")?
        .to_uppercase();

    let k = &data["k"];

    let interval = k["i"]
        .as_str()
        .context("missing field k.i")?
        .to_string();

    let open_time = k["t"].as_i64().context("missing field k.t")?;
    let close_time = k["T"].as_i64().context("missing field k.T")?;
    let is_closed = k["x"].as_bool().context("missing field k.x")?;

    Ok(KlineUpdate {
        symbol,
        interval,
        open_time,
        open: parse_string_f64(&k["o"], "k.o")?,
        high: parse_string_f64(&k["h"], "k.h")?,
        low: parse_string_f64(&k["l"], "k.l")?,
        close: parse_string_f64(&k["c"], "k.c")?,
        volume: parse_string_f64(&k["v"], "k.v")?,
        close_time,
        is_closed,
    })
}

/// Parse a `!ticker@arr` payload: a JSON array of per-symbol 24-hour ticker
/// objects. Malformed entries are skipped with a warning; the batch is only
/// an error when the payload is not an array at all.
fn parse_ticker_array(text: &str) -> Result<Vec<TickerSnapshot>> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse ticker JSON")?;

    let entries = root
        .as_array()
        .context("ticker payload is not an array")?;

    let mut tickers = Vec::with_capacity(entries.len());
    for entry in entries {
        match parse_ticker_entry(entry) {
            Ok(snapshot) => tickers.push(snapshot),
            Err(e) => warn!(error = %e, "skipping malformed ticker entry"),
        }
    }
    Ok(tickers)
}

fn parse_ticker_entry(entry: &serde_json::Value) -> Result<TickerSnapshot> {
    Ok(TickerSnapshot {
        symbol: entry["s"]
            .as_str()
            .context("missing field s")?
            .to_uppercase(),
        price: parse_string_f64(&entry["c"], "c")?,
        price_change_percent: parse_string_f64(&entry["P"], "P")?,
    })
}

/// Helper: the exchange sends numeric values as JSON strings inside stream
/// payloads.
fn parse_string_f64(val: &serde_json::Value, name: &str) -> Result<f64> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}")),
        serde_json::Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64")),
        _ => anyhow::bail!("field {name} has unexpected JSON type"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
