// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Thin request/response layer over the market-data client, the indicator
// functions, and the stream manager. Upstream REST failures degrade to
// data-shaped fallbacks instead of surfacing as 5xx wherever the dashboard
// polls for data.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use crate::app_state::AppState;
use crate::indicators;
use crate::stream::{StreamKey, TickerSnapshot};

/// Cap on the merged price list, matching the dashboard's row budget.
const MAX_PRICE_ROWS: usize = 100;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/prices", get(get_prices))
        .route("/api/klines/:symbol", get(get_klines))
        .route("/api/market-stats", get(get_market_stats))
        .route("/api/depth/:symbol", get(get_depth))
        .route("/api/exchange-info", get(get_exchange_info))
        // ── Stream control ──────────────────────────────────────────
        .route("/api/stream/start/tickers", get(start_ticker_stream))
        .route("/api/stream/stop/tickers", get(stop_ticker_stream))
        .route("/api/stream/start/:symbol", get(start_symbol_stream))
        .route("/api/stream/stop/:symbol", get(stop_symbol_stream))
        // ── WebSocket fan-out ───────────────────────────────────────
        .route("/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Query parameters
// =============================================================================

#[derive(Deserialize)]
struct KlinesQuery {
    interval: Option<String>,
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct SymbolQuery {
    symbol: Option<String>,
}

#[derive(Deserialize)]
struct DepthQuery {
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct IntervalQuery {
    interval: Option<String>,
}

// =============================================================================
// Prices
// =============================================================================

/// All USDT-quoted prices merged with 24-hour change percentages, sorted by
/// change. Upstream failure degrades to an empty list — the dashboard keeps
/// polling and the streaming core is untouched.
async fn get_prices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let prices = match state.market.get_ticker_prices().await {
        Ok(prices) => prices,
        Err(e) => {
            error!(error = %e, "price fetch failed — returning empty list");
            return Json(Vec::<TickerSnapshot>::new());
        }
    };

    let changes = match state.market.get_ticker_24hr(None).await {
        Ok(changes) => changes,
        Err(e) => {
            warn!(error = %e, "24hr stats fetch failed — merging without change data");
            json!([])
        }
    };

    Json(merge_price_feed(prices, &changes))
}

/// Combine the raw price list with per-symbol 24-hour change percentages.
fn merge_price_feed(
    prices: Vec<crate::binance::TickerPrice>,
    changes: &serde_json::Value,
) -> Vec<TickerSnapshot> {
    let mut change_map: HashMap<String, f64> = HashMap::new();
    if let Some(entries) = changes.as_array() {
        for entry in entries {
            let Some(symbol) = entry["symbol"].as_str() else {
                continue;
            };
            let pct = entry["priceChangePercent"]
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
                .or_else(|| entry["priceChangePercent"].as_f64());
            if let Some(pct) = pct {
                change_map.insert(symbol.to_uppercase(), pct);
            }
        }
    }

    let mut merged: Vec<TickerSnapshot> = prices
        .into_iter()
        .filter(|p| p.symbol.ends_with("USDT"))
        .map(|p| TickerSnapshot {
            price_change_percent: change_map.get(&p.symbol).copied().unwrap_or(0.0),
            symbol: p.symbol,
            price: p.price,
        })
        .collect();

    merged.sort_by(|a, b| {
        b.price_change_percent
            .partial_cmp(&a.price_change_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.truncate(MAX_PRICE_ROWS);
    merged
}

// =============================================================================
// Klines + indicators
// =============================================================================

async fn get_klines(
    Path(symbol): Path<String>,
    Query(query): Query<KlinesQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let interval = query.interval.unwrap_or_else(|| "1d".to_string());
    let limit = query.limit.unwrap_or(state.config.default_kline_limit);

    match state.market.get_klines(&symbol, &interval, limit).await {
        Ok(candles) => {
            let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
            // Insufficient history serialises as null, not as an error.
            Json(json!({
                "klines": candles,
                "indicators": {
                    "rsi": indicators::rsi(&closes, indicators::rsi::DEFAULT_PERIOD),
                    "sma_20": indicators::sma(&closes, 20),
                    "sma_50": indicators::sma(&closes, 50),
                    "ema_12": indicators::ema(&closes, 12),
                    "ema_26": indicators::ema(&closes, 26),
                }
            }))
        }
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "kline fetch failed — returning empty payload");
            Json(json!({ "klines": [], "indicators": {} }))
        }
    }
}

// =============================================================================
// Pass-through market data
// =============================================================================

async fn get_market_stats(
    Query(query): Query<SymbolQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    match state.market.get_ticker_24hr(query.symbol.as_deref()).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            warn!(error = %e, "24hr stats fetch failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "failed to fetch 24hr stats" })),
            )
                .into_response()
        }
    }
}

async fn get_depth(
    Path(symbol): Path<String>,
    Query(query): Query<DepthQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(100);
    match state.market.get_depth(&symbol, limit).await {
        Ok(depth) => Json(depth).into_response(),
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "depth fetch failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": format!("failed to fetch depth for {symbol}") })),
            )
                .into_response()
        }
    }
}

async fn get_exchange_info(
    Query(query): Query<SymbolQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    match state
        .market
        .get_exchange_info(query.symbol.as_deref())
        .await
    {
        Ok(info) => Json(info).into_response(),
        Err(e) => {
            warn!(error = %e, "exchange info fetch failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "failed to fetch exchange info" })),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Stream control
// =============================================================================

async fn start_symbol_stream(
    Path(symbol): Path<String>,
    Query(query): Query<IntervalQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let interval = query
        .interval
        .unwrap_or_else(|| state.config.default_interval.clone());
    let success = state.streams.start(StreamKey::kline(&symbol, &interval));
    Json(json!({ "success": success }))
}

async fn stop_symbol_stream(
    Path(symbol): Path<String>,
    Query(query): Query<IntervalQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let interval = query
        .interval
        .unwrap_or_else(|| state.config.default_interval.clone());
    let success = state.streams.stop(&StreamKey::kline(&symbol, &interval));
    Json(json!({ "success": success }))
}

async fn start_ticker_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let success = state.streams.start(StreamKey::ticker_all());
    Json(json!({ "success": success }))
}

async fn stop_ticker_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let success = state.streams.stop(&StreamKey::ticker_all());
    Json(json!({ "success": success }))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binance::TickerPrice;

    fn price(symbol: &str, value: f64) -> TickerPrice {
        TickerPrice {
            symbol: symbol.to_string(),
            price: value,
        }
    }

    #[test]
    fn merge_keeps_only_usdt_quotes() {
        let prices = vec![
            price("BTCUSDT", 37000.0),
            price("ETHBTC", 0.054),
            price("ETHUSDT", 2000.0),
        ];
        let merged = merge_price_feed(prices, &json!([]));
        let symbols: Vec<&str> = merged.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn merge_attaches_change_and_sorts_descending() {
        let prices = vec![
            price("BTCUSDT", 37000.0),
            price("ETHUSDT", 2000.0),
            price("BNBUSDT", 300.0),
        ];
        let changes = json!([
            { "symbol": "BTCUSDT", "priceChangePercent": "1.5" },
            { "symbol": "ETHUSDT", "priceChangePercent": "-0.25" },
            { "symbol": "BNBUSDT", "priceChangePercent": "3.0" }
        ]);
        let merged = merge_price_feed(prices, &changes);
        let symbols: Vec<&str> = merged.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BNBUSDT", "BTCUSDT", "ETHUSDT"]);
        assert!((merged[0].price_change_percent - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn merge_defaults_missing_change_to_zero() {
        let prices = vec![price("BTCUSDT", 37000.0)];
        let merged = merge_price_feed(prices, &json!([]));
        assert!((merged[0].price_change_percent).abs() < f64::EPSILON);
    }

    #[test]
    fn merge_caps_the_row_count() {
        let prices: Vec<TickerPrice> = (0..150)
            .map(|i| price(&format!("SYM{i}USDT"), i as f64))
            .collect();
        let merged = merge_price_feed(prices, &json!([]));
        assert_eq!(merged.len(), MAX_PRICE_ROWS);
    }

    #[test]
    fn merge_tolerates_non_array_change_payload() {
        let prices = vec![price("BTCUSDT", 37000.0)];
        let merged = merge_price_feed(prices, &json!({ "unexpected": "shape" }));
        assert_eq!(merged.len(), 1);
    }

    #[tokio::test]
    async fn price_fetch_failure_degrades_to_an_empty_list() {
        use crate::binance::MarketDataClient;
        use crate::bus::SubscriptionBus;
        use crate::config::AppConfig;
        use crate::stream::{BinanceWsTransport, StreamManager};

        // Nothing listens on this port; the fetch fails with a connect error.
        let market = Arc::new(MarketDataClient::new("http://127.0.0.1:9").unwrap());
        let config = AppConfig::default();
        let bus = Arc::new(SubscriptionBus::new());
        let transport = Arc::new(BinanceWsTransport::new(&config.ws_base_url));
        let streams = Arc::new(StreamManager::new(transport, bus));
        let state = Arc::new(AppState::new(config, market, streams.clone()));

        let response = get_prices(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload, json!([]));

        // The failure never touches the streaming core.
        assert!(streams.active_keys().is_empty());
    }
}
