// =============================================================================
// CoinPulse — Main Entry Point
// =============================================================================
//
// Boots the local API server, opens the startup market-data streams, and runs
// until Ctrl+C. All trading-free: this service only observes the market.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod binance;
mod bus;
mod config;
mod indicators;
mod stream;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::binance::MarketDataClient;
use crate::bus::SubscriptionBus;
use crate::config::AppConfig;
use crate::stream::{BinanceWsTransport, StreamKey, StreamManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        CoinPulse Market Streamer — Starting Up          ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = AppConfig::load("coinpulse.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Override symbols and bind address from env if available.
    if let Ok(syms) = std::env::var("COINPULSE_SYMBOLS") {
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(addr) = std::env::var("COINPULSE_BIND_ADDR") {
        config.bind_addr = addr;
    }

    info!(symbols = ?config.symbols, interval = %config.default_interval, "Configured startup streams");

    // ── 2. Build shared components ───────────────────────────────────────
    let market = Arc::new(MarketDataClient::new(&config.rest_base_url)?);
    let bus = Arc::new(SubscriptionBus::new());
    let transport = Arc::new(BinanceWsTransport::new(&config.ws_base_url));
    let streams = Arc::new(StreamManager::new(transport, bus));

    // ── 3. Open the startup streams ──────────────────────────────────────
    streams.start(StreamKey::ticker_all());
    for symbol in &config.symbols {
        streams.start(StreamKey::kline(symbol, &config.default_interval));
    }
    info!(count = streams.active_keys().len(), "Market data streams launched");

    // ── 4. Start the API server ──────────────────────────────────────────
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config, market, streams.clone()));

    let app = api::rest::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "API server listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "API server exited");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    streams.stop_all();
    info!("CoinPulse shut down complete.");
    Ok(())
}
