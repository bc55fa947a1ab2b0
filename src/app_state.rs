// =============================================================================
// Shared Application State
// =============================================================================

use std::sync::Arc;

use crate::binance::MarketDataClient;
use crate::bus::SubscriptionBus;
use crate::config::AppConfig;
use crate::stream::StreamManager;

/// Shared across every request handler and socket task via `Arc<AppState>`.
pub struct AppState {
    pub config: AppConfig,
    pub market: Arc<MarketDataClient>,
    pub streams: Arc<StreamManager>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        market: Arc<MarketDataClient>,
        streams: Arc<StreamManager>,
    ) -> Self {
        Self {
            config,
            market,
            streams,
        }
    }

    pub fn bus(&self) -> &Arc<SubscriptionBus> {
        self.streams.bus()
    }
}
