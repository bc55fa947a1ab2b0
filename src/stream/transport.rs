// =============================================================================
// Stream Transport — the seam between the state machine and the network
// =============================================================================

use std::pin::Pin;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tracing::info;

use crate::stream::key::StreamKey;

/// Text frames from one live upstream connection. The stream ends (`None`)
/// when the peer closes, or yields an `Err` on a transport fault; either way
/// the supervising connection decides what happens next.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One dial attempt per call; the per-connection supervisor owns retries.
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    async fn connect(&self, key: &StreamKey) -> Result<FrameStream>;
}

/// Production transport: dials `wss://<host>/ws/<wire-name>` and yields the
/// text frames. Ping/Pong/Binary frames never reach the state machine --
/// tungstenite answers pings on its own.
pub struct BinanceWsTransport {
    ws_base_url: String,
}

impl BinanceWsTransport {
    /// `ws_base_url` is the prefix up to and including `/ws`, e.g.
    /// `wss://stream.binance.com:9443/ws`.
    pub fn new(ws_base_url: impl Into<String>) -> Self {
        Self {
            ws_base_url: ws_base_url.into(),
        }
    }
}

#[async_trait]
impl StreamTransport for BinanceWsTransport {
    async fn connect(&self, key: &StreamKey) -> Result<FrameStream> {
        let name = key
            .stream_name()
            .context("cannot open a stream for an invalid key")?;
        let url = format!("{}/{}", self.ws_base_url, name);

        info!(url = %url, "connecting to upstream WebSocket");
        let (ws_stream, _response) = connect_async(&url)
            .await
            .with_context(|| format!("failed to connect to upstream feed {name}"))?;

        let (_write, read) = ws_stream.split();
        let frames = read.filter_map(|msg| async move {
            match msg {
                Ok(tokio_tungstenite::tungstenite::Message::Text(text)) => Some(Ok(text)),
                Ok(_) => None,
                Err(e) => Some(Err(e.into())),
            }
        });

        Ok(Box::pin(frames))
    }
}
