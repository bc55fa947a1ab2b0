// =============================================================================
// WebSocket Handler — local fan-out of normalized stream messages
// =============================================================================
//
// Clients connect to `/ws` and drive their subscriptions with JSON actions:
//
//   { "action": "subscribe",          "symbol": "BTCUSDT", "interval": "1m" }
//   { "action": "unsubscribe",        "symbol": "BTCUSDT", "interval": "1m" }
//   { "action": "subscribe_ticker",   "symbols": ["BTCUSDT"] }   // filter optional
//   { "action": "unsubscribe_ticker" }
//
// Subscribe implies starting the upstream connection; when the last local
// consumer of a key unsubscribes, the upstream connection is stopped.
// Delivery is best-effort: a client that cannot keep up loses ticks, and
// reconnect windows show up as silent gaps, never as error frames.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::bus::SubscriberToken;
use crate::stream::{NormalizedMessage, StreamKey};

/// Per-client outbound buffer; a client further behind than this loses ticks.
const OUTBOUND_BUFFER: usize = 64;

// =============================================================================
// Client protocol
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientAction {
    Subscribe {
        symbol: String,
        interval: Option<String>,
    },
    Unsubscribe {
        symbol: String,
        interval: Option<String>,
    },
    SubscribeTicker {
        #[serde(default)]
        symbols: Vec<String>,
    },
    UnsubscribeTicker,
}

// =============================================================================
// Upgrade handler
// =============================================================================

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    info!("WebSocket client connected — upgrading");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

// =============================================================================
// Connection handler
// =============================================================================

struct Subscription {
    token: SubscriberToken,
    relay: JoinHandle<()>,
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // One outbound channel per client; relay tasks feed it, the writer task
    // drains it onto the socket.
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut subs: HashMap<StreamKey, Subscription> = HashMap::new();

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientAction>(&text) {
                Ok(action) => apply_action(&state, &mut subs, &out_tx, action),
                Err(e) => {
                    debug!(error = %e, "ignoring unrecognised client message");
                }
            },
            Ok(Message::Ping(data)) => {
                if out_tx.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Binary(_)) => {
                debug!("WebSocket binary message ignored");
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket Close frame received — disconnecting");
                break;
            }
            Err(e) => {
                warn!(error = %e, "WebSocket receive error — disconnecting");
                break;
            }
        }
    }

    for (key, sub) in subs.drain() {
        teardown(&state, &key, sub);
    }
    writer.abort();
    info!("WebSocket client disconnected — cleanup complete");
}

fn apply_action(
    state: &Arc<AppState>,
    subs: &mut HashMap<StreamKey, Subscription>,
    out_tx: &mpsc::Sender<Message>,
    action: ClientAction,
) {
    match action {
        ClientAction::Subscribe { symbol, interval } => {
            let interval = interval.unwrap_or_else(|| state.config.default_interval.clone());
            let key = StreamKey::kline(&symbol, &interval);
            add_subscription(state, subs, out_tx, key, None);
        }
        ClientAction::Unsubscribe { symbol, interval } => {
            let interval = interval.unwrap_or_else(|| state.config.default_interval.clone());
            let key = StreamKey::kline(&symbol, &interval);
            if let Some(sub) = subs.remove(&key) {
                teardown(state, &key, sub);
            }
        }
        ClientAction::SubscribeTicker { symbols } => {
            let filter = if symbols.is_empty() {
                None
            } else {
                Some(
                    symbols
                        .into_iter()
                        .map(|s| s.to_uppercase())
                        .collect::<HashSet<_>>(),
                )
            };
            let key = StreamKey::ticker_all();
            // Re-subscribing replaces any previous filter.
            if let Some(sub) = subs.remove(&key) {
                teardown(state, &key, sub);
            }
            add_subscription(state, subs, out_tx, key, filter);
        }
        ClientAction::UnsubscribeTicker => {
            let key = StreamKey::ticker_all();
            if let Some(sub) = subs.remove(&key) {
                teardown(state, &key, sub);
            }
        }
    }
}

/// Subscribe implies start. An invalid key is reported back to this client
/// synchronously; nothing is registered.
fn add_subscription(
    state: &Arc<AppState>,
    subs: &mut HashMap<StreamKey, Subscription>,
    out_tx: &mpsc::Sender<Message>,
    key: StreamKey,
    filter: Option<HashSet<String>>,
) {
    if subs.contains_key(&key) {
        return;
    }

    // Bus registration comes first: a concurrent teardown's last-consumer
    // check must be able to see this client before the feed is started.
    let (token, rx) = state.bus().subscribe(&key);

    if !state.streams.start(key.clone()) {
        state.bus().unsubscribe(&token);
        let err = serde_json::json!({
            "event": "error",
            "message": "invalid stream subscription",
        });
        let _ = out_tx.try_send(Message::Text(err.to_string()));
        return;
    }

    let relay = tokio::spawn(relay_messages(key.clone(), filter, rx, out_tx.clone()));
    subs.insert(key, Subscription { token, relay });
}

fn teardown(state: &Arc<AppState>, key: &StreamKey, sub: Subscription) {
    sub.relay.abort();
    state.bus().unsubscribe(&sub.token);
    // Last consumer out closes the upstream connection; the manager checks
    // the bus under its registry lock.
    state.streams.stop_if_unused(key);
}

// =============================================================================
// Relay
// =============================================================================

/// Forward bus messages for one subscription onto the client's outbound
/// channel. A symbol filter (ticker subscriptions only) turns batches into
/// individual snapshot events.
async fn relay_messages(
    key: StreamKey,
    filter: Option<HashSet<String>>,
    mut rx: mpsc::Receiver<NormalizedMessage>,
    out_tx: mpsc::Sender<Message>,
) {
    while let Some(msg) = rx.recv().await {
        match (&filter, &msg) {
            (Some(symbols), NormalizedMessage::TickerBatch { tickers }) => {
                for snapshot in tickers.iter().filter(|t| symbols.contains(&t.symbol)) {
                    if !forward(&key, &NormalizedMessage::Ticker(snapshot.clone()), &out_tx) {
                        return;
                    }
                }
            }
            _ => {
                if !forward(&key, &msg, &out_tx) {
                    return;
                }
            }
        }
    }
}

/// Best-effort: a full outbound buffer drops the tick; a closed channel ends
/// the relay. Returns `false` when the client is gone.
fn forward(key: &StreamKey, msg: &NormalizedMessage, out_tx: &mpsc::Sender<Message>) -> bool {
    let event = serde_json::json!({
        "stream": key.to_string(),
        "data": msg,
        "ts": Utc::now().timestamp_millis(),
    });
    match out_tx.try_send(Message::Text(event.to_string())) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!(key = %key, "dropping tick for slow client");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

// =============================================================================
// Tests
// =============================================================================
