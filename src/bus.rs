// =============================================================================
// SubscriptionBus — best-effort fan-out of normalized stream messages
// =============================================================================
//
// Rooms are keyed by stream key. Delivery uses `try_send` on a bounded
// per-subscriber channel: a subscriber that is full or gone simply loses that
// tick. The bus never decides when upstream connections open or close; call
// sites combine `subscriber_count` with the manager for that.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::stream::key::StreamKey;
use crate::stream::message::NormalizedMessage;

/// Per-subscriber channel capacity. A consumer more than this many ticks
/// behind starts losing messages.
const SUBSCRIBER_BUFFER: usize = 64;

/// Proof of one active subscription; required to unsubscribe.
#[derive(Debug)]
pub struct SubscriberToken {
    id: Uuid,
    key: StreamKey,
}

impl SubscriberToken {
    pub fn key(&self) -> &StreamKey {
        &self.key
    }
}

#[derive(Default)]
pub struct SubscriptionBus {
    rooms: RwLock<HashMap<StreamKey, HashMap<Uuid, mpsc::Sender<NormalizedMessage>>>>,
}

impl SubscriptionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer under `key`. Independent of whether an upstream
    /// connection for that key exists.
    pub fn subscribe(
        &self,
        key: &StreamKey,
    ) -> (SubscriberToken, mpsc::Receiver<NormalizedMessage>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = Uuid::new_v4();
        self.rooms
            .write()
            .entry(key.clone())
            .or_default()
            .insert(id, tx);
        debug!(key = %key, subscriber = %id, "bus subscriber added");
        (
            SubscriberToken {
                id,
                key: key.clone(),
            },
            rx,
        )
    }

    /// Remove the subscription behind `token`. A second call with a token
    /// from an already-empty room is a no-op.
    pub fn unsubscribe(&self, token: &SubscriberToken) {
        let mut rooms = self.rooms.write();
        if let Some(room) = rooms.get_mut(&token.key) {
            room.remove(&token.id);
            if room.is_empty() {
                rooms.remove(&token.key);
            }
        }
        debug!(key = %token.key, subscriber = %token.id, "bus subscriber removed");
    }

    /// Deliver `msg` to every consumer registered under `key`, best-effort.
    pub fn publish(&self, key: &StreamKey, msg: NormalizedMessage) {
        let rooms = self.rooms.read();
        let Some(room) = rooms.get(key) else {
            return;
        };
        for (id, tx) in room {
            if tx.try_send(msg.clone()).is_err() {
                debug!(key = %key, subscriber = %id, "dropping tick for unavailable subscriber");
            }
        }
    }

    /// Number of consumers currently registered under `key`.
    pub fn subscriber_count(&self, key: &StreamKey) -> usize {
        self.rooms.read().get(key).map_or(0, HashMap::len)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::message::TickerSnapshot;

    fn sample_msg(price: f64) -> NormalizedMessage {
        NormalizedMessage::Ticker(TickerSnapshot {
            symbol: "BTCUSDT".into(),
            price,
            price_change_percent: 0.0,
        })
    }

    #[tokio::test]
    async fn fan_out_reaches_every_subscriber() {
        let bus = SubscriptionBus::new();
        let key = StreamKey::ticker_all();

        let (_t1, mut rx1) = bus.subscribe(&key);
        let (_t2, mut rx2) = bus.subscribe(&key);
        assert_eq!(bus.subscriber_count(&key), 2);

        bus.publish(&key, sample_msg(1.0));
        assert_eq!(rx1.recv().await, Some(sample_msg(1.0)));
        assert_eq!(rx2.recv().await, Some(sample_msg(1.0)));
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = SubscriptionBus::new();
        let key = StreamKey::kline("BTCUSDT", "1m");

        let (token, mut rx) = bus.subscribe(&key);
        bus.unsubscribe(&token);
        assert_eq!(bus.subscriber_count(&key), 0);

        bus.publish(&key, sample_msg(1.0));
        // Sender side is gone; the channel yields None rather than a message.
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn publish_without_room_is_a_noop() {
        let bus = SubscriptionBus::new();
        bus.publish(&StreamKey::ticker_all(), sample_msg(1.0));
    }

    #[test]
    fn rooms_are_isolated_by_key() {
        let bus = SubscriptionBus::new();
        let kline = StreamKey::kline("BTCUSDT", "1m");
        let ticker = StreamKey::ticker_all();

        let (_t, mut kline_rx) = bus.subscribe(&kline);
        bus.publish(&ticker, sample_msg(1.0));
        assert!(kline_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_subscriber_loses_ticks_without_blocking() {
        let bus = SubscriptionBus::new();
        let key = StreamKey::ticker_all();
        let (_token, mut rx) = bus.subscribe(&key);

        // Publish past the buffer without draining; the overflow is dropped.
        for i in 0..(SUBSCRIBER_BUFFER + 10) {
            bus.publish(&key, sample_msg(i as f64));
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_BUFFER);
    }
}
