// =============================================================================
// StreamManager — registry of supervised upstream connections
// =============================================================================
//
// At most one live connection exists per stream key. All registry mutations
// (`start`, `stop`, `stop_all`) hold the single write lock, so concurrent
// `start` calls for the same key can never race two connections into
// existence.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::bus::SubscriptionBus;
use crate::stream::connection::{ConnectionHandle, StreamState, DEFAULT_RETRY_DELAY};
use crate::stream::key::StreamKey;
use crate::stream::transport::StreamTransport;

pub struct StreamManager {
    registry: RwLock<HashMap<StreamKey, ConnectionHandle>>,
    transport: Arc<dyn StreamTransport>,
    bus: Arc<SubscriptionBus>,
    retry_delay: Duration,
}

impl StreamManager {
    pub fn new(transport: Arc<dyn StreamTransport>, bus: Arc<SubscriptionBus>) -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            transport,
            bus,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Override the fixed reconnect delay. Production keeps the 5-second
    /// default; tests shrink it.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Open a supervised connection for `key`.
    ///
    /// Idempotent: a second `start` for a live key is a successful no-op.
    /// Returns `false` only for a malformed key (e.g. a kline key missing
    /// its interval).
    pub fn start(&self, key: StreamKey) -> bool {
        if !key.is_valid() {
            warn!(key = ?key, "refusing to start stream for invalid key");
            return false;
        }

        let mut registry = self.registry.write();
        if registry.contains_key(&key) {
            debug!(key = %key, "stream already running");
            return true;
        }

        info!(key = %key, "starting stream");
        let handle = ConnectionHandle::spawn(
            key.clone(),
            self.transport.clone(),
            self.bus.clone(),
            self.retry_delay,
        );
        registry.insert(key, handle);
        true
    }

    /// Close and deregister the connection for `key`. Effective-once: a
    /// second `stop` for the same key returns `false` without touching the
    /// registry.
    pub fn stop(&self, key: &StreamKey) -> bool {
        let removed = self.registry.write().remove(key);
        match removed {
            Some(handle) => {
                info!(key = %key, "stopping stream");
                handle.close();
                true
            }
            None => {
                debug!(key = %key, "stop requested for unknown stream");
                false
            }
        }
    }

    /// Close and deregister the connection for `key` only when the bus has
    /// no remaining consumers for it. The bus check happens under the
    /// registry write lock, so a departing consumer can never tear down a
    /// feed that a joining one (bus-registered first) is attached to.
    pub fn stop_if_unused(&self, key: &StreamKey) -> bool {
        let mut registry = self.registry.write();
        if self.bus.subscriber_count(key) > 0 {
            debug!(key = %key, "stream still has consumers");
            return false;
        }
        match registry.remove(key) {
            Some(handle) => {
                info!(key = %key, "stopping unused stream");
                handle.close();
                true
            }
            None => false,
        }
    }

    /// Stop every registered connection. Used at process shutdown.
    pub fn stop_all(&self) {
        let mut registry = self.registry.write();
        let count = registry.len();
        for (key, handle) in registry.drain() {
            info!(key = %key, "stopping stream");
            handle.close();
        }
        info!(count, "all streams stopped");
    }

    pub fn is_active(&self, key: &StreamKey) -> bool {
        self.registry.read().contains_key(key)
    }

    pub fn active_keys(&self) -> Vec<StreamKey> {
        self.registry.read().keys().cloned().collect()
    }

    pub fn connection_state(&self, key: &StreamKey) -> Option<StreamState> {
        self.registry.read().get(key).map(ConnectionHandle::state)
    }

    pub fn retry_count(&self, key: &StreamKey) -> Option<u32> {
        self.registry
            .read()
            .get(key)
            .map(ConnectionHandle::retry_count)
    }

    pub fn bus(&self) -> &Arc<SubscriptionBus> {
        &self.bus
    }
}

// =============================================================================
// Tests — scripted transport, virtual time
// =============================================================================
