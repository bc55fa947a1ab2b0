// =============================================================================
// StreamConnection — supervised state machine for one upstream feed
// =============================================================================
//
//   Connecting ──▶ Open ──▶ Closing ──▶ Closed            (intentional stop)
//        │          │
//        └──────────┴──▶ Reconnecting ──(fixed delay)──▶ Connecting
//
// A connection enters Reconnecting only when its last close was NOT
// intentional. The retry delay is fixed at 5 seconds with no backoff and no
// retry cap.
// =============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bus::SubscriptionBus;
use crate::stream::key::StreamKey;
use crate::stream::message::normalize;
use crate::stream::transport::{FrameStream, StreamTransport};

/// Fixed delay before a dropped connection is re-dialed.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Open,
    Reconnecting,
    Closing,
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamState::Connecting => "Connecting",
            StreamState::Open => "Open",
            StreamState::Reconnecting => "Reconnecting",
            StreamState::Closing => "Closing",
            StreamState::Closed => "Closed",
        };
        write!(f, "{s}")
    }
}

struct ConnectionShared {
    key: StreamKey,
    state: RwLock<StreamState>,
    intentional_close: AtomicBool,
    retry_count: AtomicU32,
    closed: Notify,
}

impl ConnectionShared {
    fn set_state(&self, state: StreamState) {
        *self.state.write() = state;
    }
}

/// Handle to one supervised connection. Owned exclusively by the registry;
/// dropping the handle after [`ConnectionHandle::close`] lets the task wind
/// down on its own.
pub struct ConnectionHandle {
    shared: Arc<ConnectionShared>,
    _task: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Create the connection in `Connecting` state and spawn its supervised
    /// task.
    pub(crate) fn spawn(
        key: StreamKey,
        transport: Arc<dyn StreamTransport>,
        bus: Arc<SubscriptionBus>,
        retry_delay: Duration,
    ) -> Self {
        let shared = Arc::new(ConnectionShared {
            key,
            state: RwLock::new(StreamState::Connecting),
            intentional_close: AtomicBool::new(false),
            retry_count: AtomicU32::new(0),
            closed: Notify::new(),
        });

        let task = tokio::spawn(run(shared.clone(), transport, bus, retry_delay));

        Self {
            shared,
            _task: task,
        }
    }

    /// Initiate an intentional close.
    ///
    /// The flag is stored strictly before the wakeup fires; the reverse order
    /// would let the run loop misread the shutdown as a transport failure and
    /// schedule a reconnect.
    pub fn close(&self) {
        self.shared.intentional_close.store(true, Ordering::SeqCst);
        self.shared.set_state(StreamState::Closing);
        self.shared.closed.notify_one();
    }

    pub fn key(&self) -> &StreamKey {
        &self.shared.key
    }

    pub fn state(&self) -> StreamState {
        *self.shared.state.read()
    }

    /// Reconnect attempts for the current outage; reset to zero once the
    /// connection is open again.
    pub fn retry_count(&self) -> u32 {
        self.shared.retry_count.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Supervised run loop
// =============================================================================

enum PumpOutcome {
    Intentional,
    Failed,
}

async fn run(
    shared: Arc<ConnectionShared>,
    transport: Arc<dyn StreamTransport>,
    bus: Arc<SubscriptionBus>,
    retry_delay: Duration,
) {
    loop {
        if shared.intentional_close.load(Ordering::SeqCst) {
            break;
        }
        shared.set_state(StreamState::Connecting);

        let connected = tokio::select! {
            res = transport.connect(&shared.key) => res,
            _ = shared.closed.notified() => break,
        };

        match connected {
            Ok(frames) => {
                shared.set_state(StreamState::Open);
                shared.retry_count.store(0, Ordering::SeqCst);
                info!(key = %shared.key, "stream connected");

                if matches!(
                    pump(&shared, frames, &bus).await,
                    PumpOutcome::Intentional
                ) {
                    break;
                }
            }
            Err(e) => {
                warn!(key = %shared.key, error = %e, "stream connect failed");
            }
        }

        if shared.intentional_close.load(Ordering::SeqCst) {
            break;
        }

        shared.set_state(StreamState::Reconnecting);
        let attempt = shared.retry_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            key = %shared.key,
            attempt,
            delay_secs = retry_delay.as_secs_f64(),
            "scheduling reconnect"
        );

        tokio::select! {
            _ = tokio::time::sleep(retry_delay) => {}
            _ = shared.closed.notified() => break,
        }
    }

    shared.set_state(StreamState::Closed);
    info!(key = %shared.key, "stream closed");
}

/// Read frames until the feed fails, ends, or the close signal fires. Every
/// frame is normalized and published in arrival order; malformed payloads are
/// dropped without touching the connection.
async fn pump(
    shared: &Arc<ConnectionShared>,
    mut frames: FrameStream,
    bus: &Arc<SubscriptionBus>,
) -> PumpOutcome {
    loop {
        tokio::select! {
            _ = shared.closed.notified() => return PumpOutcome::Intentional,
            frame = frames.next() => match frame {
                Some(Ok(text)) => match normalize(&shared.key, &text) {
                    Ok(msg) => bus.publish(&shared.key, msg),
                    Err(e) => {
                        warn!(key = %shared.key, error = %e, "dropping malformed frame");
                    }
                },
                Some(Err(e)) => {
                    error!(key = %shared.key, error = %e, "stream read error");
                    return PumpOutcome::Failed;
                }
                None => {
                    warn!(key = %shared.key, "upstream stream ended");
                    return PumpOutcome::Failed;
                }
            }
        }
    }
}
