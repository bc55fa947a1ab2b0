pub mod connection;
pub mod key;
pub mod manager;
pub mod message;
pub mod transport;

// Re-export the types the rest of the crate touches constantly.
pub use key::{StreamKey, StreamKind};
pub use manager::StreamManager;
pub use message::{KlineUpdate, NormalizedMessage, TickerSnapshot};
pub use transport::BinanceWsTransport;
