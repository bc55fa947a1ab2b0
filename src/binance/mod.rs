pub mod client;

pub use client::{Candle, MarketDataClient, TickerPrice};
