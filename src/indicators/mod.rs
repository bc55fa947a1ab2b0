// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator functions over an ordered closing-price
// history (oldest first). Every function returns `Option<f64>`: `None` means
// the history is too short, which is an expected outcome and never an error.

pub mod ema;
pub mod rsi;
pub mod sma;

pub use ema::ema;
pub use rsi::rsi;
pub use sma::sma;
