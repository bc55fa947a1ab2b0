/// Simple Moving Average: arithmetic mean of the last `period` closes.
///
/// # Edge cases
/// - `period == 0` => `None`
/// - `closes.len() < period` => `None`
/// - Non-finite result => `None`
pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    mean.is_finite().then_some(mean)
}
