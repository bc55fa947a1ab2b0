// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Seeded with the SMA of the first `period` closes, then updated
// left-to-right over the remaining entries:
//
//   multiplier = 2 / (period + 1)
//   ema        = (close - ema) * multiplier + ema
// =============================================================================

/// Most recent EMA value for `closes` and look-back `period`.
///
/// # Edge cases
/// - `period == 0` => `None`
/// - `closes.len() < period` => `None` (exactly `period` closes yield the
///   seed SMA itself)
/// - Non-finite result => `None`
pub fn ema(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period + 1) as f64;
    let mut value = closes[..period].iter().sum::<f64>() / period as f64;

    for &close in &closes[period..] {
        value = (close - value) * multiplier + value;
    }

    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_empty_input() {
        assert!(ema(&[], 5).is_none());
    }

    #[test]
    fn ema_period_zero() {
        assert!(ema(&[1.0, 2.0, 3.0], 0).is_none());
    }

    #[test]
    fn ema_insufficient_data() {
        assert!(ema(&[1.0, 2.0], 5).is_none());
    }

    #[test]
    fn ema_period_equals_length_is_the_seed_sma() {
        let value = ema(&[2.0, 4.0, 6.0], 3).unwrap();
        assert!((value - 4.0).abs() < 1e-10);
    }

    #[test]
    fn ema_known_values() {
        // 5-period EMA of [1..10]: SMA of first 5 = 3.0, multiplier = 1/3.
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let mult = 2.0 / 6.0;
        let mut expected = 3.0;
        for &c in &closes[5..] {
            expected = (c - expected) * mult + expected;
        }
        let value = ema(&closes, 5).unwrap();
        assert!((value - expected).abs() < 1e-10, "got {value}, expected {expected}");
    }

    #[test]
    fn ema_incremental_update_equivalence() {
        // Recomputing with an appended price must equal applying one update
        // step to the previous EMA.
        let closes = vec![
            44.0, 44.25, 44.5, 43.75, 44.5, 45.0, 45.5, 45.0, 45.25, 46.0,
        ];
        let period = 5;
        let prev = ema(&closes, period).unwrap();

        let next_price = 46.5;
        let mut extended = closes.clone();
        extended.push(next_price);

        let multiplier = 2.0 / (period + 1) as f64;
        let stepped = (next_price - prev) * multiplier + prev;
        let recomputed = ema(&extended, period).unwrap();
        assert!((recomputed - stepped).abs() < 1e-12);
    }

    #[test]
    fn ema_nan_input_returns_none() {
        assert!(ema(&[1.0, 2.0, 3.0, f64::NAN, 5.0], 3).is_none());
    }

    #[test]
    fn ema_never_mutates_its_input() {
        let closes = vec![1.0, 2.0, 3.0, 4.0];
        let before = closes.clone();
        let _ = ema(&closes, 2);
        assert_eq!(closes, before);
    }
}
