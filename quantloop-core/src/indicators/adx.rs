//! Directional index (simplified, unsmoothed ADX).
//!
//! Plain means of +DM, -DM and true range over the last `period` bars give
//! +DI and -DI; the output is `|+DI - -DI| / (+DI + -DI) * 100`. Degenerate
//! windows (zero range or zero movement) report 50.0, which range filters
//! treat as trending.

use super::{true_range, Indicator};
use crate::domain::Bar;

/// Reported when the window carries no directional information.
pub const ADX_NEUTRAL: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    name: String,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("adx_{period}"),
        }
    }

    fn window_value(&self, window: &[Bar]) -> f64 {
        let mut tr_sum = 0.0;
        let mut dm_plus_sum = 0.0;
        let mut dm_minus_sum = 0.0;
        for pair in window.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            tr_sum += true_range(cur, prev.close);
            let up = cur.high - prev.high;
            let down = prev.low - cur.low;
            if up > down && up > 0.0 {
                dm_plus_sum += up;
            }
            if down > up && down > 0.0 {
                dm_minus_sum += down;
            }
        }
        if tr_sum <= 0.0 {
            return ADX_NEUTRAL;
        }
        let di_plus = dm_plus_sum / tr_sum * 100.0;
        let di_minus = dm_minus_sum / tr_sum * 100.0;
        let di_sum = di_plus + di_minus;
        if di_sum <= 0.0 {
            return ADX_NEUTRAL;
        }
        (di_plus - di_minus).abs() / di_sum * 100.0
    }
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut result = vec![f64::NAN; bars.len()];
        for (i, window) in bars.windows(self.period + 1).enumerate() {
            result[i + self.period] = self.window_value(window);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::bars_from_closes;

    #[test]
    fn steady_uptrend_is_fully_directional() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let v = Adx::new(14).latest(&bars_from_closes(&closes)).unwrap();
        assert!((v - 100.0).abs() < 1e-9);
    }

    #[test]
    fn flat_market_is_neutral() {
        let v = Adx::new(14).latest(&bars_from_closes(&[100.0; 20])).unwrap();
        assert_eq!(v, ADX_NEUTRAL);
    }

    #[test]
    fn round_trip_market_is_low() {
        // Seven up moves then six down moves: |7 - 6| / 13.
        let mut closes: Vec<f64> = (0..8).map(|i| 100.0 + i as f64).collect();
        closes.extend((0..7).map(|i| 106.0 - i as f64));
        let v = Adx::new(14).latest(&bars_from_closes(&closes)).unwrap();
        assert!((v - 100.0 / 13.0).abs() < 1e-9, "adx {v}");
    }

    #[test]
    fn prefix_is_stable_under_extension() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let bars = bars_from_closes(&closes);
        let adx = Adx::new(14);
        let full = adx.compute(&bars);
        let truncated = adx.compute(&bars[..25]);
        for i in 0..25 {
            assert!(full[i].is_nan() && truncated[i].is_nan() || full[i] == truncated[i]);
        }
    }
}
