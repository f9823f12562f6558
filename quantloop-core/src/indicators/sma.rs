//! Simple Moving Average (SMA).
//!
//! Mean of close prices over a lookback window.
//! Lookback: period - 1 (first valid value at index period-1).

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    /// `period` is clamped to at least 1.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut result = vec![f64::NAN; bars.len()];
        let p = self.period as f64;
        for (i, window) in bars.windows(self.period).enumerate() {
            let sum: f64 = window.iter().map(|b| b.close).sum();
            result[i + self.period - 1] = sum / p;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::bars_from_closes;

    #[test]
    fn sma_known_values() {
        let bars = bars_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let out = Sma::new(3).compute(&bars);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_eq!(out[2], 2.0);
        assert_eq!(out[3], 3.0);
        assert_eq!(out[4], 4.0);
    }

    #[test]
    fn sma_short_series_is_all_nan() {
        let bars = bars_from_closes(&[1.0, 2.0]);
        assert!(Sma::new(3).compute(&bars).iter().all(|v| v.is_nan()));
        assert_eq!(Sma::new(3).latest(&bars), None);
    }

    #[test]
    fn latest_uses_only_the_tail() {
        let bars = bars_from_closes(&[100.0, 1.0, 2.0, 3.0]);
        assert_eq!(Sma::new(3).latest(&bars), Some(2.0));
    }

    #[test]
    fn zero_period_is_clamped() {
        let sma = Sma::new(0);
        assert_eq!(sma.period(), 1);
        assert_eq!(sma.name(), "sma_1");
    }
}
