//! Absolute z-score of the last close within its window.
//!
//! `|close - mean| / std` with population standard deviation over `period`
//! closes. A flat window (std = 0) yields 0.0.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct ZScore {
    period: usize,
    name: String,
}

impl ZScore {
    /// `period` is clamped to at least 2.
    pub fn new(period: usize) -> Self {
        let period = period.max(2);
        Self {
            period,
            name: format!("zscore_{period}"),
        }
    }
}

impl Indicator for ZScore {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut result = vec![f64::NAN; bars.len()];
        let n = self.period as f64;
        for (i, window) in bars.windows(self.period).enumerate() {
            let mean = window.iter().map(|b| b.close).sum::<f64>() / n;
            let var = window
                .iter()
                .map(|b| (b.close - mean).powi(2))
                .sum::<f64>()
                / n;
            let std = var.sqrt();
            let last = window[window.len() - 1].close;
            result[i + self.period - 1] = if std == 0.0 {
                0.0
            } else {
                ((last - mean) / std).abs()
            };
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::bars_from_closes;

    #[test]
    fn flat_window_is_zero() {
        let bars = bars_from_closes(&[5.0; 4]);
        assert_eq!(ZScore::new(4).latest(&bars), Some(0.0));
    }

    #[test]
    fn known_value() {
        // mean 2.5, population std sqrt(1.25)
        let bars = bars_from_closes(&[1.0, 2.0, 3.0, 4.0]);
        let z = ZScore::new(4).latest(&bars).unwrap();
        assert!((z - 1.5 / 1.25_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn is_absolute() {
        let up = bars_from_closes(&[1.0, 1.0, 1.0, 4.0]);
        let down = bars_from_closes(&[4.0, 4.0, 4.0, 1.0]);
        let z = ZScore::new(4);
        assert_eq!(z.latest(&up), z.latest(&down));
    }
}
