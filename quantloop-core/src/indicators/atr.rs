//! Average True Range as a fraction of the last close.
//!
//! Plain mean of the last `period` true ranges divided by the close.
//! Lookback: period (each true range needs the previous close).

use super::Indicator;
use crate::domain::Bar;

/// True range of `bar` given the previous close.
pub fn true_range(bar: &Bar, prev_close: f64) -> f64 {
    (bar.high - bar.low)
        .max((bar.high - prev_close).abs())
        .max((bar.low - prev_close).abs())
}

#[derive(Debug, Clone)]
pub struct AtrPct {
    period: usize,
    name: String,
}

impl AtrPct {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("atr_pct_{period}"),
        }
    }
}

impl Indicator for AtrPct {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut result = vec![f64::NAN; bars.len()];
        let p = self.period as f64;
        for (i, window) in bars.windows(self.period + 1).enumerate() {
            let atr = window
                .windows(2)
                .map(|pair| true_range(&pair[1], pair[0].close))
                .sum::<f64>()
                / p;
            let close = window[self.period].close;
            result[i + self.period] = if close > 0.0 { atr / close } else { f64::NAN };
        }
        result
    }
}
