//! Mean reversion: buy below the SMA band, sell above it.

use super::{band_signal, Strategy};
use crate::domain::{Bar, Signal};
use crate::indicators::{Indicator, Sma};

#[derive(Debug, Clone)]
pub struct MeanReversion {
    sma: Sma,
    threshold: f64,
}

impl MeanReversion {
    pub fn new(window: usize, threshold: f64) -> Self {
        Self {
            sma: Sma::new(window),
            threshold,
        }
    }

    pub fn window(&self) -> usize {
        self.sma.period()
    }
}

impl Strategy for MeanReversion {
    fn name(&self) -> String {
        format!("mean_reversion_{}_{}", self.window(), self.threshold)
    }

    fn warmup_bars(&self) -> usize {
        self.window()
    }

    fn signal(&self, visible: &[Bar]) -> Signal {
        let (Some(last), Some(sma)) = (visible.last(), self.sma.latest(visible)) else {
            return Signal::Hold;
        };
        band_signal(last.close, sma, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::bars_from_closes;

    #[test]
    fn holds_during_warmup() {
        let s = MeanReversion::new(5, 0.01);
        assert_eq!(s.signal(&bars_from_closes(&[100.0, 50.0])), Signal::Hold);
        assert_eq!(s.signal(&[]), Signal::Hold);
    }

    #[test]
    fn buys_a_dip_and_sells_a_spike() {
        let s = MeanReversion::new(5, 0.01);
        let dip = bars_from_closes(&[100.0, 100.0, 100.0, 100.0, 90.0]);
        assert_eq!(s.signal(&dip), Signal::Buy);
        let spike = bars_from_closes(&[100.0, 100.0, 100.0, 100.0, 110.0]);
        assert_eq!(s.signal(&spike), Signal::Sell);
    }

    #[test]
    fn only_the_window_matters() {
        let s = MeanReversion::new(3, 0.01);
        // An ancient outlier outside the window must not move the band.
        let bars = bars_from_closes(&[1000.0, 100.0, 100.0, 100.0]);
        assert_eq!(s.signal(&bars), Signal::Hold);
    }

    #[test]
    fn name_carries_params() {
        assert_eq!(MeanReversion::new(20, 0.005).name(), "mean_reversion_20_0.005");
        assert_eq!(MeanReversion::new(20, 0.005).warmup_bars(), 20);
    }
}
