//! Mean reversion with deviation, regime and volatility filters plus an entry cooldown.
//!
//! A band signal only passes when:
//! - the last close is at least `zscore_threshold` deviations from the window mean,
//! - ADX(14) is at most `adx_max` (range-bound market),
//! - ATR(14) as a fraction of price is at least `atr_pct_min`.
//!
//! The cooldown drops a buy if the filtered entry also fired on any of the
//! previous `cooldown_bars` bars. It is evaluated from the visible slice alone,
//! so the strategy stays a pure function of history.

use super::{band_signal, Strategy};
use crate::domain::{Bar, Signal};
use crate::indicators::adx::ADX_NEUTRAL;
use crate::indicators::{Adx, AtrPct, Indicator, Sma, ZScore};

/// Period of the regime and volatility filters.
pub const FILTER_PERIOD: usize = 14;

/// ATR fraction assumed while the ATR window is still warming up.
const DEFAULT_ATR_PCT: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct MeanReversionOptimized {
    sma: Sma,
    zscore: ZScore,
    adx: Adx,
    atr: AtrPct,
    threshold: f64,
    zscore_threshold: f64,
    adx_max: f64,
    atr_pct_min: f64,
    cooldown_bars: usize,
}

impl MeanReversionOptimized {
    pub fn new(
        window: usize,
        threshold: f64,
        zscore_threshold: f64,
        adx_max: f64,
        atr_pct_min: f64,
        cooldown_bars: usize,
    ) -> Self {
        Self {
            sma: Sma::new(window),
            zscore: ZScore::new(window),
            adx: Adx::new(FILTER_PERIOD),
            atr: AtrPct::new(FILTER_PERIOD),
            threshold,
            zscore_threshold,
            adx_max,
            atr_pct_min,
            cooldown_bars,
        }
    }

    pub fn window(&self) -> usize {
        self.sma.period()
    }

    fn filtered_signal(&self, visible: &[Bar]) -> Signal {
        if visible.len() < self.warmup_bars() {
            return Signal::Hold;
        }
        let Some(last) = visible.last() else {
            return Signal::Hold;
        };

        let zscore = self.zscore.latest(visible).unwrap_or(0.0);
        if zscore < self.zscore_threshold {
            return Signal::Hold;
        }

        let adx = self.adx.latest(visible).unwrap_or(ADX_NEUTRAL);
        if adx > self.adx_max {
            return Signal::Hold;
        }

        let atr_pct = self.atr.latest(visible).unwrap_or(DEFAULT_ATR_PCT);
        if atr_pct < self.atr_pct_min {
            return Signal::Hold;
        }

        match self.sma.latest(visible) {
            Some(sma) => band_signal(last.close, sma, self.threshold),
            None => Signal::Hold,
        }
    }

    fn cooling_down(&self, visible: &[Bar]) -> bool {
        (1..=self.cooldown_bars)
            .take_while(|&k| k < visible.len())
            .any(|k| self.filtered_signal(&visible[..visible.len() - k]).is_buy())
    }
}

impl Strategy for MeanReversionOptimized {
    fn name(&self) -> String {
        format!(
            "mean_reversion_opt_{}_{}_z{}_adx{}_atr{}_cd{}",
            self.window(),
            self.threshold,
            self.zscore_threshold,
            self.adx_max,
            self.atr_pct_min,
            self.cooldown_bars
        )
    }

    fn warmup_bars(&self) -> usize {
        self.window().max(FILTER_PERIOD + 1)
    }

    fn signal(&self, visible: &[Bar]) -> Signal {
        match self.filtered_signal(visible) {
            Signal::Buy if self.cooling_down(visible) => Signal::Hold,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::bars_from_closes;

    fn permissive(cooldown: usize) -> MeanReversionOptimized {
        MeanReversionOptimized::new(20, 0.001, 0.0, 100.0, 0.0, cooldown)
    }

    /// Flat history followed by `drops` consecutive lower closes.
    fn sliding(drops: usize) -> Vec<Bar> {
        let mut closes = vec![100.0; 25];
        closes.extend((1..=drops).map(|i| 100.0 - 2.0 * i as f64));
        bars_from_closes(&closes)
    }

    #[test]
    fn warmup_covers_filter_period() {
        assert_eq!(permissive(0).warmup_bars(), 20);
        assert_eq!(
            MeanReversionOptimized::new(5, 0.0, 0.0, 100.0, 0.0, 0).warmup_bars(),
            FILTER_PERIOD + 1
        );
    }

    #[test]
    fn permissive_filters_reduce_to_band_signal() {
        assert_eq!(permissive(0).signal(&sliding(1)), Signal::Buy);
    }

    #[test]
    fn zscore_filter_blocks_small_moves() {
        let s = MeanReversionOptimized::new(20, 0.001, 10.0, 100.0, 0.0, 0);
        assert_eq!(s.signal(&sliding(1)), Signal::Hold);
    }

    #[test]
    fn adx_filter_blocks_trends() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let bars = bars_from_closes(&closes);
        let open = MeanReversionOptimized::new(20, 0.001, 0.0, 100.0, 0.0, 0);
        let strict = MeanReversionOptimized::new(20, 0.001, 0.0, 25.0, 0.0, 0);
        assert_eq!(open.signal(&bars), Signal::Buy);
        assert_eq!(strict.signal(&bars), Signal::Hold);
    }

    #[test]
    fn atr_filter_blocks_quiet_markets() {
        let s = MeanReversionOptimized::new(20, 0.001, 0.0, 100.0, 0.5, 0);
        assert_eq!(s.signal(&sliding(1)), Signal::Hold);
    }

    #[test]
    fn cooldown_suppresses_repeated_entries() {
        let s = permissive(3);
        // First dip bar fires, the next ones are inside the cooldown.
        assert_eq!(s.signal(&sliding(1)), Signal::Buy);
        assert_eq!(s.signal(&sliding(2)), Signal::Hold);
        assert_eq!(s.signal(&sliding(3)), Signal::Hold);
        assert_eq!(permissive(0).signal(&sliding(3)), Signal::Buy);
    }

    #[test]
    fn cooldown_never_touches_sells() {
        let mut closes = vec![100.0; 25];
        closes.extend([104.0, 108.0]);
        let bars = bars_from_closes(&closes);
        assert_eq!(permissive(3).signal(&bars), Signal::Sell);
    }
}
