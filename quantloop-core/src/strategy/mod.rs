//! Strategies: signal from visible history.
//!
//! A strategy is a capability, not a hierarchy: anything that can turn the
//! bars strictly before bar t into a [`Signal`] for bar t. The engine owns the
//! slicing, so an implementation cannot observe the bar it acts on.

pub mod factory;
pub mod mean_reversion;
pub mod optimized;

pub use factory::{build_strategy, StrategySpec};
pub use mean_reversion::MeanReversion;
pub use optimized::MeanReversionOptimized;

use crate::domain::{Bar, Signal};

/// Trait for trade-signal producers.
///
/// Implementations are stateless with respect to the replay: the same
/// `visible` slice always yields the same signal.
pub trait Strategy: Send + Sync {
    /// Name including parameters (e.g., "mean_reversion_20_0.005").
    fn name(&self) -> String;

    /// Minimum history before `signal` can return anything but `Hold`.
    fn warmup_bars(&self) -> usize;

    /// Signal for the bar immediately after `visible`.
    fn signal(&self, visible: &[Bar]) -> Signal;
}

/// Classic mean-reversion band around an SMA.
pub(crate) fn band_signal(last_close: f64, sma: f64, threshold: f64) -> Signal {
    if last_close < sma * (1.0 - threshold) {
        Signal::Buy
    } else if last_close > sma * (1.0 + threshold) {
        Signal::Sell
    } else {
        Signal::Hold
    }
}
