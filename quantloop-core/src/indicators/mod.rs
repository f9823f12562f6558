//! Windowed indicators over bar history.
//!
//! Indicators are pure functions: bar history in, numeric series out. Strategies
//! call [`Indicator::latest`] on the visible history, which computes over the
//! shortest tail that yields one valid value.

pub mod adx;
pub mod atr;
pub mod sma;
pub mod zscore;

pub use adx::Adx;
pub use atr::{true_range, AtrPct};
pub use sma::Sma;
pub use zscore::ZScore;

use crate::domain::Bar;

/// Trait for indicators.
///
/// `compute` returns a series of the same length as `bars`; the first
/// `lookback()` values are `f64::NAN` (warmup).
///
/// # Look-ahead contamination guard
/// No value at index t may depend on bars after t. Every indicator must give
/// identical prefixes on a truncated and a full series.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "adx_14").
    fn name(&self) -> &str;

    /// Number of leading NaN values before the first valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;

    /// Value at the last bar of `bars`, or `None` during warmup.
    fn latest(&self, bars: &[Bar]) -> Option<f64> {
        let needed = self.lookback() + 1;
        if bars.len() < needed {
            return None;
        }
        let tail = &bars[bars.len() - needed..];
        self.compute(tail).last().copied().filter(|v| v.is_finite())
    }
}
