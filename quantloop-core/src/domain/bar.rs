//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV sample for one fixed interval.
///
/// `timestamp` is the bar open time in Unix seconds. A loaded series is
/// strictly increasing in `timestamp` and is never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Returns true if any price field is NaN or infinite (void bar).
    ///
    /// Void bars are dropped by the engine: never traded, never visible to a
    /// strategy, never counted as processed.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }

    /// Bar open time as a UTC datetime, if the timestamp is representable.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// Index of the first bar whose timestamp does not strictly exceed its
/// predecessor's, or `None` if the series is strictly increasing.
pub fn first_unordered(bars: &[Bar]) -> Option<usize> {
    bars.windows(2)
        .position(|w| w[1].timestamp <= w[0].timestamp)
        .map(|i| i + 1)
}
