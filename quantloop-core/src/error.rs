//! Run-level error taxonomy.
//!
//! Both kinds are fatal to the single run that raised them and to nothing
//! else: the sweep runner records them against the config and moves on.

use thiserror::Error;

/// The run configuration cannot be executed as given.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("series has {bars} valid bars but strategy '{strategy}' needs {warmup} for warmup")]
    InsufficientBars {
        strategy: String,
        bars: usize,
        warmup: usize,
    },

    #[error("fee must be a finite non-negative fraction, got {0}")]
    InvalidFee(f64),

    #[error("threshold must be a finite non-negative fraction, got {0}")]
    InvalidThreshold(f64),

    #[error("initial equity must be positive, got {0}")]
    InvalidInitialEquity(f64),

    #[error("position size must be positive, got {0}")]
    InvalidPositionSize(f64),

    #[error("exchange rule {name} is out of range: {value}")]
    InvalidExchangeRule { name: &'static str, value: f64 },

    #[error("invalid strategy parameter '{name}': {reason}")]
    InvalidStrategyParam { name: &'static str, reason: String },
}

/// The price series is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("series is empty")]
    Empty,

    #[error("timestamps not strictly increasing at bar {index}")]
    Unordered { index: usize },

    #[error("all {total} bars are void (non-finite prices)")]
    NoValidBars { total: usize },
}

/// Any failure of a single backtest run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

impl EngineError {
    /// Stable short label used in result tables and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Config(_) => "ConfigError",
            EngineError::Data(_) => "DataError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels() {
        let e: EngineError = DataError::Empty.into();
        assert_eq!(e.kind(), "DataError");
        let e: EngineError = ConfigError::InvalidFee(-1.0).into();
        assert_eq!(e.kind(), "ConfigError");
    }

    #[test]
    fn messages_name_the_problem() {
        let e = ConfigError::InsufficientBars {
            strategy: "mr".into(),
            bars: 5,
            warmup: 20,
        };
        assert!(e.to_string().contains("needs 20"));
        assert!(DataError::Unordered { index: 3 }.to_string().contains("bar 3"));
    }
}
