//! Backtest engine: single-pass replay under `close` or `onebar` semantics.
//!
//! Inputs are validated before the loop starts, so nothing inside a bar can
//! fail. The engine alone slices history: bar t is replayed with the strategy
//! seeing `valid[..t]`, never bar t itself.

mod close;
pub mod metrics;
mod onebar;
mod rules;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::{first_unordered, Bar};
use crate::strategy::Strategy;

pub use crate::error::{ConfigError, DataError, EngineError};
pub use rules::{ExchangeRules, FillRejected};

/// How a signal turns into fills.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Positions persist across bars; fills at the close; equity marked at every close.
    #[default]
    Close,
    /// No carried position; a buy enters at open[t] and exits at close[t].
    OneBar,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Close => "close",
            ExecutionMode::OneBar => "onebar",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "close" => Ok(ExecutionMode::Close),
            "onebar" | "one_bar" | "one-bar" => Ok(ExecutionMode::OneBar),
            other => Err(format!("unknown execution mode '{other}' (expected close|onebar)")),
        }
    }
}

/// Engine configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub mode: ExecutionMode,
    /// Fee as a fraction of traded notional, charged on entry and on exit.
    pub fee: f64,
    pub initial_equity: f64,
    /// Units bought per entry.
    pub position_size: f64,
    /// Rounding and minimum notional for close-mode fills.
    #[serde(default)]
    pub rules: ExchangeRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Close,
            fee: 0.001,
            initial_equity: 10_000.0,
            position_size: 1.0,
            rules: ExchangeRules::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(mode: ExecutionMode, fee: f64) -> Self {
        Self {
            mode,
            fee,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fee.is_finite() && self.fee >= 0.0) {
            return Err(ConfigError::InvalidFee(self.fee));
        }
        if !(self.initial_equity.is_finite() && self.initial_equity > 0.0) {
            return Err(ConfigError::InvalidInitialEquity(self.initial_equity));
        }
        if !(self.position_size.is_finite() && self.position_size > 0.0) {
            return Err(ConfigError::InvalidPositionSize(self.position_size));
        }
        self.rules.validate()
    }
}

/// Metrics record of one run.
///
/// `win_rate`, `return_pct` and `total_fees` are populated for close mode
/// only; `pf` for onebar mode only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub mode: ExecutionMode,
    /// Closed round trips (close) or one-bar trades (onebar).
    pub trades: usize,
    pub initial_equity: f64,
    pub final_equity: f64,
    /// Largest peak-to-trough drop of the whole equity curve, as a fraction of the peak.
    pub max_dd: f64,
    pub win_rate: Option<f64>,
    pub pf: Option<f64>,
    pub return_pct: Option<f64>,
    pub total_fees: Option<f64>,
    /// Valid bars replayed.
    pub bars_processed: usize,
    /// Void bars dropped before replay.
    pub bars_skipped: usize,
}

/// Run one backtest.
///
/// Fails with [`DataError`] when the series is empty, unordered or entirely
/// void, and with [`ConfigError`] when the config is invalid or fewer valid
/// bars remain than the strategy's warmup.
pub fn run_backtest(
    series: &[Bar],
    strategy: &dyn Strategy,
    config: &EngineConfig,
) -> Result<RunResult, EngineError> {
    config.validate()?;

    if series.is_empty() {
        return Err(DataError::Empty.into());
    }
    if let Some(index) = first_unordered(series) {
        return Err(DataError::Unordered { index }.into());
    }

    let valid: Vec<Bar> = series.iter().filter(|b| !b.is_void()).copied().collect();
    if valid.is_empty() {
        return Err(DataError::NoValidBars {
            total: series.len(),
        }
        .into());
    }

    // Warmup is measured against the bars the strategy will actually see.
    let warmup = strategy.warmup_bars();
    if valid.len() < warmup {
        return Err(ConfigError::InsufficientBars {
            strategy: strategy.name(),
            bars: valid.len(),
            warmup,
        }
        .into());
    }

    let mut result = match config.mode {
        ExecutionMode::Close => close::replay(&valid, strategy, config),
        ExecutionMode::OneBar => onebar::replay(&valid, strategy, config),
    };
    result.bars_skipped = series.len() - valid.len();
    Ok(result)
}
