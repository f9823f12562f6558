//! Strategy factory: serializable spec to boxed strategy.

use serde::{Deserialize, Serialize};

use super::{MeanReversion, MeanReversionOptimized, Strategy};
use crate::error::ConfigError;

/// Serializable strategy identity plus its own knobs.
///
/// The band `threshold` is a grid axis in its own right, so it lives on the
/// run config and is passed to [`build_strategy`] separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategySpec {
    MeanReversion {
        window: usize,
    },
    Optimized {
        window: usize,
        zscore_threshold: f64,
        adx_max: f64,
        atr_pct_min: f64,
        cooldown_bars: usize,
    },
}

impl Default for StrategySpec {
    fn default() -> Self {
        StrategySpec::MeanReversion { window: 20 }
    }
}

impl StrategySpec {
    /// Short identifier used in tables and logs.
    pub fn id(&self) -> &'static str {
        match self {
            StrategySpec::MeanReversion { .. } => "mean_reversion",
            StrategySpec::Optimized { .. } => "mean_reversion_opt",
        }
    }

    /// Position of the variant in declaration order; used for total ordering.
    pub fn variant_rank(&self) -> u8 {
        match self {
            StrategySpec::MeanReversion { .. } => 0,
            StrategySpec::Optimized { .. } => 1,
        }
    }

    /// Numeric fields in declaration order; used for total ordering.
    pub fn params(&self) -> Vec<f64> {
        match *self {
            StrategySpec::MeanReversion { window } => vec![window as f64],
            StrategySpec::Optimized {
                window,
                zscore_threshold,
                adx_max,
                atr_pct_min,
                cooldown_bars,
            } => vec![
                window as f64,
                zscore_threshold,
                adx_max,
                atr_pct_min,
                cooldown_bars as f64,
            ],
        }
    }
}

fn non_negative(name: &'static str, v: f64) -> Result<(), ConfigError> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidStrategyParam {
            name,
            reason: format!("must be finite and >= 0, got {v}"),
        })
    }
}

/// Build a strategy, validating its parameters.
pub fn build_strategy(
    spec: &StrategySpec,
    threshold: f64,
) -> Result<Box<dyn Strategy>, ConfigError> {
    if !(threshold.is_finite() && threshold >= 0.0) {
        return Err(ConfigError::InvalidThreshold(threshold));
    }
    let window = match spec {
        StrategySpec::MeanReversion { window } | StrategySpec::Optimized { window, .. } => *window,
    };
    if window < 2 {
        return Err(ConfigError::InvalidStrategyParam {
            name: "window",
            reason: format!("must be >= 2, got {window}"),
        });
    }

    match *spec {
        StrategySpec::MeanReversion { window } => {
            Ok(Box::new(MeanReversion::new(window, threshold)))
        }
        StrategySpec::Optimized {
            window,
            zscore_threshold,
            adx_max,
            atr_pct_min,
            cooldown_bars,
        } => {
            non_negative("zscore_threshold", zscore_threshold)?;
            non_negative("adx_max", adx_max)?;
            non_negative("atr_pct_min", atr_pct_min)?;
            Ok(Box::new(MeanReversionOptimized::new(
                window,
                threshold,
                zscore_threshold,
                adx_max,
                atr_pct_min,
                cooldown_bars,
            )))
        }
    }
}
