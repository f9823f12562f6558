//! Parameter grid expansion.
//!
//! A grid is a set of axes; [`ParamGrid::expand`] takes their cartesian
//! product in a fixed nesting order so that grid indices are stable across
//! processes and shard invocations.

use serde::{Deserialize, Serialize};

use quantloop_core::engine::ExecutionMode;
use quantloop_core::strategy::StrategySpec;

use crate::config::RunConfig;

/// Which strategy family the grid sweeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    MeanReversion,
    Optimized,
}

/// Parameter grid specification.
///
/// Strategy filter axes (`zscore_thresholds` through `cooldowns`) only apply
/// to [`StrategyKind::Optimized`]; they are ignored for plain mean reversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    pub modes: Vec<ExecutionMode>,
    pub bars: Vec<usize>,
    pub fees: Vec<f64>,
    pub thresholds: Vec<f64>,
    pub seeds: Vec<u64>,
    pub strategy: StrategyKind,
    pub windows: Vec<usize>,
    pub zscore_thresholds: Vec<f64>,
    pub adx_maxes: Vec<f64>,
    pub atr_pct_mins: Vec<f64>,
    pub cooldowns: Vec<usize>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            modes: vec![ExecutionMode::Close, ExecutionMode::OneBar],
            bars: vec![500],
            fees: vec![0.001],
            thresholds: vec![0.005],
            seeds: vec![42],
            strategy: StrategyKind::MeanReversion,
            windows: vec![20],
            zscore_thresholds: vec![1.2, 1.5, 1.8, 2.0],
            adx_maxes: vec![20.0, 25.0, 30.0],
            atr_pct_mins: vec![0.003, 0.004, 0.005],
            cooldowns: vec![3, 5],
        }
    }
}

impl ParamGrid {
    /// Filter search over the optimized strategy: 4 × 3 × 3 × 2 = 72 cells.
    pub fn optimizer_standard() -> Self {
        Self {
            modes: vec![ExecutionMode::Close],
            bars: vec![3_000],
            strategy: StrategyKind::Optimized,
            ..Self::default()
        }
    }

    /// Looser filters, tried when the standard search produced no trades.
    pub fn optimizer_soft() -> Self {
        Self {
            zscore_thresholds: vec![1.0, 1.2, 1.5],
            adx_maxes: vec![25.0, 30.0, 35.0],
            atr_pct_mins: vec![0.002, 0.003, 0.004],
            cooldowns: vec![3, 5],
            ..Self::optimizer_standard()
        }
    }

    fn strategy_axis_len(&self) -> usize {
        match self.strategy {
            StrategyKind::MeanReversion => self.windows.len(),
            StrategyKind::Optimized => {
                self.windows.len()
                    * self.zscore_thresholds.len()
                    * self.adx_maxes.len()
                    * self.atr_pct_mins.len()
                    * self.cooldowns.len()
            }
        }
    }

    /// Number of configurations [`ParamGrid::expand`] yields.
    pub fn size(&self) -> usize {
        self.modes.len()
            * self.bars.len()
            * self.fees.len()
            * self.thresholds.len()
            * self.seeds.len()
            * self.strategy_axis_len()
    }

    fn strategy_specs(&self) -> Vec<StrategySpec> {
        match self.strategy {
            StrategyKind::MeanReversion => self
                .windows
                .iter()
                .map(|&window| StrategySpec::MeanReversion { window })
                .collect(),
            StrategyKind::Optimized => {
                let mut specs = Vec::with_capacity(self.strategy_axis_len());
                for &window in &self.windows {
                    for &zscore_threshold in &self.zscore_thresholds {
                        for &adx_max in &self.adx_maxes {
                            for &atr_pct_min in &self.atr_pct_mins {
                                for &cooldown_bars in &self.cooldowns {
                                    specs.push(StrategySpec::Optimized {
                                        window,
                                        zscore_threshold,
                                        adx_max,
                                        atr_pct_min,
                                        cooldown_bars,
                                    });
                                }
                            }
                        }
                    }
                }
                specs
            }
        }
    }

    /// Cartesian product, nested as modes > bars > fees > thresholds > seeds > strategy.
    ///
    /// Fields not covered by an axis (the series source) are taken from `base`.
    pub fn expand(&self, base: &RunConfig) -> Vec<RunConfig> {
        let specs = self.strategy_specs();
        let mut configs = Vec::with_capacity(self.size());

        for &mode in &self.modes {
            for &bars in &self.bars {
                for &fee in &self.fees {
                    for &threshold in &self.thresholds {
                        for &seed in &self.seeds {
                            for spec in &specs {
                                configs.push(RunConfig {
                                    mode,
                                    bars,
                                    fee,
                                    threshold,
                                    seed,
                                    strategy: spec.clone(),
                                    ..base.clone()
                                });
                            }
                        }
                    }
                }
            }
        }

        configs
    }
}
