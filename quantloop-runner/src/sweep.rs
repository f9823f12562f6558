//! Shard runner: one engine invocation per assigned config.
//!
//! Per-config failures become [`RunOutcome::Failed`] records and never abort
//! the shard. Series are loaded once per `(source, bars, seed)` key and shared
//! by every config that needs them. A soft grid runs alongside the standard
//! one; [`aggregate`](crate::aggregate::aggregate) decides which records count.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use quantloop_core::engine::{run_backtest, EngineConfig, RunResult};
use quantloop_core::strategy::build_strategy;

use crate::config::{DataSettings, RunConfig, SourceKind, SweepConfig};
use crate::grid::ParamGrid;
use crate::loader::{load_series, LoadedSeries};
use crate::shard::{partition, ShardError, ShardSpec};

/// Outcome of one config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Ok(RunResult),
    /// `kind` is the error family (`ConfigError`, `DataError`).
    Failed { kind: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub grid_index: usize,
    pub config: RunConfig,
    pub outcome: RunOutcome,
}

impl RunRecord {
    pub fn result(&self) -> Option<&RunResult> {
        match &self.outcome {
            RunOutcome::Ok(r) => Some(r),
            RunOutcome::Failed { .. } => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result().is_some()
    }
}

/// Everything one shard produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardReport {
    pub shard_index: usize,
    pub shard_count: usize,
    /// Size of the full grid this shard was cut from.
    pub grid_size: usize,
    /// First grid index of the soft grid, which is appended to the standard
    /// one. Whether soft records count is decided when all shards are merged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft_offset: Option<usize>,
    pub records: Vec<RunRecord>,
}

impl ShardReport {
    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.succeeded()
    }

    /// Trades summed over successful records.
    pub fn total_trades(&self) -> usize {
        self.records
            .iter()
            .filter_map(RunRecord::result)
            .map(|r| r.trades)
            .sum()
    }

    pub fn is_soft(&self, record: &RunRecord) -> bool {
        self.soft_offset
            .is_some_and(|offset| record.grid_index >= offset)
    }

    /// Records of the soft grid.
    pub fn soft_cells(&self) -> usize {
        self.records.iter().filter(|r| self.is_soft(r)).count()
    }
}

type SeriesKey = (SourceKind, usize, u64);

fn series_key(cfg: &RunConfig) -> SeriesKey {
    (cfg.source, cfg.bars, cfg.seed)
}

/// Executes shards of a sweep, optionally in parallel within the shard.
pub struct ShardRunner {
    data: DataSettings,
    parallel: bool,
}

impl ShardRunner {
    pub fn new(data: DataSettings) -> Self {
        Self {
            data,
            parallel: true,
        }
    }

    /// Enables or disables parallel execution inside a shard.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn data(&self) -> &DataSettings {
        &self.data
    }

    /// Run one config against an already loaded series.
    pub fn run_config(&self, config: &RunConfig, series: &LoadedSeries) -> RunOutcome {
        let outcome = build_strategy(&config.strategy, config.threshold)
            .map_err(|e| RunOutcome::Failed {
                kind: "ConfigError".into(),
                message: e.to_string(),
            })
            .and_then(|strategy| {
                let engine = EngineConfig::new(config.mode, config.fee);
                run_backtest(&series.bars, strategy.as_ref(), &engine).map_err(|e| {
                    RunOutcome::Failed {
                        kind: e.kind().into(),
                        message: e.to_string(),
                    }
                })
            });
        match outcome {
            Ok(result) => RunOutcome::Ok(result),
            Err(failed) => failed,
        }
    }

    fn load_all(
        &self,
        assigned: &[(usize, RunConfig)],
    ) -> HashMap<SeriesKey, Result<Arc<LoadedSeries>, String>> {
        let mut cache = HashMap::new();
        for (_, cfg) in assigned {
            cache.entry(series_key(cfg)).or_insert_with(|| {
                load_series(&self.data, cfg.source, cfg.bars, cfg.seed)
                    .map(Arc::new)
                    .map_err(|e| {
                        warn!(error = %e, bars = cfg.bars, seed = cfg.seed, "series load failed");
                        e.to_string()
                    })
            });
        }
        cache
    }

    /// Run every assigned `(grid_index, config)` and report each one.
    pub fn run_shard(
        &self,
        assigned: &[(usize, RunConfig)],
        shard: ShardSpec,
        grid_size: usize,
    ) -> ShardReport {
        info!(shard = %shard, configs = assigned.len(), grid_size, "shard started");
        let cache = self.load_all(assigned);

        let run_one = |(grid_index, config): &(usize, RunConfig)| {
            let outcome = match cache.get(&series_key(config)) {
                Some(Ok(series)) => self.run_config(config, series),
                Some(Err(message)) => RunOutcome::Failed {
                    kind: "DataError".into(),
                    message: message.clone(),
                },
                None => RunOutcome::Failed {
                    kind: "DataError".into(),
                    message: "series not loaded".into(),
                },
            };
            if let RunOutcome::Failed { kind, message } = &outcome {
                debug!(grid_index, kind = %kind, message = %message, "config failed");
            }
            RunRecord {
                grid_index: *grid_index,
                config: config.clone(),
                outcome,
            }
        };

        let records: Vec<RunRecord> = if self.parallel {
            assigned.par_iter().map(run_one).collect()
        } else {
            assigned.iter().map(run_one).collect()
        };

        let report = ShardReport {
            shard_index: shard.index,
            shard_count: shard.count,
            grid_size,
            soft_offset: None,
            records,
        };
        info!(
            shard = %shard,
            succeeded = report.succeeded(),
            failed = report.failed(),
            trades = report.total_trades(),
            "shard finished"
        );
        report
    }

    /// Expand `grid`, take this shard's slice and run it.
    pub fn run_grid_shard(
        &self,
        grid: &ParamGrid,
        base: &RunConfig,
        shard: ShardSpec,
    ) -> Result<ShardReport, ShardError> {
        let configs = grid.expand(base);
        let assigned = partition(&configs, shard.count, shard.index)?;
        Ok(self.run_shard(&assigned, shard, configs.len()))
    }

    /// Run this shard's slice of the sweep grid.
    ///
    /// A configured soft grid is appended after the standard one and striped
    /// with it, so every shard runs its share of both.
    pub fn run_sweep_shard(
        &self,
        sweep: &SweepConfig,
        base: &RunConfig,
        shard: ShardSpec,
    ) -> Result<ShardReport, ShardError> {
        let Some(soft) = &sweep.soft else {
            return self.run_grid_shard(&sweep.grid, base, shard);
        };
        let mut configs = sweep.grid.expand(base);
        let offset = configs.len();
        configs.extend(soft.expand(base));
        let assigned = partition(&configs, shard.count, shard.index)?;
        let mut report = self.run_shard(&assigned, shard, configs.len());
        report.soft_offset = Some(offset);
        Ok(report)
    }
}

/// Run every shard of `grid` in-process, shards in parallel.
pub fn run_all_shards(
    runner: &ShardRunner,
    grid: &[RunConfig],
    shard_count: usize,
) -> Result<Vec<ShardReport>, ShardError> {
    let assignments = (0..shard_count)
        .map(|index| {
            let spec = ShardSpec::new(index, shard_count)?;
            Ok((spec, partition(grid, shard_count, index)?))
        })
        .collect::<Result<Vec<_>, ShardError>>()?;
    if assignments.is_empty() {
        return Err(ShardError::ZeroShards);
    }

    Ok(assignments
        .par_iter()
        .map(|(spec, assigned)| runner.run_shard(assigned, *spec, grid.len()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantloop_core::engine::ExecutionMode;
    use quantloop_core::strategy::StrategySpec;

    fn small_grid() -> Vec<RunConfig> {
        ParamGrid {
            bars: vec![120],
            thresholds: vec![0.002, 0.005],
            seeds: vec![1, 2],
            ..ParamGrid::default()
        }
        .expand(&RunConfig::default())
    }

    #[test]
    fn every_assigned_config_is_reported_in_order() {
        let grid = small_grid();
        let runner = ShardRunner::new(DataSettings::default()).with_parallelism(false);
        let assigned = partition(&grid, 3, 1).unwrap();
        let report = runner.run_shard(&assigned, ShardSpec::new(1, 3).unwrap(), grid.len());
        let got: Vec<usize> = report.records.iter().map(|r| r.grid_index).collect();
        let want: Vec<usize> = assigned.iter().map(|(i, _)| *i).collect();
        assert_eq!(got, want);
        assert_eq!(report.failed(), 0);
    }

    #[test]
    fn parallel_matches_sequential() {
        let grid = small_grid();
        let assigned = partition(&grid, 1, 0).unwrap();
        let seq = ShardRunner::new(DataSettings::default())
            .with_parallelism(false)
            .run_shard(&assigned, ShardSpec::whole(), grid.len());
        let par = ShardRunner::new(DataSettings::default())
            .with_parallelism(true)
            .run_shard(&assigned, ShardSpec::whole(), grid.len());
        assert_eq!(seq, par);
    }

    #[test]
    fn short_series_is_a_config_failure_not_a_shard_failure() {
        let grid = vec![
            RunConfig {
                bars: 10,
                ..RunConfig::default()
            },
            RunConfig {
                bars: 100,
                ..RunConfig::default()
            },
        ];
        let runner = ShardRunner::new(DataSettings::default());
        let report = runner.run_shard(&partition(&grid, 1, 0).unwrap(), ShardSpec::whole(), 2);
        assert_eq!(report.records.len(), 2);
        assert!(matches!(
            &report.records[0].outcome,
            RunOutcome::Failed { kind, .. } if kind == "ConfigError"
        ));
        assert!(report.records[0].result().is_none());
        assert!(report.records[1].is_ok());
        assert_eq!((report.succeeded(), report.failed()), (1, 1));
    }

    #[test]
    fn invalid_strategy_params_fail_only_their_config() {
        let grid = vec![
            RunConfig {
                strategy: StrategySpec::MeanReversion { window: 1 },
                ..RunConfig::default()
            },
            RunConfig {
                mode: ExecutionMode::OneBar,
                ..RunConfig::default()
            },
        ];
        let report = ShardRunner::new(DataSettings::default()).run_shard(
            &partition(&grid, 1, 0).unwrap(),
            ShardSpec::whole(),
            2,
        );
        assert!(!report.records[0].is_ok());
        assert!(report.records[1].result().and_then(|r| r.pf).is_some());
    }

    #[test]
    fn soft_grid_is_appended_after_the_standard_grid() {
        let base = RunConfig::default();
        let standard = ParamGrid {
            modes: vec![ExecutionMode::Close],
            bars: vec![200],
            thresholds: vec![10.0, 0.0],
            ..ParamGrid::default()
        };
        let soft = ParamGrid {
            modes: vec![ExecutionMode::Close],
            bars: vec![200],
            thresholds: vec![0.001, 0.002, 0.003],
            ..ParamGrid::default()
        };
        let sweep = SweepConfig {
            grid: standard.clone(),
            soft: Some(soft),
            ..SweepConfig::default()
        };
        let runner = ShardRunner::new(DataSettings::default()).with_parallelism(false);

        let report = runner.run_sweep_shard(&sweep, &base, ShardSpec::new(1, 2).unwrap()).unwrap();
        assert_eq!(report.grid_size, 5);
        assert_eq!(report.soft_offset, Some(2));
        let indices: Vec<usize> = report.records.iter().map(|r| r.grid_index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert_eq!(report.soft_cells(), 1);
        assert_eq!(report.records[1].config.threshold, 0.002);

        let no_soft = SweepConfig {
            grid: standard,
            ..SweepConfig::default()
        };
        let report = runner.run_sweep_shard(&no_soft, &base, ShardSpec::whole()).unwrap();
        assert_eq!(report.soft_offset, None);
        assert_eq!(report.grid_size, 2);
    }

    #[test]
    fn run_all_shards_covers_grid() {
        let grid = small_grid();
        let runner = ShardRunner::new(DataSettings::default());
        let reports = run_all_shards(&runner, &grid, 3).unwrap();
        assert_eq!(reports.len(), 3);
        let mut seen: Vec<usize> = reports
            .iter()
            .flat_map(|r| r.records.iter().map(|rec| rec.grid_index))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..grid.len()).collect::<Vec<_>>());
        assert!(matches!(run_all_shards(&runner, &grid, 0), Err(ShardError::ZeroShards)));
    }
}
