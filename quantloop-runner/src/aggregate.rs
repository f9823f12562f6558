//! Result aggregation across shards.
//!
//! Shard reports are merged, failures counted and set aside, and successes
//! ranked by a total order so the outcome never depends on the order in which
//! shards finished.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use quantloop_core::engine::RunResult;

use crate::sweep::{RunRecord, ShardReport};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("top-k must be at least 1, got {0}")]
    InvalidTopK(usize),

    #[error("grid index {0} reported by more than one shard")]
    DuplicateGridIndex(usize),

    #[error("shard reports disagree on where the soft grid starts")]
    MixedGrids,

    #[error("grid index {index} outside a grid of {grid_size}")]
    GridIndexOutOfRange { index: usize, grid_size: usize },

    #[error("{count} grid indices missing, first is {first}")]
    MissingGridIndices { count: usize, first: usize },
}

/// Ranking key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    #[default]
    #[serde(rename = "final-equity")]
    FinalEquity,
    #[serde(rename = "pf")]
    ProfitFactor,
    #[serde(rename = "return-pct")]
    ReturnPct,
    #[serde(rename = "win-rate")]
    WinRate,
    /// `pf × (1 − max_dd)`, with a missing pf counted as 0.
    #[serde(rename = "score")]
    Score,
}

impl Objective {
    pub const ALL: [Objective; 5] = [
        Objective::FinalEquity,
        Objective::ProfitFactor,
        Objective::ReturnPct,
        Objective::WinRate,
        Objective::Score,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Objective::FinalEquity => "final-equity",
            Objective::ProfitFactor => "pf",
            Objective::ReturnPct => "return-pct",
            Objective::WinRate => "win-rate",
            Objective::Score => "score",
        }
    }

    /// Objective value; `None` when the field does not apply to the run's mode.
    pub fn extract(&self, result: &RunResult) -> Option<f64> {
        let value = match self {
            Objective::FinalEquity => Some(result.final_equity),
            Objective::ProfitFactor => result.pf,
            Objective::ReturnPct => result.return_pct,
            Objective::WinRate => result.win_rate,
            Objective::Score => Some(score(result)),
        };
        value.filter(|v| !v.is_nan())
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase().replace('_', "-");
        Objective::ALL
            .into_iter()
            .find(|o| o.as_str() == s)
            .ok_or_else(|| {
                format!("unknown objective '{s}' (expected final-equity|pf|return-pct|win-rate|score)")
            })
    }
}

/// Drawdown-discounted profit factor.
pub fn score(result: &RunResult) -> f64 {
    result.pf.unwrap_or(0.0) * (1.0 - result.max_dd)
}

/// Descending, absent values last.
fn cmp_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Objective descending, then `max_dd` ascending, then config fields, then grid index.
fn rank_order(objective: Objective, a: &RunRecord, b: &RunRecord) -> Ordering {
    let (ra, rb) = match (a.result(), b.result()) {
        (Some(ra), Some(rb)) => (ra, rb),
        _ => return a.grid_index.cmp(&b.grid_index),
    };
    cmp_desc(objective.extract(ra), objective.extract(rb))
        .then(ra.max_dd.total_cmp(&rb.max_dd))
        .then_with(|| a.config.cmp_fields(&b.config))
        .then(a.grid_index.cmp(&b.grid_index))
}

/// Merged and ranked sweep output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub objective: Objective,
    pub k: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// The standard grid traded nowhere, so soft-grid records were merged in.
    pub used_soft_grid: bool,
    /// Every successful record, best first.
    pub ranked: Vec<RunRecord>,
    /// Failed records in grid order.
    pub failures: Vec<RunRecord>,
}

impl Aggregate {
    /// The first `k` ranked records (all of them when fewer succeeded).
    pub fn top(&self) -> &[RunRecord] {
        &self.ranked[..self.k.min(self.ranked.len())]
    }

    /// Best record per execution mode, in ranking order.
    pub fn best_per_mode(&self) -> Vec<&RunRecord> {
        let mut seen = Vec::new();
        let mut best = Vec::new();
        for rec in &self.ranked {
            if !seen.contains(&rec.config.mode) {
                seen.push(rec.config.mode);
                best.push(rec);
            }
        }
        best
    }
}

/// Merge shard reports and rank successes by `objective`.
///
/// Soft-grid records join the merge only when the standard records of all
/// shards together made no trade; otherwise they are dropped uncounted.
pub fn aggregate(
    shards: &[ShardReport],
    objective: Objective,
    k: usize,
) -> Result<Aggregate, AggregateError> {
    if k == 0 {
        return Err(AggregateError::InvalidTopK(k));
    }
    let soft_offset = shards.first().and_then(|s| s.soft_offset);
    if shards.iter().any(|s| s.soft_offset != soft_offset) {
        return Err(AggregateError::MixedGrids);
    }
    let is_soft = |rec: &RunRecord| soft_offset.is_some_and(|offset| rec.grid_index >= offset);

    let mut seen = BTreeSet::new();
    for rec in shards.iter().flat_map(|s| &s.records) {
        if !seen.insert(rec.grid_index) {
            return Err(AggregateError::DuplicateGridIndex(rec.grid_index));
        }
    }

    let standard_trades: usize = shards
        .iter()
        .flat_map(|s| &s.records)
        .filter(|rec| !is_soft(rec))
        .filter_map(RunRecord::result)
        .map(|r| r.trades)
        .sum();
    let used_soft_grid = soft_offset.is_some() && standard_trades == 0;

    let mut ranked = Vec::new();
    let mut failures = Vec::new();
    for rec in shards.iter().flat_map(|s| &s.records) {
        if is_soft(rec) && !used_soft_grid {
            continue;
        }
        if rec.is_ok() {
            ranked.push(rec.clone());
        } else {
            failures.push(rec.clone());
        }
    }

    ranked.sort_by(|a, b| rank_order(objective, a, b));
    failures.sort_by_key(|r| r.grid_index);

    Ok(Aggregate {
        objective,
        k,
        succeeded: ranked.len(),
        failed: failures.len(),
        used_soft_grid,
        ranked,
        failures,
    })
}

/// Verify that the shards report every index of a `grid_size` grid exactly once.
pub fn check_coverage(shards: &[ShardReport], grid_size: usize) -> Result<(), AggregateError> {
    let mut seen = vec![false; grid_size];
    for rec in shards.iter().flat_map(|s| &s.records) {
        let slot = seen
            .get_mut(rec.grid_index)
            .ok_or(AggregateError::GridIndexOutOfRange {
                index: rec.grid_index,
                grid_size,
            })?;
        if *slot {
            return Err(AggregateError::DuplicateGridIndex(rec.grid_index));
        }
        *slot = true;
    }
    let missing: Vec<usize> = (0..grid_size).filter(|&i| !seen[i]).collect();
    match missing.first() {
        Some(&first) => Err(AggregateError::MissingGridIndices {
            count: missing.len(),
            first,
        }),
        None => Ok(()),
    }
}

/// Sanity filters for picking the parameters to deploy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BestFilter {
    pub min_trades: usize,
    pub min_pf: f64,
    pub max_dd: f64,
    /// Size of the by-pf fallback pool when nothing passes the filters.
    pub fallback_pool: usize,
}

impl Default for BestFilter {
    fn default() -> Self {
        Self {
            min_trades: 50,
            min_pf: 1.3,
            max_dd: 0.25,
            fallback_pool: 5,
        }
    }
}

impl BestFilter {
    pub fn accepts(&self, result: &RunResult) -> bool {
        result.trades >= self.min_trades
            && result.pf.unwrap_or(0.0) >= self.min_pf
            && result.max_dd <= self.max_dd
    }
}

/// The record chosen for deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPick {
    pub record: RunRecord,
    pub score: f64,
    /// False when no record passed the filters and the fallback pool was used.
    pub passed_filters: bool,
}

/// Pick the best record by [`score`], then `return_pct`.
///
/// Candidates are the records passing `filter`; if none do, the
/// `fallback_pool` records with the highest pf. Remaining ties keep the
/// aggregate's ranking order.
pub fn select_best(agg: &Aggregate, filter: &BestFilter) -> Option<BestPick> {
    let passing: Vec<&RunRecord> = agg
        .ranked
        .iter()
        .filter(|r| r.result().is_some_and(|res| filter.accepts(res)))
        .collect();
    let passed_filters = !passing.is_empty();

    let candidates = if passed_filters {
        passing
    } else {
        let mut by_pf: Vec<&RunRecord> = agg.ranked.iter().collect();
        by_pf.sort_by(|a, b| {
            let pf = |r: &RunRecord| r.result().and_then(|res| res.pf).unwrap_or(0.0);
            pf(b).total_cmp(&pf(a))
        });
        by_pf.truncate(filter.fallback_pool.max(1));
        by_pf
    };

    let key = |r: &RunRecord| {
        r.result()
            .map(|res| (score(res), res.return_pct.unwrap_or(0.0)))
            .unwrap_or((0.0, 0.0))
    };
    let mut best: Option<&RunRecord> = None;
    for rec in candidates {
        best = match best {
            Some(cur) => {
                let (s_new, r_new) = key(rec);
                let (s_cur, r_cur) = key(cur);
                let better = s_new.total_cmp(&s_cur).then(r_new.total_cmp(&r_cur)).is_gt();
                Some(if better { rec } else { cur })
            }
            None => Some(rec),
        };
    }

    best.map(|rec| BestPick {
        score: key(rec).0,
        record: rec.clone(),
        passed_filters,
    })
}
