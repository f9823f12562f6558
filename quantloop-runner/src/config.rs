//! Serializable run, sweep and control configuration.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use quantloop_core::data::Timeframe;
use quantloop_core::engine::ExecutionMode;
use quantloop_core::strategy::StrategySpec;

use crate::aggregate::Objective;
use crate::grid::ParamGrid;

/// Content hash of a [`RunConfig`], hex encoded.
pub type RunId = String;

/// Errors from loading configuration files or the environment.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {name}: '{value}' ({reason})")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Identifier of the series source a run reads from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Synthetic,
    Csv,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Synthetic => "synthetic",
            SourceKind::Csv => "csv",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synthetic" => Ok(SourceKind::Synthetic),
            "csv" | "historical" => Ok(SourceKind::Csv),
            other => Err(format!("unknown source '{other}' (expected synthetic|csv)")),
        }
    }
}

/// One grid cell: everything that varies between runs of a sweep.
///
/// Value object: equality by fields, [`RunConfig::run_id`] as cache/log key,
/// and a total order in field declaration order via [`RunConfig::cmp_fields`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub mode: ExecutionMode,
    pub bars: usize,
    pub fee: f64,
    pub threshold: f64,
    pub seed: u64,
    pub strategy: StrategySpec,
    pub source: SourceKind,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Close,
            bars: 500,
            fee: 0.001,
            threshold: 0.005,
            seed: 42,
            strategy: StrategySpec::default(),
            source: SourceKind::Synthetic,
        }
    }
}

impl RunConfig {
    /// Deterministic BLAKE3 digest of every field.
    ///
    /// Two configs with identical fields share a RunId.
    pub fn run_id(&self) -> RunId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.mode.as_str().as_bytes());
        hasher.update(&(self.bars as u64).to_le_bytes());
        hasher.update(&self.fee.to_bits().to_le_bytes());
        hasher.update(&self.threshold.to_bits().to_le_bytes());
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(self.strategy.id().as_bytes());
        for p in self.strategy.params() {
            hasher.update(&p.to_bits().to_le_bytes());
        }
        hasher.update(self.source.as_str().as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Total order over fields in declaration order; floats via `total_cmp`.
    pub fn cmp_fields(&self, other: &Self) -> Ordering {
        self.mode
            .cmp(&other.mode)
            .then(self.bars.cmp(&other.bars))
            .then(self.fee.total_cmp(&other.fee))
            .then(self.threshold.total_cmp(&other.threshold))
            .then(self.seed.cmp(&other.seed))
            .then(
                self.strategy
                    .variant_rank()
                    .cmp(&other.strategy.variant_rank()),
            )
            .then_with(|| {
                let (a, b) = (self.strategy.params(), other.strategy.params());
                a.iter()
                    .zip(&b)
                    .map(|(x, y)| x.total_cmp(y))
                    .find(|o| o.is_ne())
                    .unwrap_or_else(|| a.len().cmp(&b.len()))
            })
            .then(self.source.cmp(&other.source))
    }
}

/// Where and what to load; shared by every config of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub pair: String,
    pub timeframe: Timeframe,
    pub data_dir: PathBuf,
    /// Replace an unavailable historical source with the synthetic walk.
    pub fallback_to_synthetic: bool,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            pair: "BTCUSDT".into(),
            timeframe: Timeframe::M15,
            data_dir: PathBuf::from("data"),
            fallback_to_synthetic: true,
            start: None,
            end: None,
        }
    }
}

/// Ranking settings for the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateSettings {
    pub objective: Objective,
    pub top_k: usize,
}

impl Default for AggregateSettings {
    fn default() -> Self {
        Self {
            objective: Objective::FinalEquity,
            top_k: 5,
        }
    }
}

/// Sweep file (`sweep.toml`).
///
/// ```toml
/// [data]
/// pair = "BTCUSDT"
/// timeframe = "15m"
///
/// [grid]
/// modes = ["close", "onebar"]
/// thresholds = [0.003, 0.005]
///
/// [soft]
/// zscore_thresholds = [1.0, 1.2]
///
/// [aggregate]
/// objective = "pf"
/// top_k = 3
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub data: DataSettings,
    pub grid: ParamGrid,
    /// Looser grid appended after `grid`; its results count only when no
    /// standard cell trades in any shard.
    pub soft: Option<ParamGrid>,
    pub aggregate: AggregateSettings,
}

impl SweepConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigLoadError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

/// Safety limits of the task orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Proposal attempts per task before it is aborted.
    pub max_iterations: u32,
    /// Completed tasks after which a run halts.
    pub tasks_per_run: u32,
    /// Wall-clock budget in minutes; 0 means unlimited.
    pub time_budget_min: u64,
    /// Marker file whose presence halts the run at the next check point.
    pub stop_file: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            tasks_per_run: 1,
            time_budget_min: 0,
            stop_file: PathBuf::from("STOP"),
        }
    }
}

fn parse_var<T: FromStr>(
    name: &'static str,
    value: String,
    min: T,
) -> Result<T, ConfigLoadError>
where
    T: PartialOrd + fmt::Display,
    T::Err: fmt::Display,
{
    let parsed: T = value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigLoadError::InvalidVar {
            name,
            value: value.clone(),
            reason: e.to_string(),
        })?;
    if parsed < min {
        return Err(ConfigLoadError::InvalidVar {
            name,
            value,
            reason: format!("must be >= {min}"),
        });
    }
    Ok(parsed)
}

impl ControlConfig {
    /// Read `MAX_ITERATIONS`, `TASKS_PER_RUN`, `TIME_BUDGET_MIN` and `STOP_FILE`
    /// from the process environment; unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ControlConfig::from_env`] with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigLoadError> {
        let mut cfg = Self::default();
        if let Some(v) = lookup("MAX_ITERATIONS") {
            cfg.max_iterations = parse_var("MAX_ITERATIONS", v, 1)?;
        }
        if let Some(v) = lookup("TASKS_PER_RUN") {
            cfg.tasks_per_run = parse_var("TASKS_PER_RUN", v, 1)?;
        }
        if let Some(v) = lookup("TIME_BUDGET_MIN") {
            cfg.time_budget_min = parse_var("TIME_BUDGET_MIN", v, 0)?;
        }
        if let Some(v) = lookup("STOP_FILE") {
            if !v.trim().is_empty() {
                cfg.stop_file = PathBuf::from(v.trim());
            }
        }
        Ok(cfg)
    }

    /// Budget as a duration, `None` when unlimited. Saturates at `u64::MAX` seconds.
    pub fn time_budget(&self) -> Option<std::time::Duration> {
        (self.time_budget_min > 0)
            .then(|| std::time::Duration::from_secs(self.time_budget_min.saturating_mul(60)))
    }
}
