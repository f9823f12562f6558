//! Artifacts: results CSV, shard report JSON, best-parameters JSON.
//!
//! The results CSV has a fixed column set shared by both execution modes;
//! fields that do not apply to a row's mode are left empty. JSON artifacts
//! carry a `schema_version` and newer versions are rejected on load.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use quantloop_core::engine::{ExecutionMode, RunResult};

use crate::aggregate::{Aggregate, BestPick, Objective};
use crate::config::RunConfig;
use crate::sweep::{RunRecord, ShardReport};

pub const SCHEMA_VERSION: u32 = 1;

/// Column order of the results CSV.
pub const RESULT_COLUMNS: [&str; 12] = [
    "mode",
    "bars",
    "fee",
    "threshold",
    "seed",
    "trades",
    "final_equity",
    "win_rate",
    "pf",
    "max_dd",
    "return_pct",
    "total_fees",
];

/// One row of the results CSV. Field order matches [`RESULT_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub mode: ExecutionMode,
    pub bars: usize,
    pub fee: f64,
    pub threshold: f64,
    pub seed: u64,
    pub trades: usize,
    pub final_equity: f64,
    pub win_rate: Option<f64>,
    pub pf: Option<f64>,
    pub max_dd: f64,
    pub return_pct: Option<f64>,
    pub total_fees: Option<f64>,
}

impl ResultRow {
    pub fn new(config: &RunConfig, result: &RunResult) -> Self {
        Self {
            mode: config.mode,
            bars: config.bars,
            fee: config.fee,
            threshold: config.threshold,
            seed: config.seed,
            trades: result.trades,
            final_equity: result.final_equity,
            win_rate: result.win_rate,
            pf: result.pf,
            max_dd: result.max_dd,
            return_pct: result.return_pct,
            total_fees: result.total_fees,
        }
    }
}

fn rows(records: &[RunRecord]) -> impl Iterator<Item = ResultRow> + '_ {
    records
        .iter()
        .filter_map(|r| r.result().map(|res| ResultRow::new(&r.config, res)))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

// ─── Results CSV ────────────────────────────────────────────────────

/// Render successful records as CSV text, header included.
pub fn results_to_csv(records: &[RunRecord]) -> Result<String> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(vec![]);
    wtr.write_record(RESULT_COLUMNS)?;
    for row in rows(records) {
        wtr.serialize(row)?;
    }
    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// Write successful records to `path`.
///
/// With `append`, rows are added to an existing file and the header is only
/// written when the file is new or empty.
pub fn write_results_csv(path: &Path, records: &[RunRecord], append: bool) -> Result<()> {
    ensure_parent(path)?;
    let existing = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let write_header = !append || existing == 0;

    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if write_header {
        wtr.write_record(RESULT_COLUMNS)?;
    }
    for row in rows(records) {
        wtr.serialize(row)?;
    }
    wtr.flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Read a results CSV back into rows.
pub fn read_results_csv(path: &Path) -> Result<Vec<ResultRow>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = rdr.headers()?.clone();
    if headers.iter().ne(RESULT_COLUMNS) {
        bail!(
            "unexpected columns in {}: {}",
            path.display(),
            headers.iter().collect::<Vec<_>>().join(",")
        );
    }
    rdr.deserialize()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("{}: bad row {}", path.display(), i + 2)))
        .collect()
}

// ─── Shard reports ──────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct ShardArtifact {
    schema_version: u32,
    #[serde(flatten)]
    report: ShardReport,
}

/// File name of a shard report inside an output directory.
pub fn shard_report_path(dir: &Path, shard_index: usize, shard_count: usize) -> PathBuf {
    dir.join(format!("shard_{shard_index}_of_{shard_count}.json"))
}

pub fn write_shard_report(path: &Path, report: &ShardReport) -> Result<()> {
    ensure_parent(path)?;
    let artifact = ShardArtifact {
        schema_version: SCHEMA_VERSION,
        report: report.clone(),
    };
    let json = serde_json::to_string_pretty(&artifact).context("failed to serialize shard report")?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

pub fn read_shard_report(path: &Path) -> Result<ShardReport> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let artifact: ShardArtifact = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse shard report {}", path.display()))?;
    if artifact.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} in {} (max supported: {})",
            artifact.schema_version,
            path.display(),
            SCHEMA_VERSION
        );
    }
    Ok(artifact.report)
}

/// Every `shard_*.json` in `dir`, sorted by file name.
pub fn read_shard_reports(dir: &Path) -> Result<Vec<ShardReport>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "json")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("shard_"))
        })
        .collect();
    paths.sort();
    paths.iter().map(|p| read_shard_report(p)).collect()
}

// ─── Best parameters ────────────────────────────────────────────────

/// Top-K summary written after aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestParams {
    pub schema_version: u32,
    pub objective: Objective,
    pub k: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub used_soft_grid: bool,
    pub top: Vec<RunRecord>,
    pub best: Option<BestPick>,
}

impl BestParams {
    pub fn new(agg: &Aggregate, best: Option<BestPick>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            objective: agg.objective,
            k: agg.k,
            succeeded: agg.succeeded,
            failed: agg.failed,
            used_soft_grid: agg.used_soft_grid,
            top: agg.top().to_vec(),
            best,
        }
    }
}

pub fn write_best_params(path: &Path, best: &BestParams) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(best).context("failed to serialize best parameters")?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

pub fn read_best_params(path: &Path) -> Result<BestParams> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let best: BestParams = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse best parameters {}", path.display()))?;
    if best.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            best.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(best)
}
