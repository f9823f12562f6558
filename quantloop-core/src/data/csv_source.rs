//! Historical bars from CSV files on disk.
//!
//! Layout: `<dir>/<PAIR>_<tf>.csv` with a header row
//! `timestamp,open,high,low,close,volume` (Unix seconds). Rows are returned in
//! file order; ordering problems are left for the engine to reject.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::dates::filter_by_date;
use super::provider::{DataSource, SeriesProvider, SeriesRequest, SourceError, Timeframe};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct CsvSource {
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, pair: &str, timeframe: Timeframe) -> PathBuf {
        self.dir.join(format!("{pair}_{timeframe}.csv"))
    }

    fn read_file(path: &Path) -> Result<Vec<Bar>, SourceError> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| SourceError::Unavailable {
            source_id: "csv".into(),
            reason: format!("{}: {e}", path.display()),
        })?;

        let mut bars = Vec::new();
        for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(|e| SourceError::Malformed {
                // +2: header line plus 1-based numbering
                location: format!("{}:{}", path.display(), i + 2),
                reason: e.to_string(),
            })?;
            bars.push(Bar {
                timestamp: row.timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }
        Ok(bars)
    }
}

impl SeriesProvider for CsvSource {
    fn source(&self) -> DataSource {
        DataSource::Csv
    }

    fn load(&self, request: &SeriesRequest) -> Result<Vec<Bar>, SourceError> {
        let path = self.path_for(&request.pair, request.timeframe);
        let bars = Self::read_file(&path)?;
        let mut bars = filter_by_date(bars, request.start, request.end);
        if request.limit > 0 && bars.len() > request.limit {
            bars.drain(..bars.len() - request.limit);
        }
        if bars.is_empty() {
            return Err(SourceError::Unavailable {
                source_id: "csv".into(),
                reason: format!("{} has no bars in the requested range", path.display()),
            });
        }
        Ok(bars)
    }
}
