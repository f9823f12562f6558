//! Series provider trait, request type and structured errors.
//!
//! The trait abstracts over where bars come from (seeded synthetic walk,
//! historical CSV files) so callers can swap implementations and mock for tests.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::Bar;

/// Supported bar intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[default]
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn seconds(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s.trim())
            .ok_or_else(|| format!("unsupported timeframe '{s}' (supported: 1m 5m 15m 1h 4h 1d)"))
    }
}

/// What to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRequest {
    pub pair: String,
    pub timeframe: Timeframe,
    /// Number of bars wanted; historical sources return the most recent `limit`.
    pub limit: usize,
    /// Seed for generated sources; ignored by historical ones.
    pub seed: u64,
    /// Inclusive date range (UTC days).
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl SeriesRequest {
    pub fn new(pair: impl Into<String>, timeframe: Timeframe, limit: usize, seed: u64) -> Self {
        Self {
            pair: pair.into(),
            timeframe,
            limit,
            seed,
            start: None,
            end: None,
        }
    }

    pub fn with_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start = start;
        self.end = end;
        self
    }
}

/// Structured errors from series providers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("source '{source_id}' unavailable: {reason}")]
    Unavailable { source_id: String, reason: String },

    #[error("malformed data in {location}: {reason}")]
    Malformed { location: String, reason: String },
}

impl SourceError {
    /// True when a caller may recover by switching to another source.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SourceError::Unavailable { .. })
    }
}

/// Where a loaded series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Synthetic,
    Csv,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Synthetic => f.write_str("synthetic"),
            DataSource::Csv => f.write_str("csv"),
        }
    }
}

/// Trait for series providers.
pub trait SeriesProvider: Send + Sync {
    /// Provenance tag of the bars this provider returns.
    fn source(&self) -> DataSource;

    /// Load an ordered bar series.
    fn load(&self, request: &SeriesRequest) -> Result<Vec<Bar>, SourceError>;
}
