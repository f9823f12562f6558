//! Series loading for the runner.
//!
//! Fallback policy:
//! 1. Synthetic runs use the seeded walk directly.
//! 2. Historical runs read the CSV store.
//! 3. If the store is unavailable and fallback is enabled, the synthetic walk
//!    for the same request is used instead and the switch is logged.
//! 4. Otherwise the source error is returned to the caller.
//!
//! Malformed historical data is never papered over by the fallback.

use tracing::{debug, warn};

use quantloop_core::data::{CsvSource, DataSource, SeriesProvider, SeriesRequest, SourceError, SyntheticSource};
use quantloop_core::domain::Bar;

use crate::config::{DataSettings, SourceKind};

/// Result of loading one series, with provenance.
#[derive(Debug, Clone)]
pub struct LoadedSeries {
    pub bars: Vec<Bar>,
    pub source: DataSource,
    /// BLAKE3 over every bar, for fingerprinting runs.
    pub dataset_hash: String,
    /// True when the requested source was replaced by the synthetic walk.
    pub fell_back: bool,
}

impl LoadedSeries {
    fn new(bars: Vec<Bar>, source: DataSource, fell_back: bool) -> Self {
        let dataset_hash = dataset_hash(&bars);
        Self {
            bars,
            source,
            dataset_hash,
            fell_back,
        }
    }
}

/// Deterministic hash over timestamps and OHLCV values in series order.
pub fn dataset_hash(bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.timestamp.to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Request for `bars` bars of the configured pair and timeframe.
pub fn series_request(settings: &DataSettings, bars: usize, seed: u64) -> SeriesRequest {
    SeriesRequest::new(settings.pair.clone(), settings.timeframe, bars, seed)
        .with_range(settings.start, settings.end)
}

/// Load a series from `source`, applying the synthetic fallback policy.
pub fn load_series(
    settings: &DataSettings,
    source: SourceKind,
    bars: usize,
    seed: u64,
) -> Result<LoadedSeries, SourceError> {
    let request = series_request(settings, bars, seed);
    let synthetic = SyntheticSource::new();
    match source {
        SourceKind::Synthetic => load_from(&synthetic, &request, None),
        SourceKind::Csv => {
            let csv = CsvSource::new(&settings.data_dir);
            let fallback = settings
                .fallback_to_synthetic
                .then_some(&synthetic as &dyn SeriesProvider);
            load_from(&csv, &request, fallback)
        }
    }
}

/// Load from `primary`; on [`SourceError::Unavailable`] try `fallback` if given.
pub fn load_from(
    primary: &dyn SeriesProvider,
    request: &SeriesRequest,
    fallback: Option<&dyn SeriesProvider>,
) -> Result<LoadedSeries, SourceError> {
    match primary.load(request) {
        Ok(bars) => {
            debug!(
                source = %primary.source(),
                pair = %request.pair,
                timeframe = %request.timeframe,
                bars = bars.len(),
                "series loaded"
            );
            Ok(LoadedSeries::new(bars, primary.source(), false))
        }
        Err(err) if err.is_unavailable() => match fallback {
            Some(fb) => {
                warn!(
                    error = %err,
                    pair = %request.pair,
                    fallback = %fb.source(),
                    "series source unavailable, using fallback"
                );
                let bars = fb.load(request)?;
                Ok(LoadedSeries::new(bars, fb.source(), true))
            }
            None => Err(err),
        },
        Err(err) => Err(err),
    }
}
