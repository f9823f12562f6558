//! Seeded synthetic OHLCV walk.
//!
//! Gaussian 2% steps around a base price of 100 with a pull back toward the
//! base once price strays more than 10% from it, floored at half the base.
//! The RNG seed is a BLAKE3 digest of `(seed, pair, timeframe)`, so every pair
//! gets its own deterministic path.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{DataSource, SeriesProvider, SeriesRequest, SourceError, Timeframe};
use crate::domain::Bar;

/// 2021-01-01T00:00:00Z.
pub const DEFAULT_START_TS: i64 = 1_609_459_200;

const BASE_PRICE: f64 = 100.0;
const STEP_VOL: f64 = 0.02;
const BASE_VOLUME: f64 = 1_000.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticSource;

impl SyntheticSource {
    pub fn new() -> Self {
        Self
    }
}

/// Derive the walk seed for one request.
pub fn walk_seed(seed: u64, pair: &str, timeframe: Timeframe) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(pair.as_bytes());
    hasher.update(timeframe.as_str().as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

fn day_start(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(DEFAULT_START_TS)
}

/// Standard normal draw (Box-Muller).
fn gauss(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Generate `n` bars starting at `start_ts`, spaced by the timeframe.
pub fn generate_walk(n: usize, start_ts: i64, timeframe: Timeframe, seed: u64) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let step = timeframe.seconds();
    let mut price = BASE_PRICE;
    let mut bars = Vec::with_capacity(n);

    for i in 0..n {
        let mut change = gauss(&mut rng) * STEP_VOL;
        if (price - BASE_PRICE).abs() > BASE_PRICE * 0.1 {
            change *= -0.5;
        }
        let next = (price * (1.0 + change)).max(BASE_PRICE * 0.5);

        let open = price;
        let close = next;
        let wick = change.abs() * 0.5;
        let high = open.max(close) * (1.0 + wick);
        let low = open.min(close) * (1.0 - wick);
        let volume = (BASE_VOLUME * (1.0 + change.abs() * 2.0) * rng.gen_range(0.5..1.5)).floor();

        bars.push(Bar {
            timestamp: start_ts + i as i64 * step,
            open,
            high,
            low,
            close,
            volume,
        });
        price = next;
    }
    bars
}

impl SeriesProvider for SyntheticSource {
    fn source(&self) -> DataSource {
        DataSource::Synthetic
    }

    fn load(&self, request: &SeriesRequest) -> Result<Vec<Bar>, SourceError> {
        let start_ts = request.start.map(day_start).unwrap_or(DEFAULT_START_TS);
        let n = match (request.start, request.end) {
            (Some(_), Some(end)) => {
                let span = day_start(end) - start_ts;
                if span < 0 {
                    return Err(SourceError::Malformed {
                        location: "request".into(),
                        reason: format!("end {end} precedes start"),
                    });
                }
                (span / request.timeframe.seconds()) as usize + 1
            }
            _ => request.limit,
        };
        let seed = walk_seed(request.seed, &request.pair, request.timeframe);
        Ok(generate_walk(n, start_ts, request.timeframe, seed))
    }
}
