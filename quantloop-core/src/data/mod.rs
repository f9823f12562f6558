//! Data layer: provider trait, synthetic walk, historical CSV files, date filter.

pub mod csv_source;
pub mod dates;
pub mod provider;
pub mod synthetic;

pub use csv_source::CsvSource;
pub use dates::filter_by_date;
pub use provider::{DataSource, SeriesProvider, SeriesRequest, SourceError, Timeframe};
pub use synthetic::{generate_walk, SyntheticSource};
