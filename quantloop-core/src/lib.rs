//! Quantloop Core: bars, series providers, indicators, strategies, backtest engine.
//!
//! This crate contains the single-run simulation:
//! - Domain types (bars, signals)
//! - Series providers (seeded synthetic walk, historical CSV files)
//! - Windowed indicators (SMA, z-score, ATR%, simplified ADX)
//! - Strategies that see only bars strictly before the bar they act on
//! - Backtest engine with `close` and `onebar` execution semantics

pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod strategy;
