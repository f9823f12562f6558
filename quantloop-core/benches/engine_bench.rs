//! Criterion benchmarks for the replay hot path.
//!
//! Benchmarks:
//! 1. Full backtest per mode and strategy variant
//! 2. Windowed indicator evaluation on a visible slice

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use quantloop_core::data::{generate_walk, Timeframe};
use quantloop_core::engine::{run_backtest, EngineConfig, ExecutionMode};
use quantloop_core::indicators::{Adx, AtrPct, Indicator, Sma, ZScore};
use quantloop_core::strategy::{build_strategy, StrategySpec};

fn bench_backtest(c: &mut Criterion) {
    let mut group = c.benchmark_group("backtest");
    let specs = [
        StrategySpec::MeanReversion { window: 20 },
        StrategySpec::Optimized {
            window: 20,
            zscore_threshold: 1.5,
            adx_max: 25.0,
            atr_pct_min: 0.003,
            cooldown_bars: 3,
        },
    ];

    for n in [500usize, 2_000] {
        let bars = generate_walk(n, 1_609_459_200, Timeframe::H1, 42);
        for spec in &specs {
            let strategy = match build_strategy(spec, 0.005) {
                Ok(s) => s,
                Err(e) => panic!("bench strategy: {e}"),
            };
            for mode in [ExecutionMode::Close, ExecutionMode::OneBar] {
                let cfg = EngineConfig::new(mode, 0.001);
                let id = BenchmarkId::new(format!("{}/{mode}", spec.id()), n);
                group.bench_with_input(id, &bars, |b, bars| {
                    b.iter(|| run_backtest(black_box(bars), strategy.as_ref(), &cfg))
                });
            }
        }
    }
    group.finish();
}

fn bench_indicators(c: &mut Criterion) {
    let bars = generate_walk(2_000, 1_609_459_200, Timeframe::H1, 7);
    let indicators: Vec<Box<dyn Indicator>> = vec![
        Box::new(Sma::new(20)),
        Box::new(ZScore::new(20)),
        Box::new(AtrPct::new(14)),
        Box::new(Adx::new(14)),
    ];

    let mut group = c.benchmark_group("indicator_latest");
    for ind in &indicators {
        group.bench_function(ind.name(), |b| b.iter(|| ind.latest(black_box(&bars))));
    }
    group.finish();
}

criterion_group!(benches, bench_backtest, bench_indicators);
criterion_main!(benches);
