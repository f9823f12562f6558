//! Close-mode replay: long-only, one position at a time, fills at the close.
//!
//! Fills go through [`ExchangeRules`](super::ExchangeRules); the open position
//! is still marked at the raw close.

use super::metrics::{max_drawdown, win_rate};
use super::{EngineConfig, ExecutionMode, RunResult};
use crate::domain::{Bar, Signal};
use crate::strategy::Strategy;

#[derive(Debug, Clone, Copy)]
struct OpenPosition {
    units: f64,
    /// Cash paid on entry, fee included.
    cost: f64,
}

pub(super) fn replay(valid: &[Bar], strategy: &dyn Strategy, config: &EngineConfig) -> RunResult {
    let warmup = strategy.warmup_bars();
    let mut cash = config.initial_equity;
    let mut position: Option<OpenPosition> = None;
    let mut total_fees = 0.0;
    let mut closed = 0usize;
    let mut winners = 0usize;

    let mut equity_curve = Vec::with_capacity(valid.len() + 1);
    equity_curve.push(config.initial_equity);

    for (t, bar) in valid.iter().enumerate() {
        if t >= warmup {
            match (strategy.signal(&valid[..t]), position) {
                (Signal::Buy, None) => {
                    // A rejected or unaffordable entry leaves the account flat.
                    if let Ok((units, price)) = config.rules.fill(config.position_size, bar.close) {
                        let notional = units * price;
                        let fee = notional * config.fee;
                        if notional + fee <= cash {
                            cash -= notional + fee;
                            total_fees += fee;
                            position = Some(OpenPosition {
                                units,
                                cost: notional + fee,
                            });
                        }
                    }
                }
                (Signal::Sell, Some(open)) => {
                    // A rejected exit keeps the position open.
                    if let Ok((units, price)) = config.rules.fill(open.units, bar.close) {
                        let proceeds = units * price;
                        let fee = proceeds * config.fee;
                        cash += proceeds - fee;
                        total_fees += fee;
                        closed += 1;
                        if proceeds - fee - open.cost > 0.0 {
                            winners += 1;
                        }
                        position = None;
                    }
                }
                _ => {}
            }
        }

        let marked = position.map_or(0.0, |p| p.units * bar.close);
        equity_curve.push(cash + marked);
    }

    let final_equity = equity_curve.last().copied().unwrap_or(config.initial_equity);

    RunResult {
        mode: ExecutionMode::Close,
        trades: closed,
        initial_equity: config.initial_equity,
        final_equity,
        max_dd: max_drawdown(&equity_curve),
        win_rate: Some(win_rate(winners, closed)),
        pf: None,
        return_pct: Some(final_equity / config.initial_equity - 1.0),
        total_fees: Some(total_fees),
        bars_processed: valid.len(),
        bars_skipped: 0,
    }
}
