//! One-bar replay: each buy is an intrabar round trip from open[t] to close[t].

use super::metrics::{max_drawdown, profit_factor};
use super::{EngineConfig, ExecutionMode, RunResult};
use crate::domain::Bar;
use crate::strategy::Strategy;

pub(super) fn replay(valid: &[Bar], strategy: &dyn Strategy, config: &EngineConfig) -> RunResult {
    let start = strategy.warmup_bars().max(1);
    let size = config.position_size;
    let mut equity = config.initial_equity;
    let mut trades = 0usize;
    let mut gross_profit = 0.0;
    let mut gross_loss = 0.0;

    let mut equity_curve = Vec::with_capacity(valid.len() + 1);
    equity_curve.push(equity);

    for (t, bar) in valid.iter().enumerate() {
        if t >= start && strategy.signal(&valid[..t]).is_buy() {
            let pnl = (bar.close - bar.open) * size - config.fee * (bar.open + bar.close) * size;
            equity += pnl;
            trades += 1;
            if pnl > 0.0 {
                gross_profit += pnl;
            } else if pnl < 0.0 {
                gross_loss -= pnl;
            }
        }
        equity_curve.push(equity);
    }

    RunResult {
        mode: ExecutionMode::OneBar,
        trades,
        initial_equity: config.initial_equity,
        final_equity: equity,
        max_dd: max_drawdown(&equity_curve),
        win_rate: None,
        pf: Some(profit_factor(gross_profit, gross_loss)),
        return_pct: None,
        total_fees: None,
        bars_processed: valid.len(),
        bars_skipped: 0,
    }
}
