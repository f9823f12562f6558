//! Run metrics computed from an equity curve and trade tallies.

/// Maximum drawdown as a positive fraction of the running peak (0.15 = 15%).
///
/// The window is the whole curve, across trade boundaries. Returns 0.0 for
/// constant or monotonically increasing equity, and never exceeds 1.0.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;

    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (peak - eq) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd.min(1.0)
}

/// Fraction of closed trades that were winners; 0.0 with no closed trades.
pub fn win_rate(winners: usize, closed: usize) -> f64 {
    if closed == 0 {
        return 0.0;
    }
    winners as f64 / closed as f64
}

/// Profit factor: gross profit / gross loss (both passed as non-negative sums).
///
/// Fixed policy: 0.0 whenever there is no loss to divide by, whether or not
/// any trade won.
pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss <= 0.0 {
        return 0.0;
    }
    gross_profit / gross_loss
}
