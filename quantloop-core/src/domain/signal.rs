//! Trade signal produced by a strategy for one bar.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directional intent for bar t, derived from bars `[0, t)` only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    #[default]
    Hold,
}

impl Signal {
    pub fn is_buy(self) -> bool {
        self == Signal::Buy
    }

    pub fn is_sell(self) -> bool {
        self == Signal::Sell
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::Buy => "buy",
            Signal::Sell => "sell",
            Signal::Hold => "hold",
        };
        f.write_str(s)
    }
}
