//! Exchange rules applied to close-mode fills.
//!
//! A fill is checked against the minimum notional at the requested quantity
//! and price, then both are rounded to the venue grid. A quantity that rounds
//! to zero is rejected.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FillRejected {
    #[error("notional {notional} is below the minimum {min}")]
    BelowMinNotional { notional: f64, min: f64 },

    #[error("quantity rounds to zero")]
    ZeroQuantity,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeRules {
    /// Smallest price increment.
    pub tick_size: f64,
    /// Smallest quantity increment.
    pub step_size: f64,
    pub min_notional: f64,
}

impl Default for ExchangeRules {
    fn default() -> Self {
        Self {
            tick_size: 0.01,
            step_size: 0.01,
            min_notional: 10.0,
        }
    }
}

fn round_to(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

impl ExchangeRules {
    pub fn round_price(&self, price: f64) -> f64 {
        round_to(price, self.tick_size)
    }

    pub fn round_qty(&self, quantity: f64) -> f64 {
        round_to(quantity, self.step_size)
    }

    pub fn check_notional(&self, quantity: f64, price: f64) -> Result<(), FillRejected> {
        let notional = quantity * price;
        if notional < self.min_notional {
            return Err(FillRejected::BelowMinNotional {
                notional,
                min: self.min_notional,
            });
        }
        Ok(())
    }

    /// Quantity and price a market order actually fills at.
    pub fn fill(&self, quantity: f64, price: f64) -> Result<(f64, f64), FillRejected> {
        self.check_notional(quantity, price)?;
        let quantity = self.round_qty(quantity);
        if quantity <= 0.0 {
            return Err(FillRejected::ZeroQuantity);
        }
        Ok((quantity, self.round_price(price)))
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("tick_size", self.tick_size),
            ("step_size", self.step_size),
        ];
        for (name, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidExchangeRule { name, value });
            }
        }
        if !(self.min_notional.is_finite() && self.min_notional >= 0.0) {
            return Err(ConfigError::InvalidExchangeRule {
                name: "min_notional",
                value: self.min_notional,
            });
        }
        Ok(())
    }
}
