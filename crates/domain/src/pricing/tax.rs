//! Tax calculation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Money;

/// Whether catalog prices already contain tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxMode {
    /// Prices include tax; the tax component is backed out for reporting.
    Inclusive,

    /// Tax is added on top of prices.
    #[default]
    Exclusive,
}

/// Tax rate and mode applied to every checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxPolicy {
    /// Fractional rate, e.g. `0.05` for 5%.
    pub rate: Decimal,
    pub mode: TaxMode,
}

/// Result of applying a [`TaxPolicy`] to an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    /// The amount tax was computed on.
    pub taxable: Money,

    /// The tax component.
    pub tax: Money,

    /// What the customer pays for the taxable amount.
    pub total: Money,
}

impl TaxPolicy {
    /// Creates a policy with the given rate and mode.
    pub fn new(rate: Decimal, mode: TaxMode) -> Self {
        Self { rate, mode }
    }

    /// Computes the tax on `taxable`. Shipping must not be passed in here.
    pub fn calculate(&self, taxable: Money) -> TaxBreakdown {
        let amount = taxable.to_decimal();
        match self.mode {
            TaxMode::Inclusive => {
                let net = amount / (Decimal::ONE + self.rate);
                let tax = Money::from_decimal_minor(amount - net);
                TaxBreakdown {
                    taxable,
                    tax,
                    total: taxable,
                }
            }
            TaxMode::Exclusive => {
                let tax = Money::from_decimal_minor(amount * self.rate);
                TaxBreakdown {
                    taxable,
                    tax,
                    total: taxable + tax,
                }
            }
        }
    }

    /// Returns true if computed tax is added to the order total.
    pub fn adds_to_total(&self) -> bool {
        self.mode == TaxMode::Exclusive
    }
}

impl Default for TaxPolicy {
    fn default() -> Self {
        Self {
            rate: Decimal::ZERO,
            mode: TaxMode::Exclusive,
        }
    }
}
