//! Pricing utilities: money, tax, shipping, and discount arithmetic.
//!
//! Everything here is a pure function of its inputs.

pub mod discount;
mod money;
mod shipping;
mod tax;

pub use money::Money;
pub use shipping::{
    DeliveryEstimate, ShippingMethod, ShippingPolicy, ShippingQuote, ShippingZone, ZoneRates,
};
pub use tax::{TaxBreakdown, TaxMode, TaxPolicy};
