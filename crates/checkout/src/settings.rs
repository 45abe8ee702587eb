//! Tunables for the checkout services.

use std::collections::HashMap;

use chrono::{Duration, FixedOffset, Offset, Utc};
use domain::{ShippingPolicy, TaxPolicy};
use rust_decimal::Decimal;

/// Asia/Dhaka, UTC+06:00.
pub const DEFAULT_BUSINESS_OFFSET_MINUTES: i32 = 360;

/// Pricing and order placement settings.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub tax: TaxPolicy,
    pub shipping: ShippingPolicy,

    /// Offset of the business timezone used for order-number days.
    pub business_offset: FixedOffset,

    /// How long an untouched guest cart lives.
    pub guest_cart_ttl: Duration,

    /// Order-number collisions tolerated before giving up.
    pub order_number_max_attempts: u32,
}

impl CheckoutSettings {
    /// Builds a fixed offset from minutes east of UTC, falling back to the default
    /// when the value is out of range.
    pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
        FixedOffset::east_opt(minutes.saturating_mul(60))
            .or_else(|| FixedOffset::east_opt(DEFAULT_BUSINESS_OFFSET_MINUTES * 60))
            .unwrap_or_else(|| Utc.fix())
    }
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            tax: TaxPolicy::default(),
            shipping: ShippingPolicy::default(),
            business_offset: Self::offset_from_minutes(DEFAULT_BUSINESS_OFFSET_MINUTES),
            guest_cart_ttl: Duration::days(7),
            order_number_max_attempts: 5,
        }
    }
}

/// Payment webhook settings.
#[derive(Clone)]
pub struct WebhookSettings {
    /// Shared secret used to sign webhook bodies. Empty refuses every webhook.
    pub secret: String,

    /// Maximum age (either direction) of a signature timestamp.
    pub tolerance: Duration,

    /// The currency every stored amount is expressed in.
    pub reporting_currency: String,

    /// Fixed conversion rates into the reporting currency, keyed by upper-cased ISO code.
    pub fx_rates: HashMap<String, Decimal>,
}

impl std::fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("secret", &"<redacted>")
            .field("tolerance", &self.tolerance)
            .field("reporting_currency", &self.reporting_currency)
            .field("fx_rates", &self.fx_rates)
            .finish()
    }
}

impl WebhookSettings {
    /// Rate that converts `currency` into the reporting currency.
    pub fn rate_for(&self, currency: &str) -> Option<Decimal> {
        let currency = currency.trim().to_ascii_uppercase();
        if currency == self.reporting_currency {
            return Some(Decimal::ONE);
        }
        self.fx_rates.get(&currency).copied()
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            tolerance: Duration::seconds(300),
            reporting_currency: "BDT".to_string(),
            fx_rates: HashMap::new(),
        }
    }
}
