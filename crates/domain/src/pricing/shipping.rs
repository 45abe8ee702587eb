//! Shipping cost calculation by destination zone.

use serde::{Deserialize, Serialize};

use super::Money;
use crate::error::ParseError;

/// Destination zone, derived from the address district.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingZone {
    Near,
    Far,
}

impl ShippingZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingZone::Near => "near",
            ShippingZone::Far => "far",
        }
    }
}

impl std::fmt::Display for ShippingZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery speed chosen by the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    #[default]
    Standard,
    Express,
}

impl ShippingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingMethod::Standard => "standard",
            ShippingMethod::Express => "express",
        }
    }
}

impl std::fmt::Display for ShippingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ShippingMethod {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(ShippingMethod::Standard),
            "express" => Ok(ShippingMethod::Express),
            other => Err(ParseError::new("shipping method", other)),
        }
    }
}

/// Expected delivery window in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryEstimate {
    pub min_days: u32,
    pub max_days: u32,
}

impl DeliveryEstimate {
    pub const fn days(min_days: u32, max_days: u32) -> Self {
        Self { min_days, max_days }
    }
}

/// Flat rates for one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRates {
    pub standard: Money,
    pub express: Money,
}

/// A priced shipping option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuote {
    pub zone: ShippingZone,
    pub method: ShippingMethod,
    pub cost: Money,
    pub estimate: DeliveryEstimate,
}

/// Zone membership, rates, and the free-shipping threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingPolicy {
    /// Districts served as the near zone. Everything else is far.
    pub near_districts: Vec<String>,
    pub near: ZoneRates,
    pub far: ZoneRates,

    /// Standard shipping is free once the subtotal reaches this amount.
    pub free_shipping_threshold: Option<Money>,
}

impl ShippingPolicy {
    /// Returns the zone for a district. Matching ignores case and surrounding whitespace.
    pub fn zone_for(&self, district: &str) -> ShippingZone {
        let district = district.trim();
        if self
            .near_districts
            .iter()
            .any(|d| d.trim().eq_ignore_ascii_case(district))
        {
            ShippingZone::Near
        } else {
            ShippingZone::Far
        }
    }

    /// Prices one shipping method for a destination district and order subtotal.
    pub fn quote(&self, district: &str, subtotal: Money, method: ShippingMethod) -> ShippingQuote {
        let zone = self.zone_for(district);
        let rates = match zone {
            ShippingZone::Near => self.near,
            ShippingZone::Far => self.far,
        };

        let cost = match method {
            ShippingMethod::Standard if self.qualifies_for_free_shipping(subtotal) => Money::zero(),
            ShippingMethod::Standard => rates.standard,
            ShippingMethod::Express => rates.express,
        };

        ShippingQuote {
            zone,
            method,
            cost,
            estimate: estimate_for(zone, method),
        }
    }

    /// Prices every available method. Both methods are always offered.
    pub fn options(&self, district: &str, subtotal: Money) -> Vec<ShippingQuote> {
        [ShippingMethod::Standard, ShippingMethod::Express]
            .into_iter()
            .map(|method| self.quote(district, subtotal, method))
            .collect()
    }

    fn qualifies_for_free_shipping(&self, subtotal: Money) -> bool {
        self.free_shipping_threshold
            .is_some_and(|threshold| subtotal >= threshold)
    }
}

fn estimate_for(zone: ShippingZone, method: ShippingMethod) -> DeliveryEstimate {
    match (zone, method) {
        (ShippingZone::Near, ShippingMethod::Standard) => DeliveryEstimate::days(1, 2),
        (ShippingZone::Near, ShippingMethod::Express) => DeliveryEstimate::days(1, 1),
        (ShippingZone::Far, ShippingMethod::Standard) => DeliveryEstimate::days(3, 5),
        (ShippingZone::Far, ShippingMethod::Express) => DeliveryEstimate::days(2, 2),
    }
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self {
            near_districts: vec!["Dhaka".to_string()],
            near: ZoneRates {
                standard: Money::from_major(60),
                express: Money::from_major(120),
            },
            far: ZoneRates {
                standard: Money::from_major(120),
                express: Money::from_major(200),
            },
            free_shipping_threshold: Some(Money::from_major(2000)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dhaka_is_near() {
        let policy = ShippingPolicy::default();
        assert_eq!(policy.zone_for("Dhaka"), ShippingZone::Near);
        assert_eq!(policy.zone_for("  dhaka "), ShippingZone::Near);
        assert_eq!(policy.zone_for("Sylhet"), ShippingZone::Far);
    }

    #[test]
    fn standard_free_above_threshold() {
        let policy = ShippingPolicy::default();
        let quote = policy.quote("Dhaka", Money::from_major(2500), ShippingMethod::Standard);
        assert_eq!(quote.zone, ShippingZone::Near);
        assert_eq!(quote.cost, Money::zero());
    }

    #[test]
    fn threshold_is_inclusive() {
        let policy = ShippingPolicy::default();
        let quote = policy.quote("Rajshahi", Money::from_major(2000), ShippingMethod::Standard);
        assert_eq!(quote.cost, Money::zero());
    }

    #[test]
    fn standard_charged_below_threshold() {
        let policy = ShippingPolicy::default();
        let near = policy.quote("Dhaka", Money::from_major(500), ShippingMethod::Standard);
        let far = policy.quote("Khulna", Money::from_major(500), ShippingMethod::Standard);
        assert_eq!(near.cost, Money::from_major(60));
        assert_eq!(far.cost, Money::from_major(120));
    }

    #[test]
    fn express_is_never_free() {
        let policy = ShippingPolicy::default();
        let quote = policy.quote("Dhaka", Money::from_major(10_000), ShippingMethod::Express);
        assert_eq!(quote.cost, Money::from_major(120));
        assert_eq!(quote.estimate, DeliveryEstimate::days(1, 1));
    }

    #[test]
    fn no_threshold_means_never_free() {
        let policy = ShippingPolicy {
            free_shipping_threshold: None,
            ..ShippingPolicy::default()
        };
        let quote = policy.quote("Dhaka", Money::from_major(99_999), ShippingMethod::Standard);
        assert_eq!(quote.cost, Money::from_major(60));
    }

    #[test]
    fn options_lists_both_methods() {
        let options = ShippingPolicy::default().options("Comilla", Money::from_major(100));
        assert_eq!(options.len(), 2);
        assert!(options.iter().all(|q| q.zone == ShippingZone::Far));
    }
}
