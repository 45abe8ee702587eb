//! Application configuration loaded from environment variables.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use checkout::settings::DEFAULT_BUSINESS_OFFSET_MINUTES;
use checkout::{CheckoutSettings, WebhookSettings};
use domain::{Money, TaxMode, TaxPolicy};
use rust_decimal::Decimal;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` (default `"0.0.0.0"`), `PORT` (default `3000`)
/// - `RUST_LOG` tracing filter (default `"info"`), `LOG_FORMAT` `text` or `json`
/// - `DATABASE_URL` PostgreSQL connection string; unset means an in-memory store
/// - `TAX_RATE` decimal ratio (default `0`), `TAX_INCLUSIVE` (default `false`)
/// - `NEAR_DISTRICTS` comma list (default `Dhaka`)
/// - `SHIPPING_NEAR_STANDARD`, `SHIPPING_NEAR_EXPRESS`, `SHIPPING_FAR_STANDARD`,
///   `SHIPPING_FAR_EXPRESS`, `FREE_SHIPPING_THRESHOLD` in minor units
/// - `BUSINESS_UTC_OFFSET_MINUTES` (default `360`)
/// - `GUEST_CART_TTL_HOURS` (default `168`), `CART_SWEEP_INTERVAL_SECS` (default `3600`)
/// - `ORDER_NUMBER_MAX_ATTEMPTS` (default `5`)
/// - `WEBHOOK_SECRET`, `WEBHOOK_TOLERANCE_SECS` (default `300`)
/// - `REPORTING_CURRENCY` (default `BDT`), `FX_RATES` such as `USD=110.5,EUR=120`
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub checkout: CheckoutSettings,
    pub webhook: WebhookSettings,
    pub cart_sweep_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| read(&lookup, key);
        let money = |key: &str, default: Money| {
            parsed(&lookup, key)
                .map(Money::from_minor)
                .unwrap_or(default)
        };

        let mut checkout = defaults.checkout;
        checkout.tax = TaxPolicy::new(
            parsed(&lookup, "TAX_RATE").unwrap_or(checkout.tax.rate),
            if parse_bool(var("TAX_INCLUSIVE")).unwrap_or(false) {
                TaxMode::Inclusive
            } else {
                TaxMode::Exclusive
            },
        );
        if let Some(districts) = var("NEAR_DISTRICTS") {
            checkout.shipping.near_districts = parse_list(&districts);
        }
        let shipping = &mut checkout.shipping;
        shipping.near.standard = money("SHIPPING_NEAR_STANDARD", shipping.near.standard);
        shipping.near.express = money("SHIPPING_NEAR_EXPRESS", shipping.near.express);
        shipping.far.standard = money("SHIPPING_FAR_STANDARD", shipping.far.standard);
        shipping.far.express = money("SHIPPING_FAR_EXPRESS", shipping.far.express);
        if let Some(threshold) = parsed(&lookup, "FREE_SHIPPING_THRESHOLD") {
            shipping.free_shipping_threshold = Some(Money::from_minor(threshold));
        }
        checkout.business_offset = CheckoutSettings::offset_from_minutes(
            parsed(&lookup, "BUSINESS_UTC_OFFSET_MINUTES").unwrap_or(DEFAULT_BUSINESS_OFFSET_MINUTES),
        );
        if let Some(hours) = parsed::<i64>(&lookup, "GUEST_CART_TTL_HOURS") {
            checkout.guest_cart_ttl = chrono::Duration::hours(hours.max(1));
        }
        if let Some(attempts) = parsed::<u32>(&lookup, "ORDER_NUMBER_MAX_ATTEMPTS") {
            checkout.order_number_max_attempts = attempts.max(1);
        }

        let mut webhook = defaults.webhook;
        if let Some(secret) = var("WEBHOOK_SECRET") {
            webhook.secret = secret;
        }
        if let Some(seconds) = parsed::<i64>(&lookup, "WEBHOOK_TOLERANCE_SECS") {
            webhook.tolerance = chrono::Duration::seconds(seconds.max(0));
        }
        if let Some(currency) = var("REPORTING_CURRENCY") {
            webhook.reporting_currency = currency.to_ascii_uppercase();
        }
        if let Some(rates) = var("FX_RATES") {
            webhook.fx_rates = parse_rates(&rates);
        }

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: var("DATABASE_URL"),
            checkout,
            webhook,
            cart_sweep_interval: parsed::<u64>(&lookup, "CART_SWEEP_INTERVAL_SECS")
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or(defaults.cart_sweep_interval),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            checkout: CheckoutSettings::default(),
            webhook: WebhookSettings::default(),
            cart_sweep_interval: Duration::from_secs(3600),
        }
    }
}

/// Reads a variable, treating blank values as unset.
fn read(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    read(lookup, key).and_then(|value| value.parse().ok())
}

fn parse_bool(value: Option<String>) -> Option<bool> {
    match value?.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `USD=110.5,EUR=120`. Malformed pairs are skipped.
fn parse_rates(value: &str) -> HashMap<String, Decimal> {
    value
        .split(',')
        .filter_map(|pair| {
            let (currency, rate) = pair.split_once('=')?;
            let rate = Decimal::from_str(rate.trim()).ok()?;
            Some((currency.trim().to_ascii_uppercase(), rate))
        })
        .filter(|(currency, rate)| !currency.is_empty() && rate.is_sign_positive())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = config_from(&[]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert_eq!(config.checkout.tax.rate, Decimal::ZERO);
        assert_eq!(config.checkout.tax.mode, TaxMode::Exclusive);
        assert_eq!(config.checkout.shipping.near_districts, vec!["Dhaka".to_string()]);
        assert_eq!(config.checkout.business_offset.local_minus_utc(), 6 * 3600);
        assert_eq!(config.webhook.reporting_currency, "BDT");
        assert_eq!(config.cart_sweep_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_addr_formatting() {
        let config = config_from(&[("HOST", "127.0.0.1"), ("PORT", "8080")]);
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_pricing_overrides() {
        let config = config_from(&[
            ("TAX_RATE", "0.15"),
            ("TAX_INCLUSIVE", "true"),
            ("NEAR_DISTRICTS", "Dhaka, Gazipur ,Narayanganj"),
            ("SHIPPING_NEAR_STANDARD", "5000"),
            ("SHIPPING_FAR_EXPRESS", "25000"),
            ("FREE_SHIPPING_THRESHOLD", "300000"),
        ]);
        assert_eq!(config.checkout.tax.rate, dec!(0.15));
        assert_eq!(config.checkout.tax.mode, TaxMode::Inclusive);
        assert_eq!(config.checkout.shipping.near_districts.len(), 3);
        assert_eq!(config.checkout.shipping.near.standard, Money::from_minor(5000));
        assert_eq!(config.checkout.shipping.far.express, Money::from_minor(25000));
        assert_eq!(
            config.checkout.shipping.free_shipping_threshold,
            Some(Money::from_minor(300_000))
        );
    }

    #[test]
    fn test_webhook_settings() {
        let config = config_from(&[
            ("WEBHOOK_SECRET", "whsec"),
            ("WEBHOOK_TOLERANCE_SECS", "60"),
            ("REPORTING_CURRENCY", "bdt"),
            ("FX_RATES", "usd=110.5, EUR=120,broken,JPY=-1"),
        ]);
        assert_eq!(config.webhook.secret, "whsec");
        assert_eq!(config.webhook.tolerance, chrono::Duration::seconds(60));
        assert_eq!(config.webhook.reporting_currency, "BDT");
        assert_eq!(config.webhook.fx_rates.len(), 2);
        assert_eq!(config.webhook.fx_rates["USD"], dec!(110.5));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("ORDER_NUMBER_MAX_ATTEMPTS", "0"),
            ("LOG_FORMAT", "JSON"),
            ("GUEST_CART_TTL_HOURS", "24"),
            ("DATABASE_URL", "  "),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.checkout.order_number_max_attempts, 1);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.checkout.guest_cart_ttl, chrono::Duration::hours(24));
        assert!(config.database_url.is_none());
    }
}
