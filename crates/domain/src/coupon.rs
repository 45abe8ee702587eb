//! Coupon rules and discount calculation.

use chrono::{DateTime, Utc};
use common::CouponId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pricing::{Money, discount};

/// Coupon code, normalised to upper case so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CouponCode(String);

impl CouponCode {
    /// Normalises a user-entered code.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CouponCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CouponCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// How a coupon reduces the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouponDiscount {
    /// A percentage of the subtotal, e.g. `20` for 20%.
    Percentage { percent: Decimal },

    /// A fixed amount off.
    Fixed { amount: Money },
}

impl CouponDiscount {
    pub fn kind(&self) -> &'static str {
        match self {
            CouponDiscount::Percentage { .. } => "percentage",
            CouponDiscount::Fixed { .. } => "fixed",
        }
    }
}

/// Why a coupon cannot be applied. Checks run in the order of the variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("Coupon {0} does not exist")]
    NotFound(String),

    #[error("Coupon {0} is not active")]
    Inactive(String),

    #[error("Coupon {0} has expired")]
    Expired(String),

    #[error("Coupon {0} is not valid yet")]
    NotStarted(String),

    #[error("Coupon {0} has reached its usage limit")]
    UsageLimitReached(String),

    #[error("Coupon {code} requires a minimum order of {minimum} (subtotal is {subtotal})")]
    MinimumNotMet {
        code: String,
        minimum: Money,
        subtotal: Money,
    },
}

/// A named, rule-bound discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub code: CouponCode,
    pub discount: CouponDiscount,
    pub min_order_amount: Option<Money>,

    /// Upper bound on a percentage discount.
    pub max_discount: Option<Money>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    /// Creates an active, unrestricted coupon.
    pub fn new(code: impl AsRef<str>, discount: CouponDiscount, now: DateTime<Utc>) -> Self {
        Self {
            id: CouponId::new(),
            code: CouponCode::new(code),
            discount,
            min_order_amount: None,
            max_discount: None,
            starts_at: None,
            expires_at: None,
            usage_limit: None,
            usage_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a percentage coupon.
    pub fn percentage(code: impl AsRef<str>, percent: Decimal, now: DateTime<Utc>) -> Self {
        Self::new(code, CouponDiscount::Percentage { percent }, now)
    }

    /// Creates a fixed-amount coupon.
    pub fn fixed(code: impl AsRef<str>, amount: Money, now: DateTime<Utc>) -> Self {
        Self::new(code, CouponDiscount::Fixed { amount }, now)
    }

    pub fn with_max_discount(mut self, cap: Money) -> Self {
        self.max_discount = Some(cap);
        self
    }

    pub fn with_min_order(mut self, minimum: Money) -> Self {
        self.min_order_amount = Some(minimum);
        self
    }

    pub fn with_usage_limit(mut self, limit: u32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn with_window(
        mut self,
        starts_at: Option<DateTime<Utc>>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.starts_at = starts_at;
        self.expires_at = expires_at;
        self
    }

    /// Returns true while the usage counter is below the limit.
    pub fn has_remaining_uses(&self) -> bool {
        self.usage_limit
            .is_none_or(|limit| self.usage_count < limit)
    }

    /// Runs every rule against `subtotal` and returns the discount, or the
    /// first rule that failed.
    pub fn check(&self, subtotal: Money, now: DateTime<Utc>) -> Result<Money, CouponRejection> {
        let code = || self.code.to_string();

        if !self.is_active {
            return Err(CouponRejection::Inactive(code()));
        }
        if self.expires_at.is_some_and(|expires| now > expires) {
            return Err(CouponRejection::Expired(code()));
        }
        if self.starts_at.is_some_and(|starts| now < starts) {
            return Err(CouponRejection::NotStarted(code()));
        }
        if !self.has_remaining_uses() {
            return Err(CouponRejection::UsageLimitReached(code()));
        }
        if let Some(minimum) = self.min_order_amount
            && subtotal < minimum
        {
            return Err(CouponRejection::MinimumNotMet {
                code: code(),
                minimum,
                subtotal,
            });
        }

        Ok(self.discount_for(subtotal))
    }

    /// Discount for `subtotal`, ignoring eligibility rules. Never exceeds the subtotal.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        let raw = match self.discount {
            CouponDiscount::Percentage { percent } => {
                discount::percentage_of(subtotal, percent, self.max_discount)
            }
            CouponDiscount::Fixed { amount } => amount,
        };
        discount::clamp_to_subtotal(raw, subtotal)
    }
}
