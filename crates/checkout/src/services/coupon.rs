//! Coupon validation against a cart subtotal.

use chrono::{DateTime, Utc};
use domain::{Coupon, CouponCode, CouponRejection, Money};
use serde::Serialize;
use store::CommerceStore;

use crate::error::Result;

/// Outcome of validating a coupon code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouponValidation {
    /// The coupon, when the code exists.
    #[serde(skip)]
    pub coupon: Option<Coupon>,

    /// Discount the coupon yields. Zero when invalid.
    pub discount: Money,

    /// The first failed check, if any.
    pub errors: Vec<String>,
}

impl CouponValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn rejected(coupon: Option<Coupon>, rejection: CouponRejection) -> Self {
        Self {
            coupon,
            discount: Money::zero(),
            errors: vec![rejection.to_string()],
        }
    }
}

/// Checks coupon eligibility. Never touches the usage counter.
#[derive(Clone)]
pub struct CouponValidator<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> CouponValidator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Validates `code` against `subtotal` as of now.
    pub async fn validate(&self, code: &str, subtotal: Money) -> Result<CouponValidation> {
        self.validate_at(code, subtotal, Utc::now()).await
    }

    /// Validates `code` against `subtotal` as of `now`.
    #[tracing::instrument(skip(self))]
    pub async fn validate_at(
        &self,
        code: &str,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> Result<CouponValidation> {
        let code = CouponCode::new(code);
        let Some(coupon) = self.store.get_coupon(&code).await? else {
            return Ok(CouponValidation::rejected(
                None,
                CouponRejection::NotFound(code.to_string()),
            ));
        };

        match coupon.check(subtotal, now) {
            Ok(discount) => Ok(CouponValidation {
                coupon: Some(coupon),
                discount,
                errors: Vec::new(),
            }),
            Err(rejection) => {
                tracing::debug!(code = %coupon.code, %rejection, "coupon rejected");
                Ok(CouponValidation::rejected(Some(coupon), rejection))
            }
        }
    }
}
