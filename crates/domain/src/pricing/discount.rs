//! Discount arithmetic shared by coupon rules.

use rust_decimal::Decimal;

use super::Money;

/// Computes `subtotal × percent / 100`, rounded half-up and clipped to `cap`.
pub fn percentage_of(subtotal: Money, percent: Decimal, cap: Option<Money>) -> Money {
    let raw = Money::from_decimal_minor(subtotal.to_decimal() * percent / Decimal::ONE_HUNDRED);
    match cap {
        Some(cap) => raw.min(cap),
        None => raw,
    }
}

/// Clips a discount into `[0, subtotal]` so a total can never go negative.
pub fn clamp_to_subtotal(discount: Money, subtotal: Money) -> Money {
    discount.min(subtotal).max(Money::zero())
}
