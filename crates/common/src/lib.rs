//! Identifier types shared by every crate of the checkout engine.

mod types;

pub use types::{
    AddressId, CartId, CartItemId, CouponId, OrderId, PaymentId, ProductId, SessionToken, UserId,
    VariantId,
};
