//! Checkout application layer.
//!
//! Wires the domain rules to a [`store::CommerceStore`]:
//! - Cart edits, coupons, guest merge and expiry sweep
//! - Checkout preview and order placement with order-number retry
//! - Order status transitions
//! - Signed, idempotent payment webhooks

pub mod error;
pub mod services;
pub mod settings;
pub mod signature;

pub use error::{CheckoutError, Result};
pub use services::{
    CartService, CheckoutPreview, CheckoutRequest, CheckoutValidator, CouponValidation,
    CouponValidator, CreateOrderRequest, OrderNumberGenerator, OrderService, OrderStatusService,
    PaymentEvent, PaymentWebhookProcessor, WebhookOutcome,
};
pub use settings::{CheckoutSettings, WebhookSettings};
pub use signature::{SignatureError, WebhookVerifier};
