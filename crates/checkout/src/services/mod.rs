//! Application services over a [`store::CommerceStore`].

pub mod cart;
pub mod checkout_validator;
pub mod coupon;
pub mod order;
pub mod order_number;
pub mod status;
pub mod webhook;

pub use cart::CartService;
pub use checkout_validator::{CheckoutPreview, CheckoutRequest, CheckoutValidator, CreateOrderRequest};
pub use coupon::{CouponValidation, CouponValidator};
pub use order::OrderService;
pub use order_number::OrderNumberGenerator;
pub use status::OrderStatusService;
pub use webhook::{PaymentEvent, PaymentWebhookProcessor, WebhookOutcome};
