//! Domain layer for the checkout engine.
//!
//! This crate holds the rules and no I/O:
//! - Money and pricing (shipping zones, tax, discounts)
//! - Cart aggregate keyed by a user or guest identity
//! - Coupon eligibility and discount calculation
//! - Order aggregate with its status state machine and order numbering
//! - Payment records

pub mod cart;
pub mod catalog;
pub mod coupon;
pub mod error;
pub mod identity;
pub mod order;
pub mod payment;
pub mod pricing;

pub use cart::{Cart, CartError, CartItem};
pub use catalog::{Address, Product, ProductStatus, ShippingAddress};
pub use coupon::{Coupon, CouponCode, CouponDiscount, CouponRejection};
pub use error::ParseError;
pub use identity::CartIdentity;
pub use order::{
    BusinessDay, Order, OrderDraft, OrderError, OrderItem, OrderNumber, OrderStatus, OrderTotals,
    OrderUpdate, PaymentMethod, PaymentStatus, StatusChange, StockLine,
};
pub use payment::{Payment, PaymentRecordStatus};
pub use pricing::{
    DeliveryEstimate, Money, ShippingMethod, ShippingPolicy, ShippingQuote, ShippingZone,
    TaxBreakdown, TaxMode, TaxPolicy, ZoneRates,
};
