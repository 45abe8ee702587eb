//! Checkout error types.

use common::{CartItemId, ProductId};
use domain::{CartError, OrderError, OrderStatus, PaymentStatus};
use store::StoreError;
use thiserror::Error;

use crate::signature::SignatureError;

/// Errors returned by the checkout services.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The checkout or coupon failed validation. Carries every reason found.
    #[error("Validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    /// Requested quantity exceeds live stock.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    OutOfStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    /// Stock was taken by a concurrent order between validation and placement.
    #[error("Stock for product {product_id} was taken by another order, please retry checkout")]
    StockRaceLost { product_id: ProductId },

    #[error("Invalid status transition: cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Cannot refund an order whose payment status is {payment_status}")]
    RefundRequiresPayment { payment_status: PaymentStatus },

    /// Webhook signature missing, malformed, stale or wrong.
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// No fixed conversion rate is configured for the currency.
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Cart not found")]
    CartNotFound,

    #[error("Cart item not found: {0}")]
    CartItemNotFound(CartItemId),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Product {0} is not available for purchase")]
    ProductUnavailable(ProductId),

    #[error("Invalid quantity: {0} (must be greater than 0)")]
    InvalidQuantity(u32),

    /// The order does not exist or is not visible to the caller.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Every generated order number collided with an existing one.
    #[error("Could not allocate a unique order number after {attempts} attempts")]
    OrderNumberExhausted { attempts: u32 },

    /// The order was modified concurrently.
    #[error("Order {0} was modified concurrently, please retry")]
    ConcurrencyConflict(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StockRaceLost { product_id, .. } => {
                CheckoutError::StockRaceLost { product_id }
            }
            StoreError::CartChanged(_) => CheckoutError::ValidationFailed(vec![
                "Cart changed during checkout, please review it and retry".to_string(),
            ]),
            StoreError::CouponExhausted(code) => {
                CheckoutError::ValidationFailed(vec![format!("Coupon {code} usage limit reached")])
            }
            StoreError::ConcurrencyConflict { order_id, .. } => {
                CheckoutError::ConcurrencyConflict(order_id.to_string())
            }
            StoreError::OrderNotFound(order_id) => CheckoutError::OrderNotFound(order_id.to_string()),
            other => CheckoutError::Store(other),
        }
    }
}

impl From<OrderError> for CheckoutError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { from, to } => {
                CheckoutError::InvalidTransition { from, to }
            }
            OrderError::RefundRequiresPayment { payment_status } => {
                CheckoutError::RefundRequiresPayment { payment_status }
            }
        }
    }
}

impl From<CartError> for CheckoutError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::InvalidQuantity { quantity } => CheckoutError::InvalidQuantity(quantity),
            CartError::ProductUnavailable { product_id } => {
                CheckoutError::ProductUnavailable(product_id)
            }
            CartError::OutOfStock {
                product_id,
                requested,
                available,
            } => CheckoutError::OutOfStock {
                product_id,
                requested,
                available,
            },
            CartError::ItemNotFound(item_id) => CheckoutError::CartItemNotFound(item_id),
        }
    }
}

/// Result type for checkout operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;
