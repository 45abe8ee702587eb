use common::{CartId, OrderId, ProductId};
use domain::{OrderNumber, ParseError};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Decrementing stock would have left it negative. The whole write was rolled back.
    #[error(
        "Stock race lost for product {product_id}: requested {requested}, available {available}"
    )]
    StockRaceLost {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    /// The cart was edited after it was priced. Nothing was written.
    #[error("Cart {0} changed during checkout")]
    CartChanged(CartId),

    /// Another order already holds this number.
    #[error("Order number already taken: {0}")]
    DuplicateOrderNumber(OrderNumber),

    /// The coupon's usage limit was reached by a concurrent order.
    #[error("Coupon usage limit reached: {0}")]
    CouponExhausted(String),

    /// The order changed since it was read.
    #[error(
        "Concurrency conflict for order {order_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        order_id: OrderId,
        expected: i64,
        actual: i64,
    },

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A stored row could not be mapped back to the domain model.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ParseError> for StoreError {
    fn from(err: ParseError) -> Self {
        StoreError::InvalidData(err.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
