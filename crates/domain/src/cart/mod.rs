//! Cart aggregate and related types.

mod aggregate;

pub use aggregate::{Cart, CartItem};

use common::{CartItemId, ProductId};
use thiserror::Error;

/// Errors that can occur during cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Quantities must be at least 1.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// The product is inactive or sold out.
    #[error("Product {product_id} is not available for purchase")]
    ProductUnavailable { product_id: ProductId },

    /// Requested more than the product's live stock.
    #[error("Product {product_id} is out of stock: requested {requested}, available {available}")]
    OutOfStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    /// No line with this id in the cart.
    #[error("Cart item not found: {0}")]
    ItemNotFound(CartItemId),
}
