//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::{ProductId, VariantId};
use serde::{Deserialize, Serialize};

use super::OrderStatus;
use crate::catalog::Product;
use crate::pricing::Money;

/// Immutable snapshot of one purchased line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub name: String,
    pub sku: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
    pub image: Option<String>,
}

impl OrderItem {
    /// Snapshots `product` at its live price.
    pub fn from_product(product: &Product, variant_id: Option<VariantId>, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            variant_id,
            name: product.name.clone(),
            sku: product.sku.clone(),
            unit_price: product.price,
            quantity,
            line_total: product.price.multiply(quantity),
            image: product.primary_image().map(str::to_string),
        }
    }
}

/// Price breakdown of an order or checkout preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub shipping_cost: Money,
    pub tax: Money,
    pub total: Money,
}

/// One entry in an order's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// `None` for the entry written when the order is placed.
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

/// Stock to put back on a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl StockLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_product_snapshots_price_and_image() {
        let product = Product::new("Mug", "MUG-1", Money::from_major(150), 10)
            .with_images(vec!["mug.jpg".to_string(), "mug-side.jpg".to_string()]);

        let item = OrderItem::from_product(&product, None, 3);

        assert_eq!(item.line_total, Money::from_major(450));
        assert_eq!(item.sku, "MUG-1");
        assert_eq!(item.image.as_deref(), Some("mug.jpg"));
    }
}
