//! Cart aggregate.

use chrono::{DateTime, Duration, Utc};
use common::{CartId, CartItemId, ProductId, VariantId};
use serde::{Deserialize, Serialize};

use super::CartError;
use crate::catalog::Product;
use crate::coupon::CouponCode;
use crate::identity::CartIdentity;
use crate::pricing::Money;

/// One line of a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,

    /// Always at least 1.
    pub quantity: u32,

    /// Price captured when the line was created.
    pub unit_price: Money,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    /// Returns `unit_price × quantity`.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    /// Returns true if this line holds the given product and variant.
    pub fn matches(&self, product_id: ProductId, variant_id: Option<VariantId>) -> bool {
        self.product_id == product_id && self.variant_id == variant_id
    }
}

/// A shopping cart scoped to one [`CartIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,

    /// Fixed at creation.
    pub identity: CartIdentity,
    pub items: Vec<CartItem>,
    pub coupon_code: Option<CouponCode>,
    pub discount: Money,

    /// Only guest carts expire.
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart. Guest carts expire `guest_ttl` after their last change.
    pub fn new(identity: CartIdentity, now: DateTime<Utc>, guest_ttl: Duration) -> Self {
        let expires_at = identity.is_guest().then(|| now + guest_ttl);
        Self {
            id: CartId::new(),
            identity,
            items: Vec::new(),
            coupon_code: None,
            discount: Money::zero(),
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns Σ(unit price × quantity).
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Returns `max(0, subtotal − discount)`.
    pub fn total(&self) -> Money {
        self.subtotal().saturating_sub(self.discount)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn total_quantity(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |total, item| total.saturating_add(item.quantity))
    }

    /// Total quantity across every line of `product_id`, whatever the variant.
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.items
            .iter()
            .filter(|item| item.product_id == product_id)
            .fold(0u32, |total, item| total.saturating_add(item.quantity))
    }

    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn find_line(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> Option<&CartItem> {
        self.items
            .iter()
            .find(|item| item.matches(product_id, variant_id))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    /// Adds `quantity` of a product, merging into an existing identical line.
    ///
    /// The cumulative quantity is checked against the product's live stock.
    /// Returns the id of the line that now holds the product.
    pub fn add_line(
        &mut self,
        product: &Product,
        variant_id: Option<VariantId>,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<CartItemId, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }
        if !product.is_purchasable() {
            return Err(CartError::ProductUnavailable {
                product_id: product.id,
            });
        }

        // Quantities too large to add up can never be in stock.
        let requested = self.quantity_of(product.id).checked_add(quantity);
        if !requested.is_some_and(|requested| product.has_stock_for(requested)) {
            return Err(CartError::OutOfStock {
                product_id: product.id,
                requested: requested.unwrap_or(u32::MAX),
                available: product.stock,
            });
        }

        let item_id = match self
            .items
            .iter_mut()
            .find(|item| item.matches(product.id, variant_id))
        {
            Some(existing) => {
                existing.quantity += quantity;
                existing.id
            }
            None => {
                let item = CartItem {
                    id: CartItemId::new(),
                    product_id: product.id,
                    variant_id,
                    quantity,
                    unit_price: product.price,
                    added_at: now,
                };
                let id = item.id;
                self.items.push(item);
                id
            }
        };

        self.updated_at = now;
        Ok(item_id)
    }

    /// Sets a line's quantity, checked against the product's live stock.
    pub fn set_quantity(
        &mut self,
        item_id: CartItemId,
        quantity: u32,
        product: &Product,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }

        let current = self
            .item(item_id)
            .map(|item| item.quantity)
            .ok_or(CartError::ItemNotFound(item_id))?;

        let requested = (self.quantity_of(product.id) - current).checked_add(quantity);
        let in_stock = requested.is_some_and(|requested| product.has_stock_for(requested));
        if !product.is_active() || !in_stock {
            return Err(CartError::OutOfStock {
                product_id: product.id,
                requested: requested.unwrap_or(u32::MAX),
                available: product.stock,
            });
        }

        if let Some(item) = self.items.iter_mut().find(|item| item.id == item_id) {
            item.quantity = quantity;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Removes a line and returns it.
    pub fn remove_line(
        &mut self,
        item_id: CartItemId,
        now: DateTime<Utc>,
    ) -> Result<CartItem, CartError> {
        let index = self
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or(CartError::ItemNotFound(item_id))?;
        self.updated_at = now;
        Ok(self.items.remove(index))
    }

    /// Removes every line along with any applied coupon.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.items.clear();
        self.clear_coupon(now);
    }

    /// Records an applied coupon and the discount it yields.
    pub fn apply_coupon(&mut self, code: CouponCode, discount: Money, now: DateTime<Utc>) {
        self.coupon_code = Some(code);
        self.discount = discount;
        self.updated_at = now;
    }

    pub fn clear_coupon(&mut self, now: DateTime<Utc>) {
        self.coupon_code = None;
        self.discount = Money::zero();
        self.updated_at = now;
    }

    /// Folds a guest cart's lines into this one.
    ///
    /// Matching product+variant lines have their quantities summed; the rest
    /// are copied. The guest coupon is carried over only if this cart has none.
    pub fn absorb(&mut self, guest: &Cart, now: DateTime<Utc>) {
        for line in &guest.items {
            match self
                .items
                .iter_mut()
                .find(|item| item.matches(line.product_id, line.variant_id))
            {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(line.quantity);
                }
                None => self.items.push(CartItem {
                    id: CartItemId::new(),
                    ..line.clone()
                }),
            }
        }

        if self.coupon_code.is_none()
            && let Some(code) = &guest.coupon_code
        {
            self.coupon_code = Some(code.clone());
        }
        self.updated_at = now;
    }

    /// Pushes a guest cart's expiry out to `now + guest_ttl`. No-op for user carts.
    pub fn refresh_expiry(&mut self, now: DateTime<Utc>, guest_ttl: Duration) {
        if self.identity.is_guest() {
            self.expires_at = Some(now + guest_ttl);
        }
    }
}
