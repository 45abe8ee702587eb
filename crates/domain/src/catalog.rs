//! Shapes consumed from the product catalog and the address book.
//!
//! Both are owned by collaborators; the engine only reads them, apart from
//! decrementing and restoring stock inside its own transactions.

use common::{AddressId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::identity::CartIdentity;
use crate::pricing::Money;

/// Publication status of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
    Draft,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
            ProductStatus::Draft => "draft",
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProductStatus::Active),
            "inactive" => Ok(ProductStatus::Inactive),
            "draft" => Ok(ProductStatus::Draft),
            other => Err(ParseError::new("product status", other)),
        }
    }
}

/// A catalog product as seen by checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub price: Money,

    /// Units on hand. Signed so that an over-decrement is observable.
    pub stock: i64,
    pub status: ProductStatus,
    pub images: Vec<String>,
}

impl Product {
    /// Creates an active product with the given price and stock.
    pub fn new(name: impl Into<String>, sku: impl Into<String>, price: Money, stock: i64) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            sku: sku.into(),
            price,
            stock,
            status: ProductStatus::Active,
            images: Vec::new(),
        }
    }

    /// Sets the image references.
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: ProductStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns true if the product is active.
    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }

    /// Returns true if the product can be put in a cart at all.
    pub fn is_purchasable(&self) -> bool {
        self.is_active() && self.stock > 0
    }

    /// Returns true if `quantity` units are on hand.
    pub fn has_stock_for(&self, quantity: u32) -> bool {
        self.stock >= i64::from(quantity)
    }

    /// Image shown on receipts and order lists.
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// An address-book entry owned by a user or guest session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub owner: CartIdentity,
    pub name: String,
    pub phone: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub district: String,
    pub division: String,
    pub postal_code: Option<String>,
}

impl Address {
    /// Returns true if the address belongs to `identity`.
    pub fn is_owned_by(&self, identity: &CartIdentity) -> bool {
        &self.owner == identity
    }

    /// Captures the address as it is right now, for storing on an order.
    pub fn snapshot(&self) -> ShippingAddress {
        ShippingAddress {
            name: self.name.clone(),
            phone: self.phone.clone(),
            address_line1: self.address_line1.clone(),
            address_line2: self.address_line2.clone(),
            district: self.district.clone(),
            division: self.division.clone(),
            postal_code: self.postal_code.clone(),
        }
    }
}

/// Immutable copy of an address taken at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub phone: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub district: String,
    pub division: String,
    pub postal_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::UserId;

    #[test]
    fn purchasable_requires_active_and_stock() {
        let product = Product::new("Kettle", "KT-1", Money::from_major(900), 3);
        assert!(product.is_purchasable());
        assert!(product.has_stock_for(3));
        assert!(!product.has_stock_for(4));

        let sold_out = Product::new("Kettle", "KT-1", Money::from_major(900), 0);
        assert!(!sold_out.is_purchasable());

        let hidden = product.clone().with_status(ProductStatus::Inactive);
        assert!(!hidden.is_purchasable());
    }

    #[test]
    fn product_status_parses() {
        assert_eq!("draft".parse::<ProductStatus>().unwrap(), ProductStatus::Draft);
        assert!("gone".parse::<ProductStatus>().is_err());
    }

    #[test]
    fn snapshot_copies_fields() {
        let owner = CartIdentity::User(UserId::new());
        let address = Address {
            id: AddressId::new(),
            owner: owner.clone(),
            name: "Rahim".to_string(),
            phone: "01700000000".to_string(),
            address_line1: "House 1, Road 2".to_string(),
            address_line2: None,
            district: "Dhaka".to_string(),
            division: "Dhaka".to_string(),
            postal_code: Some("1207".to_string()),
        };

        assert!(address.is_owned_by(&owner));
        let snapshot = address.snapshot();
        assert_eq!(snapshot.district, "Dhaka");
        assert_eq!(snapshot.postal_code.as_deref(), Some("1207"));
    }
}
