//! Side-effect free checkout preview.

use std::collections::BTreeMap;

use chrono::Utc;
use common::{AddressId, ProductId};
use domain::{
    Cart, CartIdentity, CouponCode, Money, OrderItem, OrderTotals, PaymentMethod, Product,
    ShippingAddress, ShippingMethod, ShippingQuote, ShippingZone,
};
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use crate::error::Result;
use crate::services::coupon::CouponValidator;
use crate::settings::CheckoutSettings;

/// What the customer chose at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutRequest {
    pub address_id: AddressId,

    /// Overrides the coupon applied to the cart.
    #[serde(default)]
    pub coupon_code: Option<String>,

    #[serde(default)]
    pub shipping_method: ShippingMethod,
}

/// A checkout request plus the payment method, used to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateOrderRequest {
    pub address_id: AddressId,

    #[serde(default)]
    pub payment_method: PaymentMethod,

    #[serde(default)]
    pub coupon_code: Option<String>,

    #[serde(default)]
    pub shipping_method: ShippingMethod,
}

impl CreateOrderRequest {
    pub fn checkout(&self) -> CheckoutRequest {
        CheckoutRequest {
            address_id: self.address_id,
            coupon_code: self.coupon_code.clone(),
            shipping_method: self.shipping_method,
        }
    }
}

/// Priced view of the caller's cart as it would be ordered right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutPreview {
    pub items: Vec<OrderItem>,

    #[serde(flatten)]
    pub totals: OrderTotals,

    pub shipping_zone: Option<ShippingZone>,
    pub shipping: Option<ShippingQuote>,
    pub shipping_address: Option<ShippingAddress>,
    pub coupon_code: Option<CouponCode>,
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Re-reads live product data and prices the cart without writing anything.
#[derive(Clone)]
pub struct CheckoutValidator<S: CommerceStore> {
    store: S,
    coupons: CouponValidator<S>,
    settings: CheckoutSettings,
}

impl<S: CommerceStore + Clone> CheckoutValidator<S> {
    pub fn new(store: S, settings: CheckoutSettings) -> Self {
        Self {
            coupons: CouponValidator::new(store.clone()),
            store,
            settings,
        }
    }

    /// Prices the identity's cart. Problems are collected into `errors`
    /// rather than returned, so the caller sees all of them at once.
    #[tracing::instrument(skip(self))]
    pub async fn validate(
        &self,
        identity: &CartIdentity,
        request: &CheckoutRequest,
    ) -> Result<CheckoutPreview> {
        let (preview, _) = self.evaluate(identity, request).await?;
        Ok(preview)
    }

    /// Like [`Self::validate`] but also hands back the cart that was priced.
    pub(crate) async fn evaluate(
        &self,
        identity: &CartIdentity,
        request: &CheckoutRequest,
    ) -> Result<(CheckoutPreview, Option<Cart>)> {
        let mut errors = Vec::new();
        let cart = self
            .store
            .get_cart(identity)
            .await?
            .filter(|cart| !cart.is_empty());

        let items = match &cart {
            Some(cart) => self.price_lines(cart, &mut errors).await?,
            None => {
                errors.push("Cart is empty".to_string());
                Vec::new()
            }
        };
        let subtotal: Money = items.iter().map(|item| item.line_total).sum();

        let address = self.store.get_address(request.address_id, identity).await?;
        if address.is_none() {
            errors.push("Shipping address not found".to_string());
        }

        let coupon_code = request
            .coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(CouponCode::new)
            .or_else(|| cart.as_ref().and_then(|cart| cart.coupon_code.clone()));

        let mut discount = Money::zero();
        if let Some(code) = &coupon_code {
            let validation = self.coupons.validate_at(code.as_str(), subtotal, Utc::now()).await?;
            discount = validation.discount;
            errors.extend(validation.errors);
        }

        let shipping = address.as_ref().map(|address| {
            self.settings
                .shipping
                .quote(&address.district, subtotal, request.shipping_method)
        });
        let shipping_cost = shipping.map(|quote| quote.cost).unwrap_or_default();

        let tax = self.settings.tax.calculate(subtotal - discount);
        let mut total = subtotal - discount + shipping_cost;
        if self.settings.tax.adds_to_total() {
            total += tax.tax;
        }

        let preview = CheckoutPreview {
            items,
            totals: OrderTotals {
                subtotal,
                discount,
                shipping_cost,
                tax: tax.tax,
                total,
            },
            shipping_zone: shipping.map(|quote| quote.zone),
            shipping,
            shipping_address: address.map(|address| address.snapshot()),
            coupon_code,
            valid: errors.is_empty(),
            errors,
        };
        Ok((preview, cart))
    }

    /// Snapshots each line at the live price and records availability problems.
    async fn price_lines(&self, cart: &Cart, errors: &mut Vec<String>) -> Result<Vec<OrderItem>> {
        let mut items = Vec::with_capacity(cart.items.len());
        let mut requested: BTreeMap<ProductId, (Product, u32)> = BTreeMap::new();

        for line in &cart.items {
            let Some(product) = self.store.get_product(line.product_id).await? else {
                errors.push(format!("Product {} no longer exists", line.product_id));
                continue;
            };
            if !product.is_active() {
                errors.push(format!("{} is no longer available", product.name));
                continue;
            }

            items.push(OrderItem::from_product(&product, line.variant_id, line.quantity));
            requested
                .entry(product.id)
                .or_insert_with(|| (product, 0))
                .1 += line.quantity;
        }

        for (product, quantity) in requested.values() {
            if !product.has_stock_for(*quantity) {
                errors.push(format!(
                    "Only {} of {} in stock (requested {})",
                    product.stock.max(0),
                    product.name,
                    quantity
                ));
            }
        }

        Ok(items)
    }
}
