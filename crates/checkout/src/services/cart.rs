//! Cart use cases: line edits, coupons, guest merge and expiry sweep.

use chrono::{DateTime, Utc};
use common::{CartItemId, ProductId, SessionToken, UserId, VariantId};
use domain::{Cart, CartIdentity, Product};
use store::CommerceStore;

use crate::error::{CheckoutError, Result};
use crate::services::coupon::CouponValidator;
use crate::settings::CheckoutSettings;

/// Manages carts for users and guests.
#[derive(Clone)]
pub struct CartService<S: CommerceStore> {
    store: S,
    coupons: CouponValidator<S>,
    settings: CheckoutSettings,
}

impl<S: CommerceStore + Clone> CartService<S> {
    pub fn new(store: S, settings: CheckoutSettings) -> Self {
        Self {
            coupons: CouponValidator::new(store.clone()),
            store,
            settings,
        }
    }

    // Query methods

    /// Returns the identity's cart, creating an empty one on first use.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create(&self, identity: &CartIdentity) -> Result<Cart> {
        if let Some(cart) = self.store.get_cart(identity).await? {
            return Ok(cart);
        }
        let cart = Cart::new(identity.clone(), Utc::now(), self.settings.guest_cart_ttl);
        Ok(self.store.create_cart_if_absent(cart).await?)
    }

    // Command methods

    /// Adds a product to the cart, merging with an identical product+variant line.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        identity: &CartIdentity,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: u32,
    ) -> Result<Cart> {
        if quantity == 0 {
            return Err(CheckoutError::InvalidQuantity(quantity));
        }
        let product = self.product(product_id).await?;
        let mut cart = self.get_or_create(identity).await?;
        let now = Utc::now();

        cart.add_line(&product, variant_id, quantity, now)?;
        self.reprice(&mut cart, now).await?;
        self.store.save_cart(&cart).await?;

        tracing::debug!(cart_id = %cart.id, quantity, "item added to cart");
        Ok(cart)
    }

    /// Sets a line's quantity. Zero is rejected; use [`Self::remove_item`].
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        identity: &CartIdentity,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<Cart> {
        if quantity == 0 {
            return Err(CheckoutError::InvalidQuantity(quantity));
        }
        let mut cart = self.existing(identity).await?;
        let product_id = cart
            .item(item_id)
            .map(|item| item.product_id)
            .ok_or(CheckoutError::CartItemNotFound(item_id))?;
        let product = self.product(product_id).await?;
        let now = Utc::now();

        cart.set_quantity(item_id, quantity, &product, now)?;
        self.reprice(&mut cart, now).await?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, identity: &CartIdentity, item_id: CartItemId) -> Result<Cart> {
        let mut cart = self.existing(identity).await?;
        let now = Utc::now();

        cart.remove_line(item_id, now)?;
        self.reprice(&mut cart, now).await?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Empties the cart and drops its coupon.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, identity: &CartIdentity) -> Result<Cart> {
        let mut cart = self.get_or_create(identity).await?;
        let now = Utc::now();

        cart.clear(now);
        cart.refresh_expiry(now, self.settings.guest_cart_ttl);
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Applies a coupon to the cart. On rejection the cart is left unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn apply_coupon(&self, identity: &CartIdentity, code: &str) -> Result<Cart> {
        let mut cart = self.existing(identity).await?;
        let now = Utc::now();

        let validation = self.coupons.validate_at(code, cart.subtotal(), now).await?;
        let coupon = match validation.coupon {
            Some(coupon) if validation.errors.is_empty() => coupon,
            _ => return Err(CheckoutError::ValidationFailed(validation.errors)),
        };

        cart.apply_coupon(coupon.code, validation.discount, now);
        cart.refresh_expiry(now, self.settings.guest_cart_ttl);
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_coupon(&self, identity: &CartIdentity) -> Result<Cart> {
        let mut cart = self.existing(identity).await?;
        let now = Utc::now();

        cart.clear_coupon(now);
        cart.refresh_expiry(now, self.settings.guest_cart_ttl);
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Folds the guest cart into the user's cart and deletes the guest cart.
    ///
    /// A missing or empty guest cart leaves the user's cart as it is.
    #[tracing::instrument(skip(self))]
    pub async fn merge_guest_into_user(
        &self,
        session_token: &SessionToken,
        user_id: UserId,
    ) -> Result<Cart> {
        let user = CartIdentity::User(user_id);
        let guest = self
            .store
            .get_cart(&CartIdentity::Guest(session_token.clone()))
            .await?;

        let Some(guest) = guest.filter(|cart| !cart.is_empty()) else {
            return self.get_or_create(&user).await;
        };

        let mut cart = self.get_or_create(&user).await?;
        let now = Utc::now();
        cart.absorb(&guest, now);
        self.reprice(&mut cart, now).await?;
        self.store.merge_carts(&cart, guest.id).await?;

        tracing::info!(
            cart_id = %cart.id,
            merged_lines = guest.item_count(),
            "guest cart merged"
        );
        Ok(cart)
    }

    /// Deletes guest carts whose expiry is at or before `now`.
    #[tracing::instrument(skip(self))]
    pub async fn purge_expired_guest_carts(&self, now: DateTime<Utc>) -> Result<u64> {
        let purged = self.store.delete_expired_guest_carts(now).await?;
        if purged > 0 {
            metrics::counter!("guest_carts_purged_total").increment(purged);
            tracing::info!(purged, "expired guest carts deleted");
        }
        Ok(purged)
    }

    // Helpers

    async fn existing(&self, identity: &CartIdentity) -> Result<Cart> {
        self.store
            .get_cart(identity)
            .await?
            .ok_or(CheckoutError::CartNotFound)
    }

    async fn product(&self, product_id: ProductId) -> Result<Product> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound(product_id))
    }

    /// Refreshes guest expiry and recomputes the coupon discount against the
    /// new subtotal, dropping the coupon if it no longer applies.
    async fn reprice(&self, cart: &mut Cart, now: DateTime<Utc>) -> Result<()> {
        cart.refresh_expiry(now, self.settings.guest_cart_ttl);

        let Some(code) = cart.coupon_code.clone() else {
            return Ok(());
        };
        let validation = self
            .coupons
            .validate_at(code.as_str(), cart.subtotal(), now)
            .await?;
        if validation.is_valid() {
            cart.apply_coupon(code, validation.discount, now);
        } else {
            tracing::info!(cart_id = %cart.id, %code, "coupon dropped from cart");
            cart.clear_coupon(now);
        }
        Ok(())
    }
}
