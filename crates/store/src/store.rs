use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AddressId, CartId, CartItemId, OrderId, ProductId};
use domain::{
    Address, Cart, CartIdentity, Coupon, CouponCode, Order, OrderNumber, OrderUpdate, Payment,
    Product,
};

use crate::Result;

/// Everything that must happen atomically when an order is placed.
#[derive(Debug, Clone)]
pub struct OrderPlacement {
    /// The order to insert. Its lines say how much stock to take.
    pub order: Order,

    /// The cart the order was built from.
    pub cart_id: CartId,

    /// Line ids and quantities of the cart as it was priced, sorted by id.
    /// Placement fails with `CartChanged` if the stored cart differs.
    pub cart_lines: Vec<(CartItemId, u32)>,

    /// Guest carts are deleted; user carts are kept as empty shells.
    pub delete_cart: bool,

    /// Coupon whose usage counter is incremented, if one was applied.
    pub coupon: Option<CouponCode>,
}

impl OrderPlacement {
    pub fn new(order: Order, cart: &Cart) -> Self {
        Self {
            coupon: order.coupon_code.clone(),
            order,
            cart_id: cart.id,
            cart_lines: cart_lines(cart),
            delete_cart: cart.identity.is_guest(),
        }
    }
}

/// A cart's `(line id, quantity)` pairs, sorted by id.
pub fn cart_lines(cart: &Cart) -> Vec<(CartItemId, u32)> {
    let mut lines: Vec<_> = cart.items.iter().map(|item| (item.id, item.quantity)).collect();
    lines.sort_unstable();
    lines
}

/// Result of recording a payment reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentRecordOutcome {
    /// The payment row was inserted and the order update applied.
    Recorded,

    /// A payment with the same external reference already exists and the new
    /// report does not supersede it. Nothing changed.
    Duplicate,
}

/// The transactional datastore behind the checkout engine.
///
/// Every method that touches more than one entity is all-or-nothing: when it
/// returns an error, no part of the write is observable.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CommerceStore: Send + Sync {
    /// Fetches a product with its live price and stock.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Inserts or replaces a product.
    async fn save_product(&self, product: Product) -> Result<()>;

    /// Fetches an address only if it belongs to `owner`.
    async fn get_address(&self, id: AddressId, owner: &CartIdentity) -> Result<Option<Address>>;

    /// Inserts or replaces an address.
    async fn save_address(&self, address: Address) -> Result<()>;

    /// Fetches the cart for an identity.
    async fn get_cart(&self, identity: &CartIdentity) -> Result<Option<Cart>>;

    /// Inserts `cart` unless the identity already has one, and returns the
    /// cart that is stored afterwards.
    async fn create_cart_if_absent(&self, cart: Cart) -> Result<Cart>;

    /// Replaces a cart and its lines.
    async fn save_cart(&self, cart: &Cart) -> Result<()>;

    /// Deletes a cart and its lines. Deleting a missing cart is not an error.
    async fn delete_cart(&self, cart_id: CartId) -> Result<()>;

    /// Saves the merged user cart and deletes the guest cart in one write.
    async fn merge_carts(&self, user_cart: &Cart, guest_cart_id: CartId) -> Result<()>;

    /// Deletes guest carts whose expiry is at or before `now`. Returns how many were deleted.
    async fn delete_expired_guest_carts(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Fetches a coupon by its normalised code.
    async fn get_coupon(&self, code: &CouponCode) -> Result<Option<Coupon>>;

    /// Inserts or replaces a coupon.
    async fn save_coupon(&self, coupon: Coupon) -> Result<()>;

    /// Counts orders created in `[start, end)`.
    async fn count_orders_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<u64>;

    /// Places an order.
    ///
    /// In one write: takes stock for every line (`StockRaceLost` if any
    /// product would go negative), inserts the order (`DuplicateOrderNumber`
    /// if its number is taken), empties or deletes the cart (`CartChanged` if
    /// its lines no longer match `cart_lines`), and increments the coupon
    /// counter if still below its limit (`CouponExhausted`).
    async fn place_order(&self, placement: OrderPlacement) -> Result<Order>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn get_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>>;

    /// Orders placed by `identity`, newest first.
    async fn list_orders(&self, identity: &CartIdentity) -> Result<Vec<Order>>;

    /// Applies an order update if the stored version still equals
    /// `update.expected_version` (`ConcurrencyConflict` otherwise).
    ///
    /// Restocks and payment refunds in the update are part of the same write.
    async fn apply_order_update(&self, update: OrderUpdate) -> Result<Order>;

    /// Inserts a payment and applies the accompanying order update in one write.
    ///
    /// A payment whose external reference already exists is reported as
    /// [`PaymentRecordOutcome::Duplicate`] and the update is skipped, unless
    /// it [supersedes](Payment::supersedes) the stored row: a completion
    /// reported for a pending or failed attempt overwrites that row and the
    /// update is applied.
    async fn record_payment(
        &self,
        payment: Payment,
        update: Option<OrderUpdate>,
    ) -> Result<PaymentRecordOutcome>;

    /// Payments for an order, oldest first.
    async fn get_payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>>;
}
