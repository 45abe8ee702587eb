use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AddressId, CartId, OrderId, ProductId};
use domain::{
    Address, Cart, CartIdentity, Coupon, CouponCode, Order, OrderNumber, OrderUpdate, Payment,
    PaymentRecordStatus, Product, StockLine,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{CommerceStore, OrderPlacement, PaymentRecordOutcome, cart_lines},
};

#[derive(Default)]
struct State {
    products: HashMap<ProductId, Product>,
    addresses: HashMap<AddressId, Address>,
    carts: HashMap<CartId, Cart>,
    coupons: HashMap<CouponCode, Coupon>,
    orders: Vec<Order>,
    payments: Vec<Payment>,
}

impl State {
    fn cart_for(&self, identity: &CartIdentity) -> Option<&Cart> {
        self.carts.values().find(|cart| &cart.identity == identity)
    }

    fn order_index(&self, id: OrderId) -> Option<usize> {
        self.orders.iter().position(|order| order.id == id)
    }

    fn check_update(&self, update: &OrderUpdate) -> Result<usize> {
        let order_id = update.order.id;
        let index = self
            .order_index(order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        let actual = self.orders[index].version;
        if actual != update.expected_version {
            return Err(StoreError::ConcurrencyConflict {
                order_id,
                expected: update.expected_version,
                actual,
            });
        }
        Ok(index)
    }

    fn write_update(&mut self, index: usize, update: OrderUpdate) -> Order {
        self.restock(&update.restock);

        if update.refund_payments {
            let now = update.order.updated_at;
            for payment in self
                .payments
                .iter_mut()
                .filter(|p| p.order_id == update.order.id && p.is_completed())
            {
                payment.status = PaymentRecordStatus::Refunded;
                payment.updated_at = now;
            }
        }

        self.orders[index] = update.order.clone();
        update.order
    }

    fn restock(&mut self, lines: &[StockLine]) {
        for line in lines {
            if let Some(product) = self.products.get_mut(&line.product_id) {
                product.stock += i64::from(line.quantity);
            }
        }
    }
}

/// In-memory store implementation for testing and single-process deployments.
///
/// All state sits behind one lock, so every multi-entity write validates
/// first and then mutates while holding the write guard. This gives the
/// same all-or-nothing behaviour as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the total number of payments stored.
    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }

    /// Returns the number of carts, guest and user.
    pub async fn cart_count(&self) -> usize {
        self.state.read().await.carts.len()
    }

    /// Clears everything.
    pub async fn clear(&self) {
        *self.state.write().await = State::default();
    }
}

#[async_trait]
impl CommerceStore for InMemoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn save_product(&self, product: Product) -> Result<()> {
        self.state
            .write()
            .await
            .products
            .insert(product.id, product);
        Ok(())
    }

    async fn get_address(&self, id: AddressId, owner: &CartIdentity) -> Result<Option<Address>> {
        let state = self.state.read().await;
        Ok(state
            .addresses
            .get(&id)
            .filter(|address| address.is_owned_by(owner))
            .cloned())
    }

    async fn save_address(&self, address: Address) -> Result<()> {
        self.state
            .write()
            .await
            .addresses
            .insert(address.id, address);
        Ok(())
    }

    async fn get_cart(&self, identity: &CartIdentity) -> Result<Option<Cart>> {
        Ok(self.state.read().await.cart_for(identity).cloned())
    }

    async fn create_cart_if_absent(&self, cart: Cart) -> Result<Cart> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.cart_for(&cart.identity) {
            return Ok(existing.clone());
        }
        state.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.state
            .write()
            .await
            .carts
            .insert(cart.id, cart.clone());
        Ok(())
    }

    async fn delete_cart(&self, cart_id: CartId) -> Result<()> {
        self.state.write().await.carts.remove(&cart_id);
        Ok(())
    }

    async fn merge_carts(&self, user_cart: &Cart, guest_cart_id: CartId) -> Result<()> {
        let mut state = self.state.write().await;
        state.carts.remove(&guest_cart_id);
        state.carts.insert(user_cart.id, user_cart.clone());
        Ok(())
    }

    async fn delete_expired_guest_carts(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.carts.len();
        state
            .carts
            .retain(|_, cart| !(cart.identity.is_guest() && cart.is_expired(now)));
        Ok((before - state.carts.len()) as u64)
    }

    async fn get_coupon(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        Ok(self.state.read().await.coupons.get(code).cloned())
    }

    async fn save_coupon(&self, coupon: Coupon) -> Result<()> {
        self.state
            .write()
            .await
            .coupons
            .insert(coupon.code.clone(), coupon);
        Ok(())
    }

    async fn count_orders_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .filter(|order| start <= order.created_at && order.created_at < end)
            .count() as u64)
    }

    async fn place_order(&self, placement: OrderPlacement) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = placement.order;
        let lines = order.stock_lines();

        // Validate everything before the first mutation.
        for line in &lines {
            let available = state
                .products
                .get(&line.product_id)
                .map(|p| p.stock)
                .unwrap_or(0);
            if available < i64::from(line.quantity) {
                return Err(StoreError::StockRaceLost {
                    product_id: line.product_id,
                    requested: line.quantity,
                    available,
                });
            }
        }

        if state
            .orders
            .iter()
            .any(|existing| existing.order_number == order.order_number)
        {
            return Err(StoreError::DuplicateOrderNumber(order.order_number));
        }

        // A cart that is gone has no lines.
        let stored_lines = state
            .carts
            .get(&placement.cart_id)
            .map(cart_lines)
            .unwrap_or_default();
        if stored_lines != placement.cart_lines {
            return Err(StoreError::CartChanged(placement.cart_id));
        }

        if let Some(code) = &placement.coupon {
            let usable = state
                .coupons
                .get(code)
                .is_some_and(Coupon::has_remaining_uses);
            if !usable {
                return Err(StoreError::CouponExhausted(code.to_string()));
            }
        }

        for line in &lines {
            if let Some(product) = state.products.get_mut(&line.product_id) {
                product.stock -= i64::from(line.quantity);
            }
        }

        if placement.delete_cart {
            state.carts.remove(&placement.cart_id);
        } else if let Some(cart) = state.carts.get_mut(&placement.cart_id) {
            cart.clear(order.created_at);
        }

        if let Some(coupon) = placement
            .coupon
            .as_ref()
            .and_then(|code| state.coupons.get_mut(code))
        {
            coupon.usage_count += 1;
            coupon.updated_at = order.created_at;
        }

        state.orders.push(order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.iter().find(|order| order.id == id).cloned())
    }

    async fn get_order_by_number(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .find(|order| &order.order_number == number)
            .cloned())
    }

    async fn list_orders(&self, identity: &CartIdentity) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .iter()
            .filter(|order| order.is_owned_by(identity))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn apply_order_update(&self, update: OrderUpdate) -> Result<Order> {
        let mut state = self.state.write().await;
        let index = state.check_update(&update)?;
        Ok(state.write_update(index, update))
    }

    async fn record_payment(
        &self,
        payment: Payment,
        update: Option<OrderUpdate>,
    ) -> Result<PaymentRecordOutcome> {
        let mut state = self.state.write().await;

        let existing = state
            .payments
            .iter()
            .position(|p| p.external_reference == payment.external_reference);
        if let Some(index) = existing
            && !payment.supersedes(&state.payments[index])
        {
            return Ok(PaymentRecordOutcome::Duplicate);
        }

        let checked = match &update {
            Some(update) => Some(state.check_update(update)?),
            None => None,
        };

        match existing {
            Some(index) => {
                let stored = &mut state.payments[index];
                stored.status = payment.status;
                stored.amount = payment.amount;
                stored.currency = payment.currency;
                stored.updated_at = payment.updated_at;
            }
            None => state.payments.push(payment),
        }
        if let (Some(index), Some(update)) = (checked, update) {
            state.write_update(index, update);
        }
        Ok(PaymentRecordOutcome::Recorded)
    }

    async fn get_payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use common::{SessionToken, UserId};
    use domain::{
        Money, OrderDraft, OrderItem, OrderStatus, OrderTotals, PaymentMethod, PaymentStatus,
        ShippingAddress, ShippingMethod,
    };

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Test".to_string(),
            phone: "0100".to_string(),
            address_line1: "Line 1".to_string(),
            address_line2: None,
            district: "Dhaka".to_string(),
            division: "Dhaka".to_string(),
            postal_code: None,
        }
    }

    async fn seeded(stock: i64) -> (InMemoryStore, Product, Cart) {
        let store = InMemoryStore::new();
        let product = Product::new("Pen", "PEN-1", Money::from_major(20), stock);
        store.save_product(product.clone()).await.unwrap();

        let mut cart = Cart::new(
            CartIdentity::Guest(SessionToken::new("sess")),
            Utc::now(),
            Duration::days(7),
        );
        cart.add_line(&product, None, 2, Utc::now()).unwrap();
        store.save_cart(&cart).await.unwrap();
        (store, product, cart)
    }

    fn order_for(cart: &Cart, product: &Product, sequence: u64) -> Order {
        let draft = OrderDraft {
            identity: cart.identity.clone(),
            payment_method: PaymentMethod::CashOnDelivery,
            shipping_method: ShippingMethod::Standard,
            totals: OrderTotals::default(),
            shipping_address: address(),
            coupon_code: cart.coupon_code.clone(),
            items: vec![OrderItem::from_product(product, None, 2)],
        };
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Order::place(draft, OrderNumber::new(date, sequence), Utc::now())
    }

    #[tokio::test]
    async fn test_place_order_takes_stock_and_deletes_guest_cart() {
        let (store, product, cart) = seeded(5).await;
        let order = order_for(&cart, &product, 1);

        store
            .place_order(OrderPlacement::new(order, &cart))
            .await
            .unwrap();

        let product = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(product.stock, 3);
        assert!(store.get_cart(&cart.identity).await.unwrap().is_none());
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_stock_race_leaves_nothing_behind() {
        let (store, product, cart) = seeded(1).await;
        let order = order_for(&cart, &product, 1);

        let result = store.place_order(OrderPlacement::new(order, &cart)).await;
        assert!(matches!(result, Err(StoreError::StockRaceLost { .. })));

        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 1);
        assert!(store.get_cart(&cart.identity).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_order_number_rejected() {
        let (store, product, cart) = seeded(10).await;
        store
            .place_order(OrderPlacement::new(order_for(&cart, &product, 1), &cart))
            .await
            .unwrap();

        let result = store
            .place_order(OrderPlacement::new(order_for(&cart, &product, 1), &cart))
            .await;
        assert!(matches!(result, Err(StoreError::DuplicateOrderNumber(_))));
        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 8);
    }

    #[tokio::test]
    async fn test_exhausted_coupon_aborts_placement() {
        let (store, product, mut cart) = seeded(10).await;
        let mut coupon = Coupon::fixed("ONCE", Money::from_major(5), Utc::now()).with_usage_limit(1);
        coupon.usage_count = 1;
        store.save_coupon(coupon.clone()).await.unwrap();
        cart.apply_coupon(coupon.code.clone(), Money::from_major(5), Utc::now());

        let result = store
            .place_order(OrderPlacement::new(order_for(&cart, &product, 1), &cart))
            .await;
        assert!(matches!(result, Err(StoreError::CouponExhausted(_))));
        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 10);
    }

    #[tokio::test]
    async fn test_cart_edited_after_pricing_aborts_placement() {
        let (store, product, cart) = seeded(10).await;
        let placement = OrderPlacement::new(order_for(&cart, &product, 1), &cart);

        // Another request adds a line between pricing and placement.
        let extra = Product::new("Ink", "INK-1", Money::from_major(5), 10);
        store.save_product(extra.clone()).await.unwrap();
        let mut edited = cart.clone();
        edited.add_line(&extra, None, 1, Utc::now()).unwrap();
        store.save_cart(&edited).await.unwrap();

        let result = store.place_order(placement).await;
        assert!(matches!(result, Err(StoreError::CartChanged(id)) if id == cart.id));

        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 10);
        let stored = store.get_cart(&cart.identity).await.unwrap().unwrap();
        assert_eq!(stored.item_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let (store, product, cart) = seeded(10).await;
        let order = store
            .place_order(OrderPlacement::new(order_for(&cart, &product, 1), &cart))
            .await
            .unwrap();

        let first = order
            .transition(OrderStatus::Confirmed, None, Utc::now())
            .unwrap();
        let second = order
            .transition(OrderStatus::Cancelled, None, Utc::now())
            .unwrap();

        store.apply_order_update(first).await.unwrap();
        let result = store.apply_order_update(second).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict {
                expected: 1,
                actual: 2,
                ..
            })
        ));
        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 8);
    }

    #[tokio::test]
    async fn test_duplicate_payment_reference() {
        let (store, product, cart) = seeded(10).await;
        let order = store
            .place_order(OrderPlacement::new(order_for(&cart, &product, 1), &cart))
            .await
            .unwrap();

        let payment = || {
            Payment::new(
                order.id,
                PaymentMethod::Card,
                Money::from_major(40),
                "BDT",
                "ext-1",
                PaymentRecordStatus::Completed,
                Utc::now(),
            )
        };

        let first = store
            .record_payment(payment(), Some(order.confirm_payment(Utc::now())))
            .await
            .unwrap();
        let second = store
            .record_payment(payment(), Some(order.confirm_payment(Utc::now())))
            .await
            .unwrap();

        assert_eq!(first, PaymentRecordOutcome::Recorded);
        assert_eq!(second, PaymentRecordOutcome::Duplicate);
        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn test_completion_overwrites_failed_payment() {
        let (store, product, cart) = seeded(10).await;
        let order = store
            .place_order(OrderPlacement::new(order_for(&cart, &product, 1), &cart))
            .await
            .unwrap();

        let payment = |status| {
            Payment::new(
                order.id,
                PaymentMethod::Card,
                Money::from_major(40),
                "BDT",
                "ext-2",
                status,
                Utc::now(),
            )
        };

        let failed = store
            .record_payment(payment(PaymentRecordStatus::Failed), order.fail_payment(Utc::now()))
            .await
            .unwrap();
        let order = store.get_order(order.id).await.unwrap().unwrap();
        let completed = store
            .record_payment(
                payment(PaymentRecordStatus::Completed),
                Some(order.confirm_payment(Utc::now())),
            )
            .await
            .unwrap();

        assert_eq!(failed, PaymentRecordOutcome::Recorded);
        assert_eq!(completed, PaymentRecordOutcome::Recorded);
        let payments = store.get_payments_for_order(order.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert!(payments[0].is_completed());
        let order = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_expired_guest_carts_purged() {
        let store = InMemoryStore::new();
        let past = Utc::now() - Duration::days(10);
        let guest = Cart::new(
            CartIdentity::Guest(SessionToken::new("old")),
            past,
            Duration::days(7),
        );
        let user = Cart::new(CartIdentity::User(UserId::new()), past, Duration::days(7));
        store.save_cart(&guest).await.unwrap();
        store.save_cart(&user).await.unwrap();

        assert_eq!(store.delete_expired_guest_carts(Utc::now()).await.unwrap(), 1);
        assert_eq!(store.cart_count().await, 1);
    }

    #[tokio::test]
    async fn test_address_scoped_to_owner() {
        let store = InMemoryStore::new();
        let owner = CartIdentity::User(UserId::new());
        let address = Address {
            id: AddressId::new(),
            owner: owner.clone(),
            name: "A".to_string(),
            phone: "1".to_string(),
            address_line1: "L".to_string(),
            address_line2: None,
            district: "Dhaka".to_string(),
            division: "Dhaka".to_string(),
            postal_code: None,
        };
        store.save_address(address.clone()).await.unwrap();

        assert!(store.get_address(address.id, &owner).await.unwrap().is_some());
        let stranger = CartIdentity::User(UserId::new());
        assert!(store.get_address(address.id, &stranger).await.unwrap().is_none());
    }
}
