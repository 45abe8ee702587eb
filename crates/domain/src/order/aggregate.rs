//! Order aggregate implementation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use super::{
    OrderError, OrderItem, OrderNumber, OrderStatus, OrderTotals, PaymentMethod, PaymentStatus,
    StatusChange, StockLine,
};
use crate::catalog::ShippingAddress;
use crate::coupon::CouponCode;
use crate::identity::CartIdentity;
use crate::pricing::ShippingMethod;

/// Everything about a new order except its number, which is assigned at insert time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub identity: CartIdentity,
    pub payment_method: PaymentMethod,
    pub shipping_method: ShippingMethod,
    pub totals: OrderTotals,
    pub shipping_address: ShippingAddress,
    pub coupon_code: Option<CouponCode>,
    pub items: Vec<OrderItem>,
}

/// Order aggregate root.
///
/// Orders are never deleted; every change after placement goes through
/// [`Order::transition`], [`Order::confirm_payment`] or [`Order::fail_payment`],
/// each of which produces an [`OrderUpdate`] for the store to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub identity: CartIdentity,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub shipping_method: ShippingMethod,

    #[serde(flatten)]
    pub totals: OrderTotals,
    pub shipping_address: ShippingAddress,
    pub coupon_code: Option<CouponCode>,
    pub items: Vec<OrderItem>,

    /// True while the ordered quantities are held out of stock.
    pub stock_reserved: bool,

    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub history: Vec<StatusChange>,

    /// Current version for optimistic concurrency.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A change to a persisted order, applied atomically by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdate {
    /// The order as it should be stored.
    pub order: Order,

    /// The version the change was computed from.
    pub expected_version: i64,

    /// History entry to append, if the status changed.
    pub change: Option<StatusChange>,

    /// Stock to put back, in the same transaction.
    pub restock: Vec<StockLine>,

    /// Mark every completed payment of the order refunded.
    pub refund_payments: bool,
}

// Query methods
impl Order {
    /// Returns the number of lines.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Returns the total quantity of all items.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Ordered quantities per product, variants combined.
    pub fn stock_lines(&self) -> Vec<StockLine> {
        stock_lines(&self.items)
    }

    pub fn is_owned_by(&self, identity: &CartIdentity) -> bool {
        &self.identity == identity
    }

    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Command methods (return updates, never mutate self)
impl Order {
    /// Builds a freshly placed order: `Pending`, stock reserved, one history entry.
    pub fn place(draft: OrderDraft, order_number: OrderNumber, now: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::new(),
            order_number,
            identity: draft.identity,
            status: OrderStatus::Pending,
            payment_status: draft.payment_method.initial_payment_status(),
            payment_method: draft.payment_method,
            shipping_method: draft.shipping_method,
            totals: draft.totals,
            shipping_address: draft.shipping_address,
            coupon_code: draft.coupon_code,
            items: draft.items,
            stock_reserved: true,
            confirmed_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            refunded_at: None,
            history: vec![StatusChange {
                from: None,
                to: OrderStatus::Pending,
                note: Some("Order placed".to_string()),
                at: now,
            }],
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the order to `to`.
    ///
    /// Cancelling releases reserved stock. Refunding requires a `Paid` order,
    /// marks its payments refunded, and releases stock if it had not shipped.
    pub fn transition(
        &self,
        to: OrderStatus,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<OrderUpdate, OrderError> {
        let from = self.status;
        if !from.can_transition_to(to) {
            return Err(OrderError::InvalidTransition { from, to });
        }
        if to == OrderStatus::Refunded && !self.payment_status.is_paid() {
            return Err(OrderError::RefundRequiresPayment {
                payment_status: self.payment_status,
            });
        }

        let mut next = self.clone();
        let releases_stock = match to {
            OrderStatus::Cancelled => true,
            OrderStatus::Refunded => from.restocks_on_refund(),
            _ => false,
        };
        let restock = if releases_stock && self.stock_reserved {
            next.stock_reserved = false;
            self.stock_lines()
        } else {
            Vec::new()
        };

        let refund_payments = to == OrderStatus::Refunded;
        if refund_payments {
            next.payment_status = PaymentStatus::Refunded;
        }
        if to == OrderStatus::Delivered && !self.payment_method.is_gateway() {
            next.payment_status = PaymentStatus::Paid;
        }

        let change = next.enter(to, note, now);
        Ok(OrderUpdate {
            order: next,
            expected_version: self.version,
            change: Some(change),
            restock,
            refund_payments,
        })
    }

    /// Records a successful payment: payment status becomes `Paid`, and a
    /// `Pending` order is confirmed.
    pub fn confirm_payment(&self, now: DateTime<Utc>) -> OrderUpdate {
        let mut next = self.clone();
        next.payment_status = PaymentStatus::Paid;

        let change = (self.status == OrderStatus::Pending).then(|| {
            next.enter(
                OrderStatus::Confirmed,
                Some("Payment received".to_string()),
                now,
            )
        });
        if change.is_none() {
            next.touch(now);
        }

        OrderUpdate {
            order: next,
            expected_version: self.version,
            change,
            restock: Vec::new(),
            refund_payments: false,
        }
    }

    /// Records a failed payment attempt. Returns `None` when the order is
    /// already paid, since a late failure must not override a success.
    pub fn fail_payment(&self, now: DateTime<Utc>) -> Option<OrderUpdate> {
        if self.payment_status.is_paid() {
            return None;
        }

        let mut next = self.clone();
        next.payment_status = PaymentStatus::Failed;
        next.touch(now);

        Some(OrderUpdate {
            order: next,
            expected_version: self.version,
            change: None,
            restock: Vec::new(),
            refund_payments: false,
        })
    }

    fn enter(&mut self, to: OrderStatus, note: Option<String>, now: DateTime<Utc>) -> StatusChange {
        let change = StatusChange {
            from: Some(self.status),
            to,
            note,
            at: now,
        };

        let stamp = match to {
            OrderStatus::Confirmed => Some(&mut self.confirmed_at),
            OrderStatus::Shipped => Some(&mut self.shipped_at),
            OrderStatus::Delivered => Some(&mut self.delivered_at),
            OrderStatus::Cancelled => Some(&mut self.cancelled_at),
            OrderStatus::Refunded => Some(&mut self.refunded_at),
            OrderStatus::Pending | OrderStatus::Processing => None,
        };
        if let Some(stamp) = stamp
            && stamp.is_none()
        {
            *stamp = Some(now);
        }

        self.status = to;
        self.history.push(change.clone());
        self.touch(now);
        change
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

/// Sums item quantities per product.
pub fn stock_lines(items: &[OrderItem]) -> Vec<StockLine> {
    let mut totals: BTreeMap<_, u32> = BTreeMap::new();
    for item in items {
        let total = totals.entry(item.product_id).or_default();
        *total = total.saturating_add(item.quantity);
    }
    totals
        .into_iter()
        .map(|(product_id, quantity)| StockLine::new(product_id, quantity))
        .collect()
}
