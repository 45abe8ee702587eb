//! Order status changes and order lookups.

use chrono::Utc;
use common::OrderId;
use domain::{CartIdentity, Order, OrderStatus};
use store::CommerceStore;

use crate::error::{CheckoutError, Result};

/// Drives orders through the status state machine.
#[derive(Clone)]
pub struct OrderStatusService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> OrderStatusService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    // Query methods

    /// Fetches an order the caller owns. Other callers' orders are reported as not found.
    pub async fn get(&self, identity: &CartIdentity, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .filter(|order| order.is_owned_by(identity))
            .ok_or_else(|| CheckoutError::OrderNotFound(order_id.to_string()))
    }

    /// The caller's orders, newest first.
    pub async fn list(&self, identity: &CartIdentity) -> Result<Vec<Order>> {
        Ok(self.store.list_orders(identity).await?)
    }

    /// Fetches any order regardless of owner.
    pub async fn get_admin(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::OrderNotFound(order_id.to_string()))
    }

    // Command methods

    /// Moves an order to `to`, restocking and refunding payments where the
    /// transition calls for it. The write is rejected if the order changed
    /// since it was read.
    #[tracing::instrument(skip(self, note))]
    pub async fn transition(
        &self,
        order_id: OrderId,
        to: OrderStatus,
        note: Option<String>,
    ) -> Result<Order> {
        let order = self.get_admin(order_id).await?;
        let from = order.status;
        let update = order.transition(to, note, Utc::now())?;
        let restocked = !update.restock.is_empty();

        let order = self.store.apply_order_update(update).await?;

        metrics::counter!(
            "order_status_transitions_total",
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);
        tracing::info!(
            order_number = %order.order_number,
            %from,
            restocked,
            "order status changed"
        );
        Ok(order)
    }
}
