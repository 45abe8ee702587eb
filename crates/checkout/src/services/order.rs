//! Order placement.

use std::time::Instant;

use chrono::Utc;
use domain::{CartIdentity, Order, OrderDraft, OrderNumber};
use store::{CommerceStore, OrderPlacement, StoreError};

use crate::error::{CheckoutError, Result};
use crate::services::checkout_validator::{CheckoutValidator, CreateOrderRequest};
use crate::services::order_number::OrderNumberGenerator;
use crate::settings::CheckoutSettings;

/// Turns the caller's cart into an order in one store transaction.
#[derive(Clone)]
pub struct OrderService<S: CommerceStore> {
    store: S,
    validator: CheckoutValidator<S>,
    numbers: OrderNumberGenerator<S>,
    max_attempts: u32,
}

impl<S: CommerceStore + Clone> OrderService<S> {
    pub fn new(store: S, settings: CheckoutSettings) -> Self {
        Self {
            numbers: OrderNumberGenerator::new(store.clone(), settings.business_offset),
            max_attempts: settings.order_number_max_attempts.max(1),
            validator: CheckoutValidator::new(store.clone(), settings),
            store,
        }
    }

    /// Places an order from the caller's cart.
    ///
    /// The checkout is re-validated first; any problem fails the whole call
    /// with [`CheckoutError::ValidationFailed`]. Stock, the order row, the cart
    /// and the coupon counter are then written together. A clash on the order
    /// number regenerates the number and retries.
    #[tracing::instrument(skip(self, request), fields(payment_method = %request.payment_method))]
    pub async fn create_order(
        &self,
        identity: &CartIdentity,
        request: CreateOrderRequest,
    ) -> Result<Order> {
        let started = Instant::now();

        let (preview, cart) = self.validator.evaluate(identity, &request.checkout()).await?;
        let (Some(cart), Some(shipping_address), true) =
            (cart, preview.shipping_address, preview.errors.is_empty())
        else {
            return Err(CheckoutError::ValidationFailed(preview.errors));
        };

        let draft = OrderDraft {
            identity: identity.clone(),
            payment_method: request.payment_method,
            shipping_method: request.shipping_method,
            totals: preview.totals,
            shipping_address,
            coupon_code: preview.coupon_code,
            items: preview.items,
        };

        let mut previous: Option<OrderNumber> = None;
        for attempt in 1..=self.max_attempts {
            let now = Utc::now();
            let number = self.numbers.generate(now, previous.as_ref()).await?;
            let order = Order::place(draft.clone(), number.clone(), now);

            match self.store.place_order(OrderPlacement::new(order, &cart)).await {
                Ok(order) => {
                    metrics::counter!("orders_created_total").increment(1);
                    metrics::histogram!("order_creation_duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                    tracing::info!(
                        order_id = %order.id,
                        order_number = %order.order_number,
                        total = %order.totals.total,
                        "order created"
                    );
                    return Ok(order);
                }
                Err(StoreError::DuplicateOrderNumber(taken)) => {
                    metrics::counter!("order_number_collisions_total").increment(1);
                    tracing::warn!(order_number = %taken, attempt, "order number collision, retrying");
                    previous = Some(taken);
                }
                Err(StoreError::StockRaceLost { product_id, requested, available }) => {
                    metrics::counter!("checkout_stock_race_lost_total").increment(1);
                    tracing::warn!(%product_id, requested, available, "stock race lost");
                    return Err(CheckoutError::StockRaceLost { product_id });
                }
                Err(err) => return Err(err.into()),
            }
        }

        tracing::error!(attempts = self.max_attempts, "order number allocation exhausted");
        Err(CheckoutError::OrderNumberExhausted {
            attempts: self.max_attempts,
        })
    }
}
