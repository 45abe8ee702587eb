//! Shared application state.

use checkout::{
    CartService, CheckoutValidator, OrderService, OrderStatusService, PaymentWebhookProcessor,
};
use store::CommerceStore;

use crate::config::Config;

/// Services shared by all handlers.
pub struct AppState<S: CommerceStore> {
    pub carts: CartService<S>,
    pub checkout: CheckoutValidator<S>,
    pub orders: OrderService<S>,
    pub status: OrderStatusService<S>,
    pub webhooks: PaymentWebhookProcessor<S>,
}

impl<S: CommerceStore + Clone> AppState<S> {
    pub fn new(store: S, config: &Config) -> Self {
        Self {
            carts: CartService::new(store.clone(), config.checkout.clone()),
            checkout: CheckoutValidator::new(store.clone(), config.checkout.clone()),
            orders: OrderService::new(store.clone(), config.checkout.clone()),
            status: OrderStatusService::new(store.clone()),
            webhooks: PaymentWebhookProcessor::new(store, config.webhook.clone()),
        }
    }
}
