//! Payment provider webhooks.
//!
//! Each event is verified, parsed and applied idempotently: the provider's
//! payment id is unique in the store, so a redelivered event changes nothing.

use chrono::{DateTime, Utc};
use domain::{Money, Order, OrderNumber, OrderStatus, Payment, PaymentRecordStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use store::{CommerceStore, PaymentRecordOutcome, StoreError};

use crate::error::{CheckoutError, Result};
use crate::settings::WebhookSettings;
use crate::signature::{SignatureError, WebhookVerifier};

pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment.succeeded";
pub const EVENT_PAYMENT_FAILED: &str = "payment.failed";
pub const EVENT_PAYMENT_REFUNDED: &str = "payment.refunded";

/// Writes retried when the order changes underneath a webhook.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// A payment notification as sent by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub event_type: String,

    /// The order number the payment is for.
    pub order_reference: String,
    pub external_payment_id: String,

    /// Minor units of `currency`.
    pub amount: i64,
    pub currency: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventEnvelope {
    event_type: String,
}

/// What happened to a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The event changed state.
    Processed,

    /// The event had already been applied.
    Duplicate,

    /// The event type is not one this engine acts on.
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

/// Reconciles provider notifications with orders and payments.
#[derive(Clone)]
pub struct PaymentWebhookProcessor<S: CommerceStore> {
    store: S,
    verifier: WebhookVerifier,
    settings: WebhookSettings,
}

impl<S: CommerceStore> PaymentWebhookProcessor<S> {
    pub fn new(store: S, settings: WebhookSettings) -> Self {
        Self {
            verifier: WebhookVerifier::new(&settings.secret, settings.tolerance),
            store,
            settings,
        }
    }

    /// Verifies and applies a raw webhook body.
    #[tracing::instrument(skip_all)]
    pub async fn handle_event(
        &self,
        raw_payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookOutcome> {
        let now = Utc::now();
        if let Err(err) = self.verifier.verify(raw_payload, signature_header, now) {
            if err == SignatureError::InvalidKey {
                metrics::counter!("payment_webhook_rejected_total", "reason" => "no_secret")
                    .increment(1);
                tracing::error!("webhook rejected: no webhook secret configured");
            } else {
                metrics::counter!("payment_webhook_rejected_total", "reason" => "signature")
                    .increment(1);
                tracing::warn!(error = %err, "webhook signature rejected");
            }
            return Err(err.into());
        }

        let envelope: EventEnvelope = serde_json::from_slice(raw_payload).map_err(|err| {
            metrics::counter!("payment_webhook_rejected_total", "reason" => "payload")
                .increment(1);
            CheckoutError::InvalidPayload(err.to_string())
        })?;

        let outcome = match envelope.event_type.as_str() {
            EVENT_PAYMENT_SUCCEEDED => self.payment_succeeded(parse(raw_payload)?, now).await?,
            EVENT_PAYMENT_FAILED => self.payment_failed(parse(raw_payload)?, now).await?,
            EVENT_PAYMENT_REFUNDED => self.payment_refunded(parse(raw_payload)?, now).await?,
            other => {
                tracing::info!(event_type = other, "ignoring unhandled webhook event");
                WebhookOutcome::Ignored
            }
        };

        metrics::counter!(
            "payment_webhook_events_total",
            "event_type" => event_label(&envelope.event_type),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        Ok(outcome)
    }

    async fn payment_succeeded(
        &self,
        event: PaymentEvent,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome> {
        let mut order = self.order_for(&event).await?;
        let amount = self.to_reporting_currency(event.amount, &event.currency)?;
        if amount != order.totals.total {
            tracing::warn!(
                order_number = %order.order_number,
                expected = %order.totals.total,
                received = %amount,
                "payment amount does not match order total"
            );
        }

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let payment = self.payment(&order, &event, amount, PaymentRecordStatus::Completed, now);
            let update = order.confirm_payment(now);

            match self.store.record_payment(payment, Some(update)).await {
                Ok(outcome) => {
                    tracing::info!(
                        order_number = %order.order_number,
                        external_payment_id = %event.external_payment_id,
                        duplicate = outcome == PaymentRecordOutcome::Duplicate,
                        "payment succeeded"
                    );
                    return Ok(recorded(outcome));
                }
                Err(StoreError::ConcurrencyConflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    order = self.reload(&order).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(CheckoutError::ConcurrencyConflict(order.id.to_string()))
    }

    async fn payment_failed(
        &self,
        event: PaymentEvent,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome> {
        let mut order = self.order_for(&event).await?;
        let amount = self.to_reporting_currency(event.amount, &event.currency)?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let payment = self.payment(&order, &event, amount, PaymentRecordStatus::Failed, now);
            let update = order.fail_payment(now);

            match self.store.record_payment(payment, update).await {
                Ok(outcome) => {
                    tracing::info!(
                        order_number = %order.order_number,
                        external_payment_id = %event.external_payment_id,
                        "payment failed"
                    );
                    return Ok(recorded(outcome));
                }
                Err(StoreError::ConcurrencyConflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    order = self.reload(&order).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(CheckoutError::ConcurrencyConflict(order.id.to_string()))
    }

    async fn payment_refunded(
        &self,
        event: PaymentEvent,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome> {
        let mut order = self.order_for(&event).await?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            if order.status == OrderStatus::Refunded {
                return Ok(WebhookOutcome::Duplicate);
            }
            let update = order.transition(
                OrderStatus::Refunded,
                Some(format!("Refunded by provider ({})", event.external_payment_id)),
                now,
            )?;

            match self.store.apply_order_update(update).await {
                Ok(refunded) => {
                    tracing::info!(order_number = %refunded.order_number, "payment refunded");
                    return Ok(WebhookOutcome::Processed);
                }
                Err(StoreError::ConcurrencyConflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    order = self.reload(&order).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(CheckoutError::ConcurrencyConflict(order.id.to_string()))
    }

    async fn order_for(&self, event: &PaymentEvent) -> Result<Order> {
        let not_found = || CheckoutError::OrderNotFound(event.order_reference.clone());
        let number: OrderNumber = event.order_reference.trim().parse().map_err(|_| not_found())?;
        self.store
            .get_order_by_number(&number)
            .await?
            .ok_or_else(not_found)
    }

    async fn reload(&self, order: &Order) -> Result<Order> {
        self.store
            .get_order(order.id)
            .await?
            .ok_or_else(|| CheckoutError::OrderNotFound(order.order_number.to_string()))
    }

    fn payment(
        &self,
        order: &Order,
        event: &PaymentEvent,
        amount: Money,
        status: PaymentRecordStatus,
        now: DateTime<Utc>,
    ) -> Payment {
        Payment::new(
            order.id,
            order.payment_method,
            amount,
            event.currency.trim().to_ascii_uppercase(),
            event.external_payment_id.clone(),
            status,
            now,
        )
    }

    /// Converts minor units of `currency` into minor units of the reporting currency.
    fn to_reporting_currency(&self, amount: i64, currency: &str) -> Result<Money> {
        let rate = self
            .settings
            .rate_for(currency)
            .ok_or_else(|| CheckoutError::UnsupportedCurrency(currency.to_string()))?;
        Ok(Money::from_decimal_minor(Decimal::from(amount) * rate))
    }
}

fn parse(raw_payload: &[u8]) -> Result<PaymentEvent> {
    serde_json::from_slice(raw_payload).map_err(|err| {
        metrics::counter!("payment_webhook_rejected_total", "reason" => "payload").increment(1);
        CheckoutError::InvalidPayload(err.to_string())
    })
}

fn recorded(outcome: PaymentRecordOutcome) -> WebhookOutcome {
    match outcome {
        PaymentRecordOutcome::Recorded => WebhookOutcome::Processed,
        PaymentRecordOutcome::Duplicate => WebhookOutcome::Duplicate,
    }
}

/// Keeps metric label cardinality bounded.
fn event_label(event_type: &str) -> &'static str {
    match event_type {
        EVENT_PAYMENT_SUCCEEDED => EVENT_PAYMENT_SUCCEEDED,
        EVENT_PAYMENT_FAILED => EVENT_PAYMENT_FAILED,
        EVENT_PAYMENT_REFUNDED => EVENT_PAYMENT_REFUNDED,
        _ => "other",
    }
}
