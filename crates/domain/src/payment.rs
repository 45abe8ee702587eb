//! Payment records reported by the gateway.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::order::PaymentMethod;
use crate::pricing::Money;

/// Status of an individual payment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRecordStatus::Pending => "pending",
            PaymentRecordStatus::Completed => "completed",
            PaymentRecordStatus::Failed => "failed",
            PaymentRecordStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentRecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentRecordStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentRecordStatus::Pending),
            "completed" => Ok(PaymentRecordStatus::Completed),
            "failed" => Ok(PaymentRecordStatus::Failed),
            "refunded" => Ok(PaymentRecordStatus::Refunded),
            other => Err(ParseError::new("payment record status", other)),
        }
    }
}

/// A single payment attempt against an order.
///
/// `external_reference` is the provider's id and is unique across all
/// payments; it is what makes webhook redelivery harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub method: PaymentMethod,

    /// In the reporting currency.
    pub amount: Money,

    /// Currency code as received from the provider.
    pub currency: String,
    pub external_reference: String,
    pub status: PaymentRecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        order_id: OrderId,
        method: PaymentMethod,
        amount: Money,
        currency: impl Into<String>,
        external_reference: impl Into<String>,
        status: PaymentRecordStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            order_id,
            method,
            amount,
            currency: currency.into(),
            external_reference: external_reference.into(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PaymentRecordStatus::Completed
    }

    /// Returns true if this report should replace `existing`, which carries
    /// the same external reference.
    ///
    /// Providers reuse one reference for a declined attempt and a later
    /// success, so only a completion overwrites a pending or failed row.
    /// Everything else is a redelivery.
    pub fn supersedes(&self, existing: &Payment) -> bool {
        self.status == PaymentRecordStatus::Completed
            && matches!(
                existing.status,
                PaymentRecordStatus::Pending | PaymentRecordStatus::Failed
            )
    }
}
