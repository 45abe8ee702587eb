//! Order aggregate and related types.

mod aggregate;
mod number;
mod state;
mod value_objects;

pub use aggregate::{Order, OrderDraft, OrderUpdate, stock_lines};
pub use number::{BusinessDay, OrderNumber};
pub use state::{OrderStatus, PaymentMethod, PaymentStatus};
pub use value_objects::{OrderItem, OrderTotals, StatusChange, StockLine};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The state machine has no such edge.
    #[error("Invalid status transition: cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Refunds need a completed payment.
    #[error("Cannot refund an order whose payment status is {payment_status}")]
    RefundRequiresPayment { payment_status: PaymentStatus },
}
