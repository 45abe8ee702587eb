//! Daily order numbering: `ORD-YYYYMMDD-NNNN`.

use chrono::{DateTime, FixedOffset, Utc};
use domain::{BusinessDay, OrderNumber};
use store::CommerceStore;

use crate::error::Result;

/// Derives the next order number from the count of today's orders.
///
/// The count is not race-free. The store's uniqueness constraint catches
/// collisions and the caller asks again with the number that collided.
#[derive(Clone)]
pub struct OrderNumberGenerator<S: CommerceStore> {
    store: S,
    offset: FixedOffset,
}

impl<S: CommerceStore> OrderNumberGenerator<S> {
    pub fn new(store: S, offset: FixedOffset) -> Self {
        Self { store, offset }
    }

    /// Next number for the business day containing `now`.
    ///
    /// When `previous` is a number from the same day that collided, the
    /// sequence is moved past it even if the count has not caught up.
    #[tracing::instrument(skip(self))]
    pub async fn generate(
        &self,
        now: DateTime<Utc>,
        previous: Option<&OrderNumber>,
    ) -> Result<OrderNumber> {
        let day = BusinessDay::containing(now, self.offset);
        let existing = self.store.count_orders_between(day.start, day.end).await?;

        let floor = previous
            .filter(|number| number.date() == Some(day.date))
            .and_then(OrderNumber::sequence)
            .unwrap_or(0);

        Ok(day.order_number(existing.max(floor)))
    }
}
