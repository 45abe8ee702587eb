//! Customer order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::CreateOrderRequest;
use common::OrderId;
use domain::{Money, Order, OrderStatus, PaymentStatus};
use serde::Serialize;
use store::CommerceStore;

use super::parse_id;
use crate::error::ApiError;
use crate::identity::Caller;
use crate::state::AppState;

/// One row of the caller's order history.
#[derive(Serialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total: Money,
    pub item_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number.to_string(),
            status: order.status,
            payment_status: order.payment_status,
            total: order.totals.total,
            item_count: order.item_count(),
            created_at: order.created_at,
        }
    }
}

/// POST /orders: places an order from the caller's cart.
#[tracing::instrument(skip(state, req), fields(identity = %caller.identity))]
pub async fn create<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.orders.create_order(&caller.identity, req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders: the caller's orders, newest first.
pub async fn list<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<Vec<OrderSummary>>, ApiError> {
    let orders = state.status.list(&caller.identity).await?;
    Ok(Json(orders.iter().map(OrderSummary::from).collect()))
}

/// GET /orders/{id}
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let order = state.status.get(&caller.identity, order_id).await?;
    Ok(Json(order))
}
