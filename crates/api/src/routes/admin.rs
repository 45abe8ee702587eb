//! Administrative order endpoints. Authorization happens upstream.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderId;
use domain::{Order, OrderStatus};
use serde::Deserialize;
use store::CommerceStore;

use super::parse_id;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StatusChangeRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /admin/orders/{id}/status
#[tracing::instrument(skip(state, req), fields(to = %req.status))]
pub async fn change_status<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<StatusChangeRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let order = state
        .status
        .transition(order_id, req.status, req.note)
        .await?;
    Ok(Json(order))
}
