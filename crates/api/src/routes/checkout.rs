//! Checkout preview endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use checkout::{CheckoutPreview, CheckoutRequest};
use store::CommerceStore;

use crate::error::ApiError;
use crate::identity::Caller;
use crate::state::AppState;

/// POST /checkout/preview: prices the caller's cart without placing an order.
///
/// Problems are reported in the body (`valid: false`, `errors`), not as an error status.
#[tracing::instrument(skip(state, req), fields(identity = %caller.identity))]
pub async fn preview<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutPreview>, ApiError> {
    let preview = state.checkout.validate(&caller.identity, &req).await?;
    Ok(Json(preview))
}
