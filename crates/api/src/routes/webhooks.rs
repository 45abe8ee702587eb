//! Payment provider webhook receiver.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use bytes::Bytes;
use checkout::WebhookOutcome;
use serde::Serialize;
use store::CommerceStore;

use crate::error::ApiError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Serialize)]
pub struct WebhookResponse {
    pub outcome: WebhookOutcome,
}

/// POST /webhooks/payments
///
/// The body is taken raw so the signature is checked over the exact bytes sent.
pub async fn payments<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let outcome = state.webhooks.handle_event(&body, signature).await?;
    Ok(Json(WebhookResponse { outcome }))
}
