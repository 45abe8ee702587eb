//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The caller did not identify itself.
    Unauthorized(String),
    /// Checkout service error.
    Checkout(CheckoutError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, errors) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
        };

        let body = match errors {
            Some(errors) => serde_json::json!({ "error": message, "errors": errors }),
            None => serde_json::json!({ "error": message }),
        };
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String, Option<Vec<String>>) {
    let message = err.to_string();
    match err {
        CheckoutError::ValidationFailed(errors) => (StatusCode::BAD_REQUEST, message, Some(errors)),
        CheckoutError::InvalidQuantity(_)
        | CheckoutError::InvalidPayload(_)
        | CheckoutError::UnsupportedCurrency(_) => (StatusCode::BAD_REQUEST, message, None),
        CheckoutError::InvalidSignature(_) => (StatusCode::UNAUTHORIZED, message, None),
        CheckoutError::CartNotFound
        | CheckoutError::CartItemNotFound(_)
        | CheckoutError::ProductNotFound(_)
        | CheckoutError::OrderNotFound(_) => (StatusCode::NOT_FOUND, message, None),
        CheckoutError::OutOfStock { .. }
        | CheckoutError::StockRaceLost { .. }
        | CheckoutError::ProductUnavailable(_)
        | CheckoutError::InvalidTransition { .. }
        | CheckoutError::RefundRequiresPayment { .. }
        | CheckoutError::ConcurrencyConflict(_) => (StatusCode::CONFLICT, message, None),
        CheckoutError::OrderNumberExhausted { .. } => {
            tracing::error!(error = %message, "order number allocation exhausted");
            (StatusCode::SERVICE_UNAVAILABLE, message, None)
        }
        CheckoutError::Store(_) => {
            tracing::error!(error = %message, "store error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                None,
            )
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}
