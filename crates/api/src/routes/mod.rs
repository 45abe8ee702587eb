//! HTTP handlers.

pub mod admin;
pub mod cart;
pub mod checkout;
pub mod ops;
pub mod orders;
pub mod webhooks;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses an id taken from the request path.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {what}: {raw}")))
}
