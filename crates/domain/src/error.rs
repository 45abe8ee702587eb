//! Domain error types shared across modules.

use thiserror::Error;

/// A textual value did not name any variant of a domain enum.
///
/// Raised when parsing statuses, methods, and similar values coming from
/// storage or HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
