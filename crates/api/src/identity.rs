//! Caller identity taken from request headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{SessionToken, UserId};
use domain::CartIdentity;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Who is calling. An authenticated user id wins over a guest session token.
#[derive(Debug, Clone)]
pub struct Caller {
    pub identity: CartIdentity,

    /// The guest session, when the header is present alongside a user id.
    pub session_token: Option<SessionToken>,
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let session_token = header(SESSION_TOKEN_HEADER).map(SessionToken::new);
        let identity = match header(USER_ID_HEADER) {
            Some(raw) => {
                let user_id: UserId = raw
                    .parse()
                    .map_err(|_| ApiError::BadRequest(format!("Invalid {USER_ID_HEADER}: {raw}")))?;
                CartIdentity::User(user_id)
            }
            None => match &session_token {
                Some(token) => CartIdentity::Guest(token.clone()),
                None => {
                    return Err(ApiError::Unauthorized(format!(
                        "Missing {USER_ID_HEADER} or {SESSION_TOKEN_HEADER} header"
                    )));
                }
            },
        };

        Ok(Self {
            identity,
            session_token,
        })
    }
}
