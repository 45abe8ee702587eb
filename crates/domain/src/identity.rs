//! Who a cart or order belongs to.

use common::{SessionToken, UserId};
use serde::{Deserialize, Serialize};

/// The key that scopes a cart: an authenticated user or an anonymous session.
///
/// Exactly one of the two is ever present, so this is a variant rather than
/// a pair of optional fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartIdentity {
    User(UserId),
    Guest(SessionToken),
}

impl CartIdentity {
    /// Returns true for anonymous sessions.
    pub fn is_guest(&self) -> bool {
        matches!(self, CartIdentity::Guest(_))
    }

    /// Returns the user id for authenticated identities.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CartIdentity::User(id) => Some(*id),
            CartIdentity::Guest(_) => None,
        }
    }

    /// Returns the session token for guest identities.
    pub fn session_token(&self) -> Option<&SessionToken> {
        match self {
            CartIdentity::User(_) => None,
            CartIdentity::Guest(token) => Some(token),
        }
    }
}

impl std::fmt::Display for CartIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartIdentity::User(id) => write!(f, "user:{id}"),
            CartIdentity::Guest(token) => write!(f, "guest:{token}"),
        }
    }
}

impl From<UserId> for CartIdentity {
    fn from(id: UserId) -> Self {
        CartIdentity::User(id)
    }
}

impl From<SessionToken> for CartIdentity {
    fn from(token: SessionToken) -> Self {
        CartIdentity::Guest(token)
    }
}
