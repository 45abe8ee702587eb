//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{CartItemId, ProductId, VariantId};
use domain::{Cart, CartIdentity, Money};
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use super::parse_id;
use crate::error::ApiError;
use crate::identity::Caller;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
}

// -- Response types --

/// A cart with its computed amounts.
#[derive(Serialize)]
pub struct CartResponse {
    #[serde(flatten)]
    pub cart: Cart,
    pub subtotal: Money,
    pub total: Money,
    pub total_quantity: u32,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        Self {
            subtotal: cart.subtotal(),
            total: cart.total(),
            total_quantity: cart.total_quantity(),
            cart,
        }
    }
}

type CartResult = Result<Json<CartResponse>, ApiError>;

// -- Handlers --

/// GET /cart
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> CartResult {
    let cart = state.carts.get_or_create(&caller.identity).await?;
    Ok(Json(cart.into()))
}

/// POST /cart/items
pub async fn add_item<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<AddItemRequest>,
) -> CartResult {
    let cart = state
        .carts
        .add_item(&caller.identity, req.product_id, req.variant_id, req.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// PATCH /cart/items/{id}
pub async fn update_item<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<UpdateQuantityRequest>,
) -> CartResult {
    let item_id: CartItemId = parse_id(&id, "cart item id")?;
    let cart = state
        .carts
        .update_quantity(&caller.identity, item_id, req.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart/items/{id}
pub async fn remove_item<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> CartResult {
    let item_id: CartItemId = parse_id(&id, "cart item id")?;
    let cart = state.carts.remove_item(&caller.identity, item_id).await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart
pub async fn clear<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> CartResult {
    let cart = state.carts.clear(&caller.identity).await?;
    Ok(Json(cart.into()))
}

/// POST /cart/coupon
pub async fn apply_coupon<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Json(req): Json<ApplyCouponRequest>,
) -> CartResult {
    let cart = state.carts.apply_coupon(&caller.identity, &req.code).await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart/coupon
pub async fn remove_coupon<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> CartResult {
    let cart = state.carts.remove_coupon(&caller.identity).await?;
    Ok(Json(cart.into()))
}

/// POST /cart/merge: needs both `x-user-id` and `x-session-token`.
pub async fn merge<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> CartResult {
    let (CartIdentity::User(user_id), Some(token)) = (&caller.identity, &caller.session_token)
    else {
        return Err(ApiError::BadRequest(
            "Merging needs both x-user-id and x-session-token".to_string(),
        ));
    };
    let cart = state.carts.merge_guest_into_user(token, *user_id).await?;
    Ok(Json(cart.into()))
}
