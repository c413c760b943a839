//! Cart endpoints. Every route acts on the caller's own cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{CartItemId, ProductId};
use domain::{BatchReport, CartItem, CartSummary, CheckoutProblem, GuestCartItem};
use serde::{Deserialize, Serialize};
use store::Store;

use super::{AppState, parse_id};
use crate::error::ApiError;
use crate::identity::Identity;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct MergeCartRequest {
    pub items: Vec<GuestCartItem>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutReadiness {
    pub ready: bool,
    pub problems: Vec<CheckoutProblem>,
}

// -- Handlers --

/// GET /cart
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
) -> Result<Json<CartSummary>, ApiError> {
    let cart = state.storefront.carts.get_cart(actor.user_id).await?;
    Ok(Json(cart))
}

/// DELETE /cart: remove every line and the coupon.
#[tracing::instrument(skip(state))]
pub async fn clear<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
) -> Result<Json<CartSummary>, ApiError> {
    let cart = state.storefront.carts.clear(actor.user_id).await?;
    Ok(Json(cart))
}

/// POST /cart/items
#[tracing::instrument(skip(state))]
pub async fn add_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartSummary>, ApiError> {
    let cart = state
        .storefront
        .carts
        .add_item(actor.user_id, req.product_id, req.quantity)
        .await?;
    Ok(Json(cart))
}

/// PATCH /cart/items/{item_id}
#[tracing::instrument(skip(state))]
pub async fn update_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Path(item_id): Path<String>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<CartSummary>, ApiError> {
    let item_id: CartItemId = parse_id(&item_id, "cart item")?;
    let cart = state
        .storefront
        .carts
        .update_item_quantity(actor.user_id, item_id, req.quantity)
        .await?;
    Ok(Json(cart))
}

/// DELETE /cart/items/{item_id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Path(item_id): Path<String>,
) -> Result<Json<CartSummary>, ApiError> {
    let item_id: CartItemId = parse_id(&item_id, "cart item")?;
    let cart = state
        .storefront
        .carts
        .remove_item(actor.user_id, item_id)
        .await?;
    Ok(Json(cart))
}

/// POST /cart/coupon
#[tracing::instrument(skip(state))]
pub async fn apply_coupon<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Json(req): Json<ApplyCouponRequest>,
) -> Result<Json<CartSummary>, ApiError> {
    let cart = state
        .storefront
        .carts
        .apply_coupon(actor.user_id, &req.code)
        .await?;
    Ok(Json(cart))
}

/// DELETE /cart/coupon
#[tracing::instrument(skip(state))]
pub async fn remove_coupon<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
) -> Result<Json<CartSummary>, ApiError> {
    let cart = state.storefront.carts.remove_coupon(actor.user_id).await?;
    Ok(Json(cart))
}

/// GET /cart/validation: every reason checkout would fail right now.
#[tracing::instrument(skip(state))]
pub async fn validate<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
) -> Result<Json<CheckoutReadiness>, ApiError> {
    let problems = state
        .storefront
        .carts
        .validate_for_checkout(actor.user_id)
        .await?;
    Ok(Json(CheckoutReadiness {
        ready: problems.is_empty(),
        problems,
    }))
}

/// POST /cart/merge: fold a guest cart into the caller's cart.
#[tracing::instrument(skip(state, req))]
pub async fn merge<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Json(req): Json<MergeCartRequest>,
) -> Result<Json<BatchReport<CartItem>>, ApiError> {
    let report = state
        .storefront
        .carts
        .merge_guest_cart(actor.user_id, &req.items)
        .await?;
    Ok(Json(report))
}
