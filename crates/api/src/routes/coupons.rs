//! Coupon preview and administration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::Money;
use domain::{Coupon, CouponUsage, CouponValidation, NewCoupon};
use serde::Deserialize;
use store::Store;

use super::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub order_total: Money,
}

/// POST /coupons (admin)
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Json(req): Json<NewCoupon>,
) -> Result<(StatusCode, Json<Coupon>), ApiError> {
    let coupon = state.storefront.coupons.create(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// POST /coupons/validate: read-only preview for the caller.
///
/// A rejected coupon is a normal `200` answer with `valid: false`.
#[tracing::instrument(skip(state))]
pub async fn validate<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Json(req): Json<ValidateCouponRequest>,
) -> Result<Json<CouponValidation>, ApiError> {
    if req.order_total.is_negative() {
        return Err(ApiError::BadRequest(
            "order_total must not be negative".to_string(),
        ));
    }
    let validation = state
        .storefront
        .coupons
        .validate(&req.code, actor.user_id, req.order_total)
        .await?;
    Ok(Json(validation))
}

/// GET /coupons/{code} (admin)
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Path(code): Path<String>,
) -> Result<Json<Coupon>, ApiError> {
    let coupon = state.storefront.coupons.get(&actor, &code).await?;
    Ok(Json(coupon))
}

/// POST /coupons/{code}/deactivate (admin)
#[tracing::instrument(skip(state))]
pub async fn deactivate<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Path(code): Path<String>,
) -> Result<Json<Coupon>, ApiError> {
    let coupon = state.storefront.coupons.deactivate(&actor, &code).await?;
    Ok(Json(coupon))
}

/// GET /coupons/{code}/usages (admin)
#[tracing::instrument(skip(state))]
pub async fn usages<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Path(code): Path<String>,
) -> Result<Json<Vec<CouponUsage>>, ApiError> {
    let usages = state.storefront.coupons.usages(&actor, &code).await?;
    Ok(Json(usages))
}
