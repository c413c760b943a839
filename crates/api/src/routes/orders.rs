//! Checkout and order lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::{CheckoutRequest, Order, OrderStatus, PaymentStatus};
use serde::Deserialize;
use store::{OrderQuery, Store};

use super::{AppState, parse_id};
use crate::error::ApiError;
use crate::identity::Identity;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl From<ListOrdersParams> for OrderQuery {
    fn from(params: ListOrdersParams) -> Self {
        OrderQuery {
            user_id: params.user_id,
            status: params.status,
            from: params.from,
            to: params.to,
            limit: params.limit,
            offset: params.offset,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: PaymentStatus,
}

// -- Handlers --

/// POST /orders: turn the caller's cart into an order.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state
        .storefront
        .orders
        .create_order(actor.user_id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders: newest first; customers only see their own.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = state
        .storefront
        .orders
        .list_orders(&actor, params.into())
        .await?;
    Ok(Json(orders))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = state.storefront.orders.get_order(&actor, order_id).await?;
    Ok(Json(order))
}

/// POST /orders/{id}/cancel: cancel and restock.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = state
        .storefront
        .orders
        .cancel_order(&actor, order_id)
        .await?;
    Ok(Json(order))
}

/// PATCH /orders/{id}/status (admin)
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = state
        .storefront
        .orders
        .update_status(&actor, order_id, req.status)
        .await?;
    Ok(Json(order))
}

/// PATCH /orders/{id}/payment-status (admin)
#[tracing::instrument(skip(state, req))]
pub async fn update_payment_status<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Path(id): Path<String>,
    Json(req): Json<UpdatePaymentStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = state
        .storefront
        .orders
        .update_payment_status(&actor, order_id, req.payment_status)
        .await?;
    Ok(Json(order))
}
