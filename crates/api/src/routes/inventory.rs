//! Stock ledger endpoints (admin only).

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::ProductId;
use domain::{
    Actor, BatchReport, DiscrepancyReport, InventoryLogEntry, LedgerEntryType, MovementSummary,
    PhysicalCount, Product, StockAdjustment, StockAudit, StockMovement,
};
use serde::Deserialize;
use store::{LedgerQuery, Store};

use super::{AppState, parse_id};
use crate::error::ApiError;
use crate::identity::Identity;

pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct BulkAdjustRequest {
    pub adjustments: Vec<StockAdjustment>,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub counts: Vec<PhysicalCount>,
}

#[derive(Debug, Deserialize)]
pub struct LowStockParams {
    pub threshold: Option<i64>,
}

/// Ledger filters; `types` is a comma-separated list such as `SALE,RETURN`.
#[derive(Debug, Default, Deserialize)]
pub struct LedgerParams {
    pub types: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl LedgerParams {
    fn into_query(self, product_id: ProductId) -> Result<LedgerQuery, ApiError> {
        let entry_types = self
            .types
            .as_deref()
            .map(|types| {
                types
                    .split(',')
                    .filter(|t| !t.trim().is_empty())
                    .map(str::parse::<LedgerEntryType>)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        Ok(LedgerQuery {
            product_id: Some(product_id),
            entry_types,
            from: self.from,
            to: self.to,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

fn admin(actor: &Actor) -> Result<(), ApiError> {
    actor.require_admin().map_err(ApiError::from)
}

// -- Handlers --

/// POST /inventory/adjustments
#[tracing::instrument(skip(state))]
pub async fn adjust<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Json(req): Json<StockAdjustment>,
) -> Result<Json<StockMovement>, ApiError> {
    let movement = state
        .storefront
        .inventory
        .adjust_stock(&actor, req)
        .await?;
    Ok(Json(movement))
}

/// POST /inventory/adjustments/bulk: per-item outcomes.
#[tracing::instrument(skip(state, req))]
pub async fn bulk_adjust<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Json(req): Json<BulkAdjustRequest>,
) -> Result<Json<BatchReport<StockMovement>>, ApiError> {
    let report = state
        .storefront
        .inventory
        .bulk_adjust_stock(&actor, req.adjustments)
        .await?;
    Ok(Json(report))
}

/// POST /inventory/reconciliations: all or nothing.
#[tracing::instrument(skip(state, req))]
pub async fn reconcile<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Json(req): Json<ReconcileRequest>,
) -> Result<Json<DiscrepancyReport>, ApiError> {
    let report = state
        .storefront
        .inventory
        .reconcile(&actor, req.counts)
        .await?;
    Ok(Json(report))
}

/// GET /inventory/low-stock?threshold=N
#[tracing::instrument(skip(state))]
pub async fn low_stock<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Query(params): Query<LowStockParams>,
) -> Result<Json<Vec<Product>>, ApiError> {
    admin(&actor)?;
    let threshold = params.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
    let products = state
        .storefront
        .inventory
        .low_stock_report(threshold)
        .await?;
    Ok(Json(products))
}

/// GET /inventory/{product_id}/ledger
#[tracing::instrument(skip(state))]
pub async fn ledger<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Path(product_id): Path<String>,
    Query(params): Query<LedgerParams>,
) -> Result<Json<Vec<InventoryLogEntry>>, ApiError> {
    admin(&actor)?;
    let product_id: ProductId = parse_id(&product_id, "product")?;
    let entries = state
        .storefront
        .inventory
        .ledger(params.into_query(product_id)?)
        .await?;
    Ok(Json(entries))
}

/// GET /inventory/{product_id}/audit: replay the ledger against recorded stock.
#[tracing::instrument(skip(state))]
pub async fn audit<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Path(product_id): Path<String>,
) -> Result<Json<StockAudit>, ApiError> {
    admin(&actor)?;
    let product_id: ProductId = parse_id(&product_id, "product")?;
    let audit = state.storefront.inventory.audit_stock(product_id).await?;
    Ok(Json(audit))
}

/// GET /inventory/{product_id}/summary
#[tracing::instrument(skip(state))]
pub async fn summary<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Path(product_id): Path<String>,
    Query(params): Query<LedgerParams>,
) -> Result<Json<MovementSummary>, ApiError> {
    admin(&actor)?;
    let product_id: ProductId = parse_id(&product_id, "product")?;
    let summary = state
        .storefront
        .inventory
        .movement_summary(params.into_query(product_id)?)
        .await?;
    Ok(Json(summary))
}
