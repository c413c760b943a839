//! Catalog endpoints. Stock is never edited here; see the inventory routes.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Money, ProductId};
use domain::{NewProduct, Product, ProductUpdate};
use serde::Deserialize;
use store::{ProductQuery, Store};

use super::{AppState, parse_id};
use crate::error::ApiError;
use crate::identity::Identity;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct ListProductsParams {
    #[serde(default)]
    pub active_only: bool,
    pub max_stock: Option<i64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl From<ListProductsParams> for ProductQuery {
    fn from(params: ListProductsParams) -> Self {
        ProductQuery {
            active_only: params.active_only,
            max_stock: params.max_stock,
            limit: params.limit,
            offset: params.offset,
        }
    }
}

/// Catalog edit. Absent fields are left unchanged; `clear_sale_price`
/// removes the sale price.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub price: Option<Money>,
    pub sale_price: Option<Money>,
    #[serde(default)]
    pub clear_sale_price: bool,
    pub is_active: Option<bool>,
}

impl UpdateProductRequest {
    fn into_update(self) -> Result<ProductUpdate, ApiError> {
        let sale_price = match (self.sale_price, self.clear_sale_price) {
            (Some(_), true) => {
                return Err(ApiError::BadRequest(
                    "sale_price and clear_sale_price are mutually exclusive".to_string(),
                ));
            }
            (Some(price), false) => Some(Some(price)),
            (None, true) => Some(None),
            (None, false) => None,
        };
        Ok(ProductUpdate {
            name: self.name,
            price: self.price,
            sale_price,
            is_active: self.is_active,
        })
    }
}

// -- Handlers --

/// POST /products (admin)
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Json(req): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state
        .storefront
        .inventory
        .create_product(&actor, req)
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /products: ordered by SKU.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<ListProductsParams>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = state
        .storefront
        .inventory
        .list_products(params.into())
        .await?;
    Ok(Json(products))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    let product = state.storefront.inventory.get_product(product_id).await?;
    Ok(Json(product))
}

/// PATCH /products/{id} (admin)
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(actor): Identity,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    let product_id: ProductId = parse_id(&id, "product")?;
    let update = req.into_update()?;
    let product = state
        .storefront
        .inventory
        .update_product(&actor, product_id, update)
        .await?;
    Ok(Json(product))
}
