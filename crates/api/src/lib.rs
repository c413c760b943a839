//! HTTP API server with observability for the storefront.
//!
//! Exposes the storefront services as REST endpoints, with structured
//! logging (tracing) and Prometheus metrics. Callers are identified by the
//! trusted `x-user-id` and `x-user-role` headers.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use checkout::Storefront;
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // Orders
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route(
            "/orders/{id}/status",
            patch(routes::orders::update_status::<S>),
        )
        .route(
            "/orders/{id}/payment-status",
            patch(routes::orders::update_payment_status::<S>),
        )
        // Cart
        .route(
            "/cart",
            get(routes::cart::get::<S>).delete(routes::cart::clear::<S>),
        )
        .route("/cart/items", post(routes::cart::add_item::<S>))
        .route(
            "/cart/items/{item_id}",
            patch(routes::cart::update_item::<S>).delete(routes::cart::remove_item::<S>),
        )
        .route(
            "/cart/coupon",
            post(routes::cart::apply_coupon::<S>).delete(routes::cart::remove_coupon::<S>),
        )
        .route("/cart/validation", get(routes::cart::validate::<S>))
        .route("/cart/merge", post(routes::cart::merge::<S>))
        // Coupons
        .route("/coupons", post(routes::coupons::create::<S>))
        .route("/coupons/validate", post(routes::coupons::validate::<S>))
        .route("/coupons/{code}", get(routes::coupons::get::<S>))
        .route(
            "/coupons/{code}/deactivate",
            post(routes::coupons::deactivate::<S>),
        )
        .route("/coupons/{code}/usages", get(routes::coupons::usages::<S>))
        // Catalog
        .route(
            "/products",
            post(routes::products::create::<S>).get(routes::products::list::<S>),
        )
        .route(
            "/products/{id}",
            get(routes::products::get::<S>).patch(routes::products::update::<S>),
        )
        // Inventory
        .route(
            "/inventory/adjustments",
            post(routes::inventory::adjust::<S>),
        )
        .route(
            "/inventory/adjustments/bulk",
            post(routes::inventory::bulk_adjust::<S>),
        )
        .route(
            "/inventory/reconciliations",
            post(routes::inventory::reconcile::<S>),
        )
        .route("/inventory/low-stock", get(routes::inventory::low_stock::<S>))
        .route(
            "/inventory/{product_id}/ledger",
            get(routes::inventory::ledger::<S>),
        )
        .route(
            "/inventory/{product_id}/audit",
            get(routes::inventory::audit::<S>),
        )
        .route(
            "/inventory/{product_id}/summary",
            get(routes::inventory::summary::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires every service over `store` using the configured pricing and retry
/// policies.
pub fn create_state<S: Store + Clone + 'static>(store: S, config: &Config) -> Arc<AppState<S>> {
    Arc::new(AppState {
        storefront: Storefront::new(store, config.pricing, config.retry),
    })
}
