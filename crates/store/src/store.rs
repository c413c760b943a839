use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CouponId, OrderId, ProductId, UserId, Version};
use domain::{
    Cart, CheckoutPlan, Coupon, CouponUsage, DiscrepancyReport, InventoryLogEntry, Order,
    PaymentStatus, PhysicalCount, Product, StatusChange, StockAdjustment, StockMovement,
};
use futures_core::Stream;

use crate::{LedgerQuery, OrderQuery, ProductQuery, Result};

/// A stream of ledger entries.
pub type LedgerStream = Pin<Box<dyn Stream<Item = Result<InventoryLogEntry>> + Send>>;

/// Persistence boundary for the storefront.
///
/// Every method is one unit of work: it either takes full effect or none.
/// Writes guarded by a [`Version`] fail with `ConcurrencyConflict` when the
/// record moved on since it was read. Business rules that depend on current
/// state (stock sufficiency, coupon limits, status transitions) are
/// re-checked inside the unit of work and surface as `StoreError::Domain`.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts a product together with its opening ledger entry.
    ///
    /// Fails with `UniqueViolation` when the SKU is taken.
    async fn insert_product(
        &self,
        product: &Product,
        opening: Option<&InventoryLogEntry>,
    ) -> Result<()>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Loads the given products; missing ids are simply absent from the map.
    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>>;

    async fn list_products(&self, query: ProductQuery) -> Result<Vec<Product>>;

    /// Writes the catalog fields of `product` if the stored version is
    /// `expected`, bumping the version. Stock is never written here.
    async fn update_product(&self, product: &Product, expected: Version) -> Result<Product>;

    /// Applies a manual stock movement and appends its ledger entry.
    ///
    /// Fails with a stock error when the result would go below zero.
    async fn apply_stock_adjustment(
        &self,
        adjustment: &StockAdjustment,
        at: DateTime<Utc>,
    ) -> Result<StockMovement>;

    /// Compares physical counts with recorded stock and writes one
    /// ADJUSTMENT entry per discrepancy, all in one transaction.
    ///
    /// Counts are checked with [`domain::validate_counts`] first: an empty
    /// list or a product counted twice is rejected before anything is read.
    async fn reconcile(
        &self,
        counts: &[PhysicalCount],
        at: DateTime<Utc>,
    ) -> Result<DiscrepancyReport>;

    /// Retrieves ledger entries matching a query, oldest first.
    async fn ledger(&self, query: LedgerQuery) -> Result<Vec<InventoryLogEntry>>;

    /// Streams ledger entries matching a query, oldest first.
    ///
    /// Paging fields of the query are ignored.
    async fn stream_ledger(&self, query: LedgerQuery) -> Result<LedgerStream>;

    /// Returns the user's cart, creating an empty one on first access.
    async fn get_or_create_cart(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Cart>;

    /// Replaces the stored cart contents if the stored version equals
    /// `cart.version`. Returns the cart at its new version.
    async fn save_cart(&self, cart: &Cart) -> Result<Cart>;

    /// Fails with `UniqueViolation` when the code is taken.
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()>;

    async fn get_coupon(&self, id: CouponId) -> Result<Option<Coupon>>;

    /// Looks a coupon up by its normalized code.
    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;

    /// Writes administrative fields (currently the active flag) if the stored
    /// version is `expected`. `used_count` is never written here.
    async fn update_coupon(&self, coupon: &Coupon, expected: Version) -> Result<Coupon>;

    async fn count_coupon_usages(&self, coupon_id: CouponId, user_id: UserId) -> Result<u32>;

    async fn coupon_usages(&self, coupon_id: CouponId) -> Result<Vec<CouponUsage>>;

    /// Commits a checkout plan atomically and returns the created order.
    ///
    /// Inside one transaction: verifies the cart version, locks the products
    /// in id order and re-checks their versions, activity and stock, redeems
    /// the coupon with a conditional increment bounded by its usage limit,
    /// draws the next per-day order number, writes the order, decrements stock
    /// with one SALE entry per line, and empties the cart.
    async fn commit_checkout(&self, plan: &CheckoutPlan) -> Result<Order>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Retrieves orders matching a query, newest first.
    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>>;

    /// Moves an order from `change.from` to `change.to` and applies the
    /// restock entries, atomically.
    ///
    /// Fails with a state transition error when the order is no longer in
    /// `change.from` and the move is illegal from its actual status.
    async fn commit_status_change(&self, change: &StatusChange) -> Result<Order>;

    /// Sets the payment status if it is still `expected`.
    async fn update_payment_status(
        &self,
        order_id: OrderId,
        expected: PaymentStatus,
        next: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Order>;
}
