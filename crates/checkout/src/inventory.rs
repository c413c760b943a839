//! Inventory service: catalog, stock movements, reconciliation and reports.

use chrono::Utc;
use common::ProductId;
use domain::{
    Actor, BatchReport, DiscrepancyReport, DomainError, InventoryLogEntry, MovementSummary,
    NewProduct, PhysicalCount, Product, ProductUpdate, StockAdjustment, StockAudit,
    StockMovement, validate_counts,
};
use futures_util::TryStreamExt;
use store::{LedgerQuery, ProductQuery, Store, StoreError};

use crate::error::Result;
use crate::retry::RetryPolicy;

/// Service for the catalog and the inventory ledger.
///
/// Every stock change goes through the store together with its ledger entry;
/// nothing here writes stock directly.
#[derive(Clone)]
pub struct InventoryService<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: Store> InventoryService<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Creates a product; opening stock is recorded as a RESTOCK entry.
    #[tracing::instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create_product(&self, actor: &Actor, input: NewProduct) -> Result<Product> {
        actor.require_admin()?;
        let (product, opening) = input.into_product(Utc::now())?;
        match self.store.insert_product(&product, opening.as_ref()).await {
            Ok(()) => {
                tracing::info!(product_id = %product.id, sku = %product.sku, stock = product.stock_quantity, "product created");
                Ok(product)
            }
            Err(StoreError::UniqueViolation { .. }) => {
                Err(DomainError::Conflict(format!("sku {} already exists", product.sku)).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, product_id: ProductId) -> Result<Product> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", product_id).into())
    }

    pub async fn list_products(&self, query: ProductQuery) -> Result<Vec<Product>> {
        Ok(self.store.list_products(query).await?)
    }

    async fn apply_update(&self, product_id: ProductId, update: &ProductUpdate) -> Result<Product> {
        let current = self.get_product(product_id).await?;
        let edited = update.apply(&current, Utc::now())?;
        Ok(self.store.update_product(&edited, current.version).await?)
    }

    /// Edits catalog fields. Stock is only ever changed through the ledger.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_product(
        &self,
        actor: &Actor,
        product_id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product> {
        actor.require_admin()?;
        if update.is_empty() {
            return self.get_product(product_id).await;
        }
        let update = &update;
        self.retry
            .run("inventory.update_product", move || {
                self.apply_update(product_id, update)
            })
            .await
    }

    /// Applies one manual stock movement.
    #[tracing::instrument(skip(self, adjustment), fields(product_id = %adjustment.product_id, quantity = adjustment.quantity))]
    pub async fn adjust_stock(
        &self,
        actor: &Actor,
        adjustment: StockAdjustment,
    ) -> Result<StockMovement> {
        actor.require_admin()?;
        self.apply_adjustment(&adjustment).await
    }

    async fn apply_adjustment(&self, adjustment: &StockAdjustment) -> Result<StockMovement> {
        adjustment.validate()?;
        let movement = self
            .retry
            .run("inventory.adjust_stock", move || async move {
                Ok(self
                    .store
                    .apply_stock_adjustment(adjustment, Utc::now())
                    .await?)
            })
            .await?;
        metrics::counter!("stock_adjustments_total", "type" => adjustment.entry_type.as_str())
            .increment(1);
        tracing::info!(
            product_id = %adjustment.product_id,
            entry_type = %adjustment.entry_type.as_str(),
            quantity = adjustment.quantity,
            stock = movement.product.stock_quantity,
            "stock adjusted"
        );
        Ok(movement)
    }

    /// Applies each adjustment independently and reports per-item outcomes.
    #[tracing::instrument(skip(self, adjustments), fields(count = adjustments.len()))]
    pub async fn bulk_adjust_stock(
        &self,
        actor: &Actor,
        adjustments: Vec<StockAdjustment>,
    ) -> Result<BatchReport<StockMovement>> {
        actor.require_admin()?;
        let mut report = BatchReport::new();
        for (index, adjustment) in adjustments.iter().enumerate() {
            match self.apply_adjustment(adjustment).await {
                Ok(movement) => report.succeeded(movement),
                Err(err) => match err.kind() {
                    Some(kind) => {
                        report.failed(index, Some(adjustment.product_id), kind, err.to_string())
                    }
                    None => return Err(err),
                },
            }
        }
        if !report.is_complete_success() {
            tracing::warn!(
                failed = report.failed.len(),
                attempted = report.attempted(),
                "bulk stock adjustment partially failed"
            );
        }
        Ok(report)
    }

    /// Sets recorded stock to the physical counts, one ADJUSTMENT per
    /// discrepancy, all or nothing.
    #[tracing::instrument(skip(self, counts), fields(count = counts.len()))]
    pub async fn reconcile(
        &self,
        actor: &Actor,
        counts: Vec<PhysicalCount>,
    ) -> Result<DiscrepancyReport> {
        actor.require_admin()?;
        validate_counts(&counts)?;
        let counts = &counts;
        let report = self
            .retry
            .run("inventory.reconcile", move || async move {
                Ok(self.store.reconcile(counts, Utc::now()).await?)
            })
            .await?;
        metrics::counter!("stock_adjustments_total", "type" => "RECONCILIATION")
            .increment(report.discrepancies.len() as u64);
        Ok(report)
    }

    /// Replays the product's ledger and compares it with recorded stock.
    ///
    /// The product is read again after the replay; if stock moved meanwhile
    /// the audit starts over.
    #[tracing::instrument(skip(self))]
    pub async fn audit_stock(&self, product_id: ProductId) -> Result<StockAudit> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let before = self.get_product(product_id).await?;
            let entries: Vec<InventoryLogEntry> = self
                .store
                .stream_ledger(LedgerQuery::for_product(product_id))
                .await?
                .try_collect()
                .await?;
            let after = self.get_product(product_id).await?;

            if before.stock_quantity == after.stock_quantity || attempt >= attempts {
                let audit = StockAudit::new(&after, &entries);
                if !audit.is_consistent() {
                    tracing::warn!(
                        %product_id,
                        recorded = audit.recorded_quantity,
                        replayed = audit.replayed_quantity,
                        "ledger does not reproduce recorded stock"
                    );
                }
                return Ok(audit);
            }
            attempt += 1;
        }
    }

    /// Ledger history matching the query, oldest first.
    pub async fn ledger(&self, query: LedgerQuery) -> Result<Vec<InventoryLogEntry>> {
        Ok(self.store.ledger(query).await?)
    }

    /// Per-type totals over the entries matching the query.
    #[tracing::instrument(skip(self))]
    pub async fn movement_summary(&self, query: LedgerQuery) -> Result<MovementSummary> {
        let entries: Vec<InventoryLogEntry> =
            self.store.stream_ledger(query).await?.try_collect().await?;
        Ok(MovementSummary::from_entries(&entries))
    }

    /// Active products at or below `threshold` units, by SKU.
    #[tracing::instrument(skip(self))]
    pub async fn low_stock_report(&self, threshold: i64) -> Result<Vec<Product>> {
        Ok(self
            .store
            .list_products(ProductQuery::low_stock(threshold))
            .await?)
    }
}
