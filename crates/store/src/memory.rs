use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{CouponId, OrderId, ProductId, UserId, Version};
use domain::{
    Cart, CheckoutPlan, Coupon, CouponUsage, Discrepancy, DiscrepancyReport, DomainError,
    InventoryLogEntry, Order, OrderNumber, PaymentStatus, PhysicalCount, Product, StatusChange,
    StockAdjustment, StockMovement, validate_counts,
};
use tokio::sync::RwLock;

use crate::query::paginate;
use crate::{
    LedgerQuery, OrderQuery, ProductQuery, Result, StoreError,
    store::{LedgerStream, Store},
};

#[derive(Default)]
struct State {
    products: HashMap<ProductId, Product>,
    ledger: Vec<InventoryLogEntry>,
    carts: HashMap<UserId, Cart>,
    coupons: HashMap<CouponId, Coupon>,
    usages: Vec<CouponUsage>,
    orders: HashMap<OrderId, Order>,
    order_sequences: HashMap<NaiveDate, u32>,
}

impl State {
    fn product_mut(&mut self, id: ProductId) -> Result<&mut Product> {
        self.products
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Product", id).into())
    }

    fn uses_by(&self, coupon_id: CouponId, user_id: UserId) -> Result<u32> {
        let count = self
            .usages
            .iter()
            .filter(|u| u.coupon_id == coupon_id && u.user_id == user_id)
            .count();
        u32::try_from(count).map_err(|_| StoreError::Corrupt(format!("usage count {count}")))
    }
}

/// In-memory store for tests and single-process deployments.
///
/// One write lock spans each unit of work, and every check runs before the
/// first mutation, so a failed operation leaves no trace.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of ledger entries stored.
    pub async fn ledger_len(&self) -> usize {
        self.state.read().await.ledger.len()
    }
}

fn status_conflict(order: &Order, change: &StatusChange) -> StoreError {
    if order.status.can_transition_to(change.to) {
        StoreError::conflict(
            "Order",
            order.id,
            format!("status moved from {} to {}", change.from, order.status),
        )
    } else {
        DomainError::InvalidStateTransition {
            from: order.status,
            to: change.to,
        }
        .into()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_product(
        &self,
        product: &Product,
        opening: Option<&InventoryLogEntry>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if state.products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::UniqueViolation {
                constraint: "products_sku_key".to_string(),
            });
        }
        state.products.insert(product.id, product.clone());
        state.ledger.extend(opening.cloned());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn list_products(&self, query: ProductQuery) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<_> = state
            .products
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(paginate(products.into_iter(), query.offset, query.limit))
    }

    async fn update_product(&self, product: &Product, expected: Version) -> Result<Product> {
        let mut state = self.state.write().await;
        let stored = state.product_mut(product.id)?;
        if stored.version != expected {
            return Err(StoreError::conflict(
                "Product",
                product.id,
                format!("expected version {expected}, found {}", stored.version),
            ));
        }
        stored.name = product.name.clone();
        stored.price = product.price;
        stored.sale_price = product.sale_price;
        stored.is_active = product.is_active;
        stored.updated_at = product.updated_at;
        stored.version = expected.next();
        Ok(stored.clone())
    }

    async fn apply_stock_adjustment(
        &self,
        adjustment: &StockAdjustment,
        at: DateTime<Utc>,
    ) -> Result<StockMovement> {
        let mut state = self.state.write().await;
        let entry = adjustment.to_entry(at)?;
        let product = state.product_mut(adjustment.product_id)?;
        product.stock_quantity = adjustment.resulting_stock(product)?;
        product.updated_at = at;
        let product = product.clone();
        state.ledger.push(entry.clone());
        Ok(StockMovement {
            product,
            log_entry: entry,
        })
    }

    async fn reconcile(
        &self,
        counts: &[PhysicalCount],
        at: DateTime<Utc>,
    ) -> Result<DiscrepancyReport> {
        validate_counts(counts)?;
        let mut state = self.state.write().await;

        let mut discrepancies = Vec::new();
        for count in counts {
            let product = state
                .products
                .get(&count.product_id)
                .ok_or_else(|| DomainError::not_found("Product", count.product_id))?;
            discrepancies.extend(Discrepancy::between(product, count.actual_quantity));
        }
        let entries = discrepancies
            .iter()
            .map(|d| d.to_entry(at))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (discrepancy, entry) in discrepancies.iter().zip(entries) {
            let product = state.product_mut(discrepancy.product_id)?;
            product.stock_quantity = discrepancy.actual_quantity;
            product.updated_at = at;
            state.ledger.push(entry);
        }

        Ok(DiscrepancyReport {
            products_checked: counts.len(),
            discrepancies,
            reconciled_at: at,
        })
    }

    async fn ledger(&self, query: LedgerQuery) -> Result<Vec<InventoryLogEntry>> {
        let state = self.state.read().await;
        let entries = state.ledger.iter().filter(|e| query.matches(e)).cloned();
        Ok(paginate(entries, query.offset, query.limit))
    }

    async fn stream_ledger(&self, query: LedgerQuery) -> Result<LedgerStream> {
        use futures_util::stream;

        let state = self.state.read().await;
        let entries: Vec<_> = state
            .ledger
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))))
    }

    async fn get_or_create_cart(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Cart> {
        let mut state = self.state.write().await;
        Ok(state
            .carts
            .entry(user_id)
            .or_insert_with(|| Cart::new(user_id, now))
            .clone())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<Cart> {
        let mut state = self.state.write().await;
        let stored = state
            .carts
            .get_mut(&cart.user_id)
            .filter(|stored| stored.id == cart.id)
            .ok_or_else(|| DomainError::not_found("Cart", cart.id))?;
        if stored.version != cart.version {
            return Err(StoreError::conflict(
                "Cart",
                cart.id,
                format!("expected version {}, found {}", cart.version, stored.version),
            ));
        }
        let mut saved = cart.clone();
        saved.version = cart.version.next();
        *stored = saved.clone();
        Ok(saved)
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut state = self.state.write().await;
        if state.coupons.values().any(|c| c.code == coupon.code) {
            return Err(StoreError::UniqueViolation {
                constraint: "coupons_code_key".to_string(),
            });
        }
        state.coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn get_coupon(&self, id: CouponId) -> Result<Option<Coupon>> {
        Ok(self.state.read().await.coupons.get(&id).cloned())
    }

    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let state = self.state.read().await;
        Ok(state.coupons.values().find(|c| c.code == code).cloned())
    }

    async fn update_coupon(&self, coupon: &Coupon, expected: Version) -> Result<Coupon> {
        let mut state = self.state.write().await;
        let stored = state
            .coupons
            .get_mut(&coupon.id)
            .ok_or_else(|| DomainError::not_found("Coupon", coupon.id))?;
        if stored.version != expected {
            return Err(StoreError::conflict(
                "Coupon",
                coupon.id,
                format!("expected version {expected}, found {}", stored.version),
            ));
        }
        stored.is_active = coupon.is_active;
        stored.version = expected.next();
        Ok(stored.clone())
    }

    async fn count_coupon_usages(&self, coupon_id: CouponId, user_id: UserId) -> Result<u32> {
        self.state.read().await.uses_by(coupon_id, user_id)
    }

    async fn coupon_usages(&self, coupon_id: CouponId) -> Result<Vec<CouponUsage>> {
        let state = self.state.read().await;
        Ok(state
            .usages
            .iter()
            .filter(|u| u.coupon_id == coupon_id)
            .cloned()
            .collect())
    }

    async fn commit_checkout(&self, plan: &CheckoutPlan) -> Result<Order> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let cart = state
            .carts
            .get(&plan.user_id)
            .filter(|c| c.id == plan.cart_id)
            .ok_or_else(|| DomainError::not_found("Cart", plan.cart_id))?;
        if cart.version != plan.cart_version {
            return Err(StoreError::conflict(
                "Cart",
                plan.cart_id,
                "cart changed during checkout",
            ));
        }

        for line in &plan.lines {
            let product = state
                .products
                .get(&line.product_id)
                .ok_or_else(|| DomainError::not_found("Product", line.product_id))?;
            if product.version != line.product_version {
                return Err(StoreError::conflict(
                    "Product",
                    product.id,
                    "catalog entry changed during checkout",
                ));
            }
            product.ensure_available(line.quantity)?;
        }

        if let Some(redemption) = &plan.redemption {
            let coupon = state
                .coupons
                .get(&redemption.coupon_id)
                .ok_or_else(|| DomainError::not_found("Coupon", redemption.coupon_id))?;
            if coupon.version != redemption.coupon_version {
                return Err(StoreError::conflict(
                    "Coupon",
                    coupon.id,
                    "coupon changed during checkout",
                ));
            }
            let uses = state.uses_by(coupon.id, plan.user_id)?;
            redemption
                .check_limits(coupon.used_count, uses)
                .map_err(DomainError::from)?;
        }

        let day = plan.order_day();
        let sequence = state
            .order_sequences
            .get(&day)
            .copied()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| StoreError::Corrupt(format!("order sequence for {day} exhausted")))?;
        let order_number = OrderNumber::for_day(day, sequence);
        if state
            .orders
            .values()
            .any(|o| o.order_number == order_number)
        {
            return Err(StoreError::UniqueViolation {
                constraint: "orders_order_number_key".to_string(),
            });
        }

        // Checks passed; mutate.
        state.order_sequences.insert(day, sequence);

        for entry in plan.sale_entries(&order_number) {
            let product = state.product_mut(entry.product_id)?;
            product.stock_quantity += entry.quantity;
            product.updated_at = plan.placed_at;
            state.ledger.push(entry);
        }

        if let Some(usage) = plan.coupon_usage()
            && let Some(coupon) = state.coupons.get_mut(&usage.coupon_id)
        {
            coupon.used_count += 1;
            state.usages.push(usage);
        }

        if let Some(cart) = state.carts.get_mut(&plan.user_id) {
            cart.clear(plan.placed_at);
            cart.version = cart.version.next();
        }

        let order = plan.to_order(order_number);
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_number.as_str().cmp(a.order_number.as_str()))
        });
        Ok(paginate(orders.into_iter(), query.offset, query.limit))
    }

    async fn commit_status_change(&self, change: &StatusChange) -> Result<Order> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let order = state
            .orders
            .get(&change.order_id)
            .ok_or_else(|| DomainError::not_found("Order", change.order_id))?;
        if order.status != change.from {
            return Err(status_conflict(order, change));
        }
        for entry in &change.restock {
            if !state.products.contains_key(&entry.product_id) {
                return Err(DomainError::not_found("Product", entry.product_id).into());
            }
        }

        for entry in &change.restock {
            let product = state.product_mut(entry.product_id)?;
            product.stock_quantity += entry.quantity;
            product.updated_at = change.at;
            state.ledger.push(entry.clone());
        }

        let order = state
            .orders
            .get_mut(&change.order_id)
            .ok_or_else(|| DomainError::not_found("Order", change.order_id))?;
        order.status = change.to;
        order.updated_at = change.at;
        Ok(order.clone())
    }

    async fn update_payment_status(
        &self,
        order_id: OrderId,
        expected: PaymentStatus,
        next: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| DomainError::not_found("Order", order_id))?;
        if order.payment_status != expected {
            return Err(StoreError::conflict(
                "Order",
                order_id,
                format!("payment status moved from {expected} to {}", order.payment_status),
            ));
        }
        order.payment_status = next;
        order.updated_at = at;
        Ok(order.clone())
    }
}
