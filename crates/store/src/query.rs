//! Typed query specifications for read operations.

use chrono::{DateTime, Utc};
use common::{ProductId, UserId};
use domain::{InventoryLogEntry, LedgerEntryType, Order, OrderStatus, Product};

/// Filters over the inventory ledger. Results are in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerQuery {
    /// Filter by product.
    pub product_id: Option<ProductId>,

    /// Filter by entry types (any of these types).
    pub entry_types: Option<Vec<LedgerEntryType>>,

    /// Entries created at or after this time.
    pub from: Option<DateTime<Utc>>,

    /// Entries created at or before this time.
    pub to: Option<DateTime<Utc>>,

    /// Maximum number of entries to return.
    pub limit: Option<usize>,

    /// Number of entries to skip.
    pub offset: Option<usize>,
}

impl LedgerQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry of one product, from its first.
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    pub fn entry_types(mut self, entry_types: Vec<LedgerEntryType>) -> Self {
        self.entry_types = Some(entry_types);
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Filter predicate, ignoring paging.
    pub fn matches(&self, entry: &InventoryLogEntry) -> bool {
        self.product_id.is_none_or(|id| entry.product_id == id)
            && self
                .entry_types
                .as_ref()
                .is_none_or(|types| types.contains(&entry.entry_type))
            && self.from.is_none_or(|from| entry.created_at >= from)
            && self.to.is_none_or(|to| entry.created_at <= to)
    }
}

/// Filters over orders. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.is_none_or(|id| order.user_id == id)
            && self.status.is_none_or(|s| order.status == s)
            && self.from.is_none_or(|from| order.created_at >= from)
            && self.to.is_none_or(|to| order.created_at <= to)
    }
}

/// Filters over the catalog. Results are ordered by SKU.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
    /// Only products that can currently be sold.
    pub active_only: bool,

    /// Only products with at most this many units in stock.
    pub max_stock: Option<i64>,

    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ProductQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active products at or below `threshold` units.
    pub fn low_stock(threshold: i64) -> Self {
        Self {
            active_only: true,
            max_stock: Some(threshold),
            ..Default::default()
        }
    }

    pub fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn matches(&self, product: &Product) -> bool {
        (!self.active_only || product.is_active)
            && self.max_stock.is_none_or(|max| product.stock_quantity <= max)
    }
}

/// Applies offset and limit to an already filtered, ordered sequence.
pub(crate) fn paginate<T>(
    items: impl Iterator<Item = T>,
    offset: Option<usize>,
    limit: Option<usize>,
) -> Vec<T> {
    items
        .skip(offset.unwrap_or(0))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}
