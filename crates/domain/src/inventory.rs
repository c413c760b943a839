//! Inventory ledger: the append-only record of every stock movement.
//!
//! Each entry carries a signed delta. Replaying all entries of a product from
//! its first entry yields the product's current `stock_quantity`; every write
//! path in the store keeps the two in lockstep.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{InventoryLogId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::product::Product;

/// Reason recorded for stock returned by an order cancellation.
pub const CANCELLATION_REASON: &str = "order cancelled";

/// Reason recorded for the stock a product is created with.
pub const OPENING_STOCK_REASON: &str = "initial stock";

/// Largest stock level, and largest single movement, the ledger accepts.
pub const MAX_STOCK_QUANTITY: i64 = 1_000_000_000;

/// Reason recorded for reconciliation adjustments.
pub const RECONCILIATION_REASON: &str = "inventory reconciliation";

/// Type of a ledger entry, which also fixes the sign of its quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryType {
    /// Goods received. Positive.
    Restock,
    /// Goods sold. Negative.
    Sale,
    /// Goods returned to stock. Positive.
    Return,
    /// Goods written off. Negative.
    Damaged,
    /// Correction in either direction.
    Adjustment,
}

impl LedgerEntryType {
    pub const ALL: [LedgerEntryType; 5] = [
        LedgerEntryType::Restock,
        LedgerEntryType::Sale,
        LedgerEntryType::Return,
        LedgerEntryType::Damaged,
        LedgerEntryType::Adjustment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::Restock => "RESTOCK",
            LedgerEntryType::Sale => "SALE",
            LedgerEntryType::Return => "RETURN",
            LedgerEntryType::Damaged => "DAMAGED",
            LedgerEntryType::Adjustment => "ADJUSTMENT",
        }
    }

    /// Checks the quantity against the sign rule for this entry type and
    /// against [`MAX_STOCK_QUANTITY`].
    pub fn validate_quantity(&self, quantity: i64) -> Result<(), DomainError> {
        if quantity.unsigned_abs() > MAX_STOCK_QUANTITY.unsigned_abs() {
            return Err(DomainError::validation(
                "quantity",
                format!("magnitude must not exceed {MAX_STOCK_QUANTITY}, got {quantity}"),
            ));
        }
        let ok = match self {
            LedgerEntryType::Restock | LedgerEntryType::Return => quantity > 0,
            LedgerEntryType::Sale | LedgerEntryType::Damaged => quantity < 0,
            LedgerEntryType::Adjustment => quantity != 0,
        };
        if ok {
            Ok(())
        } else {
            let rule = match self {
                LedgerEntryType::Restock | LedgerEntryType::Return => "must be positive",
                LedgerEntryType::Sale | LedgerEntryType::Damaged => "must be negative",
                LedgerEntryType::Adjustment => "must not be zero",
            };
            Err(DomainError::validation(
                "quantity",
                format!("{} quantity {rule}, got {quantity}", self.as_str()),
            ))
        }
    }
}

impl std::fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LedgerEntryType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LedgerEntryType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                DomainError::validation("type", format!("unknown ledger entry type '{s}'"))
            })
    }
}

/// One immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLogEntry {
    pub id: InventoryLogId,
    pub product_id: ProductId,
    pub entry_type: LedgerEntryType,
    /// Signed stock delta.
    pub quantity: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl InventoryLogEntry {
    /// Builds an entry, enforcing the sign rule of `entry_type`.
    pub fn new(
        product_id: ProductId,
        entry_type: LedgerEntryType,
        quantity: i64,
        reason: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        entry_type.validate_quantity(quantity)?;
        Ok(Self {
            id: InventoryLogId::new(),
            product_id,
            entry_type,
            quantity,
            reason: reason.into(),
            created_at,
        })
    }

    pub(crate) fn sale(
        product_id: ProductId,
        quantity: u32,
        order_number: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InventoryLogId::new(),
            product_id,
            entry_type: LedgerEntryType::Sale,
            quantity: -i64::from(quantity),
            reason: order_number.to_string(),
            created_at: at,
        }
    }

    pub(crate) fn cancellation_return(product_id: ProductId, quantity: u32, at: DateTime<Utc>) -> Self {
        Self {
            id: InventoryLogId::new(),
            product_id,
            entry_type: LedgerEntryType::Return,
            quantity: i64::from(quantity),
            reason: CANCELLATION_REASON.to_string(),
            created_at: at,
        }
    }
}

/// Sums the deltas of a product's entries.
pub fn replay<'a>(entries: impl IntoIterator<Item = &'a InventoryLogEntry>) -> i64 {
    entries.into_iter().map(|e| e.quantity).sum()
}

/// A requested manual stock movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    /// Signed delta; its sign must agree with `entry_type`.
    pub quantity: i64,
    #[serde(rename = "type")]
    pub entry_type: LedgerEntryType,
    pub reason: String,
}

impl StockAdjustment {
    /// Checks the sign rule and the reason.
    pub fn validate(&self) -> Result<(), DomainError> {
        self.entry_type.validate_quantity(self.quantity)?;
        if self.reason.trim().is_empty() {
            return Err(DomainError::validation("reason", "must not be empty"));
        }
        Ok(())
    }

    /// Computes the product's stock after the movement, refusing to go below
    /// zero or above [`MAX_STOCK_QUANTITY`].
    pub fn resulting_stock(&self, product: &Product) -> Result<i64, DomainError> {
        let next = product
            .stock_quantity
            .checked_add(self.quantity)
            .filter(|next| *next <= MAX_STOCK_QUANTITY)
            .ok_or_else(|| {
                DomainError::validation(
                    "quantity",
                    format!(
                        "stock of product {} would exceed {MAX_STOCK_QUANTITY}",
                        product.id
                    ),
                )
            })?;
        if next < 0 {
            return Err(DomainError::InsufficientStock {
                product_id: product.id,
                product_name: product.name.clone(),
                available: product.stock_quantity,
                requested: -self.quantity,
            });
        }
        Ok(next)
    }

    /// Builds the ledger entry recording this movement.
    pub fn to_entry(&self, at: DateTime<Utc>) -> Result<InventoryLogEntry, DomainError> {
        InventoryLogEntry::new(
            self.product_id,
            self.entry_type,
            self.quantity,
            self.reason.trim(),
            at,
        )
    }
}

/// Result of a stock movement: the product after the write and its ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockMovement {
    pub product: Product,
    pub log_entry: InventoryLogEntry,
}

/// A physically counted quantity supplied for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalCount {
    pub product_id: ProductId,
    pub actual_quantity: i64,
}

impl PhysicalCount {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.actual_quantity < 0 {
            return Err(DomainError::validation(
                "actual_quantity",
                format!(
                    "count for product {} must not be negative",
                    self.product_id
                ),
            ));
        }
        if self.actual_quantity > MAX_STOCK_QUANTITY {
            return Err(DomainError::validation(
                "actual_quantity",
                format!(
                    "count for product {} must not exceed {MAX_STOCK_QUANTITY}",
                    self.product_id
                ),
            ));
        }
        Ok(())
    }
}

/// A mismatch between recorded and counted stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub product_id: ProductId,
    pub product_name: String,
    pub system_quantity: i64,
    pub actual_quantity: i64,
    /// `actual - system`; the ADJUSTMENT delta written for this product.
    pub difference: i64,
}

impl Discrepancy {
    /// Returns the discrepancy for `product`, or `None` when the count matches.
    pub fn between(product: &Product, actual_quantity: i64) -> Option<Self> {
        let difference = actual_quantity - product.stock_quantity;
        (difference != 0).then(|| Discrepancy {
            product_id: product.id,
            product_name: product.name.clone(),
            system_quantity: product.stock_quantity,
            actual_quantity,
            difference,
        })
    }

    pub fn to_entry(&self, at: DateTime<Utc>) -> Result<InventoryLogEntry, DomainError> {
        InventoryLogEntry::new(
            self.product_id,
            LedgerEntryType::Adjustment,
            self.difference,
            RECONCILIATION_REASON,
            at,
        )
    }
}

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub products_checked: usize,
    pub discrepancies: Vec<Discrepancy>,
    pub reconciled_at: DateTime<Utc>,
}

impl DiscrepancyReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }

    /// Net stock change written by the run.
    pub fn net_difference(&self) -> i64 {
        self.discrepancies.iter().map(|d| d.difference).sum()
    }
}

/// Validates a batch of counts before any of them is applied.
pub fn validate_counts(counts: &[PhysicalCount]) -> Result<(), DomainError> {
    if counts.is_empty() {
        return Err(DomainError::validation("counts", "must not be empty"));
    }
    let mut seen = std::collections::HashSet::with_capacity(counts.len());
    for count in counts {
        count.validate()?;
        if !seen.insert(count.product_id) {
            return Err(DomainError::validation(
                "counts",
                format!("product {} is counted twice", count.product_id),
            ));
        }
    }
    Ok(())
}

/// Ledger replay compared with the recorded stock of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAudit {
    pub product_id: ProductId,
    pub recorded_quantity: i64,
    pub replayed_quantity: i64,
    pub entry_count: usize,
}

impl StockAudit {
    pub fn new(product: &Product, entries: &[InventoryLogEntry]) -> Self {
        Self {
            product_id: product.id,
            recorded_quantity: product.stock_quantity,
            replayed_quantity: replay(entries),
            entry_count: entries.len(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.recorded_quantity == self.replayed_quantity
    }
}

/// Per-type totals over a slice of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementSummary {
    pub totals: BTreeMap<LedgerEntryType, i64>,
    pub net_change: i64,
    pub entry_count: usize,
}

impl MovementSummary {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a InventoryLogEntry>) -> Self {
        let mut summary = MovementSummary::default();
        for entry in entries {
            *summary.totals.entry(entry.entry_type).or_default() += entry.quantity;
            summary.net_change += entry.quantity;
            summary.entry_count += 1;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use common::{Money, Version};

    fn product(stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(),
            sku: "SKU-1".to_string(),
            name: "Widget".to_string(),
            price: Money::from_cents(1000),
            sale_price: None,
            stock_quantity: stock,
            is_active: true,
            version: Version::first(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn sign_rules() {
        use LedgerEntryType::*;
        assert!(Restock.validate_quantity(5).is_ok());
        assert!(Restock.validate_quantity(-5).is_err());
        assert!(Return.validate_quantity(0).is_err());
        assert!(Sale.validate_quantity(-1).is_ok());
        assert!(Sale.validate_quantity(1).is_err());
        assert!(Damaged.validate_quantity(2).is_err());
        assert!(Adjustment.validate_quantity(-7).is_ok());
        assert!(Adjustment.validate_quantity(7).is_ok());
        assert!(Adjustment.validate_quantity(0).is_err());
    }

    #[test]
    fn oversized_movements_are_rejected() {
        let err = LedgerEntryType::Restock
            .validate_quantity(i64::MAX)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(LedgerEntryType::Adjustment.validate_quantity(i64::MIN).is_err());
        assert!(LedgerEntryType::Restock
            .validate_quantity(MAX_STOCK_QUANTITY)
            .is_ok());
    }

    #[test]
    fn resulting_stock_cannot_pass_the_ceiling() {
        let p = product(MAX_STOCK_QUANTITY - 1);
        let adjustment = StockAdjustment {
            product_id: p.id,
            quantity: 2,
            entry_type: LedgerEntryType::Restock,
            reason: "delivery".to_string(),
        };
        let err = adjustment.resulting_stock(&p).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        // A corrupt stock level near i64::MAX must not wrap.
        let p = product(i64::MAX);
        assert!(adjustment.resulting_stock(&p).is_err());
    }

    #[test]
    fn counts_above_the_ceiling_are_rejected() {
        let counts = [PhysicalCount {
            product_id: ProductId::new(),
            actual_quantity: MAX_STOCK_QUANTITY + 1,
        }];
        assert_eq!(
            validate_counts(&counts).unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn parses_entry_types() {
        assert_eq!(
            "restock".parse::<LedgerEntryType>().unwrap(),
            LedgerEntryType::Restock
        );
        assert_eq!(
            "DAMAGED".parse::<LedgerEntryType>().unwrap(),
            LedgerEntryType::Damaged
        );
        assert!("LOST".parse::<LedgerEntryType>().is_err());
    }

    #[test]
    fn adjustment_below_zero_is_a_stock_error() {
        let p = product(3);
        let adjustment = StockAdjustment {
            product_id: p.id,
            quantity: -5,
            entry_type: LedgerEntryType::Sale,
            reason: "x".to_string(),
        };
        adjustment.validate().unwrap();
        let err = adjustment.resulting_stock(&p).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Stock);
        assert!(err.to_string().contains("insufficient stock"));
    }

    #[test]
    fn adjustment_requires_reason() {
        let adjustment = StockAdjustment {
            product_id: ProductId::new(),
            quantity: 4,
            entry_type: LedgerEntryType::Restock,
            reason: "  ".to_string(),
        };
        assert_eq!(
            adjustment.validate().unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn replay_sums_signed_deltas() {
        let id = ProductId::new();
        let now = Utc::now();
        let entries = vec![
            InventoryLogEntry::new(id, LedgerEntryType::Restock, 10, "in", now).unwrap(),
            InventoryLogEntry::sale(id, 3, "ORD260101-0001", now),
            InventoryLogEntry::cancellation_return(id, 3, now),
            InventoryLogEntry::new(id, LedgerEntryType::Damaged, -2, "broken", now).unwrap(),
        ];
        assert_eq!(replay(&entries), 8);

        let summary = MovementSummary::from_entries(&entries);
        assert_eq!(summary.net_change, 8);
        assert_eq!(summary.entry_count, 4);
        assert_eq!(summary.totals[&LedgerEntryType::Sale], -3);
        assert_eq!(summary.totals[&LedgerEntryType::Return], 3);
    }

    #[test]
    fn discrepancy_only_when_counts_differ() {
        let p = product(10);
        assert!(Discrepancy::between(&p, 10).is_none());
        let d = Discrepancy::between(&p, 7).unwrap();
        assert_eq!(d.difference, -3);
        let entry = d.to_entry(Utc::now()).unwrap();
        assert_eq!(entry.entry_type, LedgerEntryType::Adjustment);
        assert_eq!(entry.quantity, -3);
        assert_eq!(entry.reason, RECONCILIATION_REASON);
    }

    #[test]
    fn counts_are_validated_as_a_batch() {
        let id = ProductId::new();
        assert!(validate_counts(&[]).is_err());
        assert!(
            validate_counts(&[PhysicalCount {
                product_id: id,
                actual_quantity: -1
            }])
            .is_err()
        );
        let twice = [
            PhysicalCount {
                product_id: id,
                actual_quantity: 1,
            },
            PhysicalCount {
                product_id: id,
                actual_quantity: 2,
            },
        ];
        assert!(validate_counts(&twice).is_err());
    }

    #[test]
    fn audit_detects_drift() {
        let p = product(5);
        let entries =
            vec![InventoryLogEntry::new(p.id, LedgerEntryType::Restock, 5, "in", Utc::now()).unwrap()];
        assert!(StockAudit::new(&p, &entries).is_consistent());
        assert!(!StockAudit::new(&product(6), &entries).is_consistent());
    }
}
