//! Catalog products.

use chrono::{DateTime, Utc};
use common::{Money, ProductId, Version};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::inventory::{
    InventoryLogEntry, LedgerEntryType, MAX_STOCK_QUANTITY, OPENING_STOCK_REASON,
};

/// Highest regular price a product may carry.
pub const MAX_PRICE: Money = Money::from_dollars(1_000_000);

/// A sellable catalog product.
///
/// `stock_quantity` is only ever changed through ledger-writing operations.
/// `version` tracks catalog edits (name, price, sale price, active flag) and
/// is deliberately left alone by stock movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub stock_quantity: i64,
    pub is_active: bool,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Price charged per unit right now: the sale price when set.
    pub fn unit_price(&self) -> Money {
        self.sale_price.unwrap_or(self.price)
    }

    /// Fails unless the product is active and at least `requested` units are in stock.
    pub fn ensure_available(&self, requested: u32) -> Result<(), DomainError> {
        if !self.is_active {
            return Err(DomainError::ProductUnavailable {
                product_id: self.id,
                product_name: self.name.clone(),
            });
        }
        if self.stock_quantity < i64::from(requested) {
            return Err(DomainError::InsufficientStock {
                product_id: self.id,
                product_name: self.name.clone(),
                available: self.stock_quantity,
                requested: i64::from(requested),
            });
        }
        Ok(())
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub price: Money,
    #[serde(default)]
    pub sale_price: Option<Money>,
    #[serde(default)]
    pub initial_stock: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewProduct {
    /// Validates the input and builds the product plus its opening ledger entry.
    ///
    /// Opening stock is recorded as a RESTOCK entry so that the ledger replays
    /// to the stored quantity from the very first entry.
    pub fn into_product(
        self,
        now: DateTime<Utc>,
    ) -> Result<(Product, Option<InventoryLogEntry>), DomainError> {
        let sku = self.sku.trim().to_uppercase();
        if sku.is_empty() {
            return Err(DomainError::validation("sku", "must not be empty"));
        }
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("name", "must not be empty"));
        }
        validate_prices(self.price, self.sale_price)?;
        if self.initial_stock < 0 {
            return Err(DomainError::validation(
                "initial_stock",
                "must not be negative",
            ));
        }
        if self.initial_stock > MAX_STOCK_QUANTITY {
            return Err(DomainError::validation(
                "initial_stock",
                format!("must not exceed {MAX_STOCK_QUANTITY}"),
            ));
        }

        let product = Product {
            id: ProductId::new(),
            sku,
            name,
            price: self.price,
            sale_price: self.sale_price,
            stock_quantity: self.initial_stock,
            is_active: self.is_active,
            version: Version::first(),
            created_at: now,
            updated_at: now,
        };

        let opening = if self.initial_stock > 0 {
            Some(InventoryLogEntry::new(
                product.id,
                LedgerEntryType::Restock,
                self.initial_stock,
                OPENING_STOCK_REASON,
                now,
            )?)
        } else {
            None
        };

        Ok((product, opening))
    }
}

/// Catalog edit. Stock is not editable here; use a stock adjustment.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub price: Option<Money>,
    /// `Some(None)` clears the sale price.
    pub sale_price: Option<Option<Money>>,
    pub is_active: Option<bool>,
}

impl ProductUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.price.is_none()
            && self.sale_price.is_none()
            && self.is_active.is_none()
    }

    /// Applies the edit to a copy of `product`, leaving version bumping to the store.
    pub fn apply(&self, product: &Product, now: DateTime<Utc>) -> Result<Product, DomainError> {
        let mut updated = product.clone();
        if let Some(name) = &self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DomainError::validation("name", "must not be empty"));
            }
            updated.name = name.to_string();
        }
        if let Some(price) = self.price {
            updated.price = price;
        }
        if let Some(sale_price) = self.sale_price {
            updated.sale_price = sale_price;
        }
        if let Some(is_active) = self.is_active {
            updated.is_active = is_active;
        }
        validate_prices(updated.price, updated.sale_price)?;
        updated.updated_at = now;
        Ok(updated)
    }
}

fn validate_prices(price: Money, sale_price: Option<Money>) -> Result<(), DomainError> {
    if !price.is_positive() {
        return Err(DomainError::validation("price", "must be greater than 0"));
    }
    if price > MAX_PRICE {
        return Err(DomainError::validation(
            "price",
            format!("must not exceed {MAX_PRICE}"),
        ));
    }
    if let Some(sale) = sale_price {
        if !sale.is_positive() {
            return Err(DomainError::validation(
                "sale_price",
                "must be greater than 0",
            ));
        }
        if sale >= price {
            return Err(DomainError::validation(
                "sale_price",
                "must be lower than the regular price",
            ));
        }
    }
    Ok(())
}
