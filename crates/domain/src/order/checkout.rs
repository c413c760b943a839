//! Turning a cart into an order plan.
//!
//! [`plan_checkout`] is pure: it prices a snapshot of the cart and decides
//! everything that can be decided without locks. The store then commits the
//! plan atomically, re-checking stock, product versions, coupon usage and the
//! cart version under its own locks, and assigns the order number.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{CartId, CouponId, Money, OrderId, ProductId, UserId, Version};
use serde::Deserialize;

use super::aggregate::Order;
use super::pricing::{OrderTotals, PricingPolicy};
use super::state::{OrderStatus, PaymentStatus};
use super::value_objects::{OrderItem, OrderNumber, PaymentMethod, ShippingAddress};
use crate::cart::Cart;
use crate::coupon::{Coupon, CouponUsage};
use crate::error::{CouponRejection, DomainError};
use crate::inventory::InventoryLogEntry;
use crate::product::Product;

/// Maximum length of free-text order notes.
pub const MAX_NOTES_LEN: usize = 1000;

/// Checkout details supplied by the customer.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Snapshot the plan is computed from.
pub struct CheckoutInput<'a> {
    pub user_id: UserId,
    pub cart: &'a Cart,
    pub products: &'a HashMap<ProductId, Product>,
    pub coupon: Option<&'a Coupon>,
    pub coupon_uses_by_user: u32,
    pub policy: &'a PricingPolicy,
    pub now: DateTime<Utc>,
}

/// One priced line, pinned to the product version it was priced at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub product_version: Version,
    pub quantity: u32,
    pub unit_price: Money,
}

/// The coupon redemption the commit must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRedemption {
    pub coupon_id: CouponId,
    pub coupon_version: Version,
    pub code: String,
    pub usage_limit: Option<u32>,
    pub per_user_limit: Option<u32>,
}

impl PlannedRedemption {
    /// Re-checks limits against counts read under the coupon lock.
    pub fn check_limits(&self, used_count: u32, uses_by_user: u32) -> Result<(), CouponRejection> {
        if self.usage_limit.is_some_and(|limit| used_count >= limit) {
            return Err(CouponRejection::UsageLimitReached);
        }
        if self.per_user_limit.is_some_and(|limit| uses_by_user >= limit) {
            return Err(CouponRejection::PerUserLimitReached);
        }
        Ok(())
    }
}

/// Everything needed to commit an order, minus its number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPlan {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub cart_id: CartId,
    pub cart_version: Version,
    /// Sorted by product id, the order in which product rows are locked.
    pub lines: Vec<PlannedLine>,
    pub redemption: Option<PlannedRedemption>,
    pub totals: OrderTotals,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub placed_at: DateTime<Utc>,
}

impl CheckoutPlan {
    /// Calendar day whose sequence the order number is drawn from.
    pub fn order_day(&self) -> chrono::NaiveDate {
        self.placed_at.date_naive()
    }

    /// One SALE entry per line, each reasoned by the order number.
    pub fn sale_entries(&self, order_number: &OrderNumber) -> Vec<InventoryLogEntry> {
        self.lines
            .iter()
            .map(|line| {
                InventoryLogEntry::sale(
                    line.product_id,
                    line.quantity,
                    order_number.as_str(),
                    self.placed_at,
                )
            })
            .collect()
    }

    pub fn coupon_usage(&self) -> Option<CouponUsage> {
        self.redemption.as_ref().map(|r| CouponUsage {
            coupon_id: r.coupon_id,
            user_id: self.user_id,
            order_id: self.order_id,
            used_at: self.placed_at,
        })
    }

    /// Builds the order record once a number has been assigned.
    pub fn to_order(&self, order_number: OrderNumber) -> Order {
        Order {
            id: self.order_id,
            order_number,
            user_id: self.user_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            items: self
                .lines
                .iter()
                .map(|line| OrderItem {
                    product_id: line.product_id,
                    product_name: line.product_name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
                .collect(),
            subtotal: self.totals.subtotal,
            discount: self.totals.discount,
            shipping_cost: self.totals.shipping_cost,
            tax: self.totals.tax,
            total: self.totals.total,
            coupon_id: self.redemption.as_ref().map(|r| r.coupon_id),
            coupon_code: self.redemption.as_ref().map(|r| r.code.clone()),
            shipping_address: self.shipping_address.clone(),
            payment_method: self.payment_method,
            notes: self.notes.clone(),
            created_at: self.placed_at,
            updated_at: self.placed_at,
        }
    }
}

/// Prices the cart and validates everything checkable without locks.
///
/// An attached coupon that no longer applies fails the checkout rather than
/// being silently dropped.
pub fn plan_checkout(
    input: CheckoutInput<'_>,
    request: &CheckoutRequest,
) -> Result<CheckoutPlan, DomainError> {
    let CheckoutInput {
        user_id,
        cart,
        products,
        coupon,
        coupon_uses_by_user,
        policy,
        now,
    } = input;

    if cart.user_id != user_id {
        return Err(DomainError::Unauthorized(
            "cart belongs to another user".to_string(),
        ));
    }
    if cart.is_empty() {
        return Err(DomainError::CartEmpty);
    }
    let shipping_address = request.shipping_address.normalized()?;
    let notes = match request.notes.as_deref().map(str::trim) {
        Some(n) if n.len() > MAX_NOTES_LEN => {
            return Err(DomainError::validation("notes", "too long"));
        }
        Some("") | None => None,
        Some(n) => Some(n.to_string()),
    };

    let mut lines = Vec::with_capacity(cart.items.len());
    for item in &cart.items {
        let product = products
            .get(&item.product_id)
            .ok_or_else(|| DomainError::not_found("Product", item.product_id))?;
        product.ensure_available(item.quantity)?;
        lines.push(PlannedLine {
            product_id: product.id,
            product_name: product.name.clone(),
            product_version: product.version,
            quantity: item.quantity,
            unit_price: product.unit_price(),
        });
    }
    lines.sort_by_key(|l| l.product_id);

    let subtotal: Money = lines.iter().map(|l| l.unit_price.multiply(l.quantity)).sum();

    let (discount, free_shipping, redemption) = match cart.coupon_id {
        None => (Money::zero(), false, None),
        Some(coupon_id) => {
            let coupon = coupon
                .filter(|c| c.id == coupon_id)
                .ok_or(CouponRejection::NotFound)?;
            let discount = coupon.evaluate(now, subtotal, coupon_uses_by_user)?;
            let redemption = PlannedRedemption {
                coupon_id: coupon.id,
                coupon_version: coupon.version,
                code: coupon.code.clone(),
                usage_limit: coupon.usage_limit,
                per_user_limit: coupon.per_user_limit,
            };
            (discount, coupon.is_free_shipping(), Some(redemption))
        }
    };

    Ok(CheckoutPlan {
        order_id: OrderId::new(),
        user_id,
        cart_id: cart.id,
        cart_version: cart.version,
        lines,
        redemption,
        totals: policy.totals(subtotal, discount, free_shipping),
        shipping_address,
        payment_method: request.payment_method,
        notes,
        placed_at: now,
    })
}
