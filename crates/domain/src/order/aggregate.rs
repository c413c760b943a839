//! The placed order and its post-creation lifecycle.

use chrono::{DateTime, Utc};
use common::{CouponId, Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::pricing::OrderTotals;
use super::state::{OrderStatus, PaymentStatus};
use super::value_objects::{OrderItem, OrderNumber, PaymentMethod, ShippingAddress};
use crate::error::DomainError;
use crate::identity::Actor;
use crate::inventory::InventoryLogEntry;

/// An order. Everything except `status` and `payment_status` is frozen at
/// checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub shipping_cost: Money,
    pub tax: Money,
    pub total: Money,
    pub coupon_id: Option<CouponId>,
    pub coupon_code: Option<String>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated status change, with the stock it returns when cancelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// One RETURN entry per order item when `to` is `Cancelled`, else empty.
    pub restock: Vec<InventoryLogEntry>,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    pub fn is_cancellation(&self) -> bool {
        self.to == OrderStatus::Cancelled
    }
}

impl Order {
    pub fn totals(&self) -> OrderTotals {
        OrderTotals {
            subtotal: self.subtotal,
            discount: self.discount,
            shipping_cost: self.shipping_cost,
            tax: self.tax,
            total: self.total,
        }
    }

    /// Total units across all items.
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Ledger entries that return every item to stock.
    pub fn restock_entries(&self, at: DateTime<Utc>) -> Vec<InventoryLogEntry> {
        self.items
            .iter()
            .map(|item| InventoryLogEntry::cancellation_return(item.product_id, item.quantity, at))
            .collect()
    }

    /// Cancellation requested by the owner (or an admin acting for them).
    pub fn plan_cancellation(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, DomainError> {
        actor.require_owner_or_admin(self.user_id)?;
        if !actor.is_admin() && !self.status.is_customer_cancellable() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: OrderStatus::Cancelled,
            });
        }
        self.plan_transition(OrderStatus::Cancelled, now)
    }

    /// Administrative status change. Moving to `Cancelled` returns stock.
    pub fn plan_status_change(
        &self,
        actor: &Actor,
        next: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, DomainError> {
        actor.require_admin()?;
        self.plan_transition(next, now)
    }

    fn plan_transition(
        &self,
        next: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, DomainError> {
        let to = self.status.transition_to(next)?;
        let restock = if to == OrderStatus::Cancelled {
            self.restock_entries(now)
        } else {
            Vec::new()
        };
        Ok(StatusChange {
            order_id: self.id,
            from: self.status,
            to,
            restock,
            at: now,
        })
    }

    /// Administrative payment status change.
    pub fn plan_payment_status_change(
        &self,
        actor: &Actor,
        next: PaymentStatus,
    ) -> Result<PaymentStatus, DomainError> {
        actor.require_admin()?;
        self.payment_status.transition_to(next)
    }
}
