//! Order totals.

use common::Money;
use serde::{Deserialize, Serialize};

/// Flat shipping and tax configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub shipping_cost: Money,
    /// Tax rate in basis points (1000 = 10%).
    pub tax_rate_bps: u32,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            shipping_cost: Money::from_cents(1000),
            tax_rate_bps: 1000,
        }
    }
}

/// Monetary breakdown of an order.
///
/// `total == subtotal - discount + shipping_cost + tax` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub shipping_cost: Money,
    pub tax: Money,
    pub total: Money,
}

impl PricingPolicy {
    /// Computes the breakdown. The discount is clamped to `[0, subtotal]`.
    pub fn totals(&self, subtotal: Money, discount: Money, free_shipping: bool) -> OrderTotals {
        let subtotal = subtotal.max(Money::zero());
        let discount = discount.clamp(Money::zero(), subtotal);
        let taxable = subtotal - discount;
        let shipping_cost = if free_shipping {
            Money::zero()
        } else {
            self.shipping_cost
        };
        let tax = taxable.basis_points(self.tax_rate_bps);
        OrderTotals {
            subtotal,
            discount,
            shipping_cost,
            tax,
            total: taxable + shipping_cost + tax,
        }
    }
}
