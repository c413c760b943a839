//! Domain error types.
//!
//! Every business-rule failure is one of a closed set of variants. Callers that
//! need to branch on the failure (HTTP mapping, batch reports, retry policy)
//! inspect [`DomainError::kind`], never the rendered message.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{OrderStatus, PaymentStatus};

/// Coarse classification of a [`DomainError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or out-of-range input.
    Validation,
    /// A referenced entity does not exist.
    NotFound,
    /// Insufficient or unavailable stock.
    Stock,
    /// The coupon cannot be used.
    Coupon,
    /// The actor may not act on the resource.
    Authorization,
    /// Illegal order or payment status change.
    StateTransition,
    /// A uniqueness or concurrent-modification conflict.
    Conflict,
}

impl ErrorKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Stock => "stock",
            ErrorKind::Coupon => "coupon",
            ErrorKind::Authorization => "authorization",
            ErrorKind::StateTransition => "state_transition",
            ErrorKind::Conflict => "conflict",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a coupon was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CouponRejection {
    #[error("coupon not found")]
    NotFound,

    #[error("coupon is not active")]
    Inactive,

    #[error("coupon is not yet valid")]
    NotYetValid,

    #[error("coupon has expired")]
    Expired,

    #[error("usage limit reached")]
    UsageLimitReached,

    #[error("minimum purchase of {minimum} not met")]
    MinimumPurchaseNotMet { minimum: Money },

    #[error("per-user usage limit reached")]
    PerUserLimitReached,
}

/// Errors raised by business rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Input failed validation.
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Checkout was attempted with an empty cart.
    #[error("Cart is empty")]
    CartEmpty,

    /// Not enough stock to satisfy the request.
    #[error(
        "insufficient stock for {product_name} ({product_id}): {available} available, {requested} requested"
    )]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        available: i64,
        requested: i64,
    },

    /// The product is inactive and cannot be sold.
    #[error("Product {product_name} ({product_id}) is not available")]
    ProductUnavailable {
        product_id: ProductId,
        product_name: String,
    },

    /// The coupon cannot be applied.
    #[error("Coupon rejected: {0}")]
    Coupon(CouponRejection),

    /// The actor may not perform the action.
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Illegal order status change.
    #[error("Invalid state transition: cannot move order from {from} to {to}")]
    InvalidStateTransition { from: OrderStatus, to: OrderStatus },

    /// Illegal payment status change.
    #[error("Invalid payment status transition: cannot move payment from {from} to {to}")]
    InvalidPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// Unique constraint or concurrent-modification conflict.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    /// Shorthand for a validation failure.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        DomainError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Shorthand for a missing entity.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the classification used for routing and reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation { .. } | DomainError::CartEmpty => ErrorKind::Validation,
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::InsufficientStock { .. } | DomainError::ProductUnavailable { .. } => {
                ErrorKind::Stock
            }
            DomainError::Coupon(_) => ErrorKind::Coupon,
            DomainError::Unauthorized(_) => ErrorKind::Authorization,
            DomainError::InvalidStateTransition { .. }
            | DomainError::InvalidPaymentTransition { .. } => ErrorKind::StateTransition,
            DomainError::Conflict(_) => ErrorKind::Conflict,
        }
    }
}

impl From<CouponRejection> for DomainError {
    fn from(rejection: CouponRejection) -> Self {
        DomainError::Coupon(rejection)
    }
}
