//! Domain layer for the storefront backend.
//!
//! Pure business rules, free of I/O:
//! - catalog products and the append-only inventory ledger
//! - the per-user cart and its checkout-readiness report
//! - coupon eligibility and discount computation
//! - checkout planning, pricing and the order/payment state machines
//!
//! Persistence and atomicity live in the `store` crate; this crate only
//! decides what a commit must do.

pub mod batch;
pub mod cart;
pub mod coupon;
pub mod error;
pub mod identity;
pub mod inventory;
pub mod order;
pub mod product;

pub use batch::{BatchFailure, BatchReport};
pub use cart::{MAX_LINE_QUANTITY, Cart, CartItem, CartLine, CartSummary, CartView, CheckoutProblem, GuestCartItem};
pub use coupon::{Coupon, CouponUsage, CouponValidation, DiscountRule, NewCoupon};
pub use error::{CouponRejection, DomainError, ErrorKind};
pub use identity::{Actor, Role};
pub use inventory::{
    Discrepancy, DiscrepancyReport, InventoryLogEntry, LedgerEntryType, MovementSummary,
    MAX_STOCK_QUANTITY, PhysicalCount, StockAdjustment, StockAudit, StockMovement, replay,
    validate_counts,
};
pub use order::{
    CheckoutInput, CheckoutPlan, CheckoutRequest, Order, OrderItem, OrderNumber, OrderStatus,
    OrderTotals, PaymentMethod, PaymentStatus, PlannedLine, PlannedRedemption, PricingPolicy,
    ShippingAddress, StatusChange, plan_checkout,
};
pub use product::{MAX_PRICE, NewProduct, Product, ProductUpdate};
