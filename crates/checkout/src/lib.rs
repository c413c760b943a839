//! Storefront services.
//!
//! Each service owns a handle to a [`store::Store`] and drives one area of
//! the storefront: [`CartService`] for carts, [`CouponService`] for coupon
//! previews and administration, [`InventoryService`] for the catalog and the
//! stock ledger, and [`OrderService`] for checkout and the order lifecycle.
//!
//! Services load state, apply the pure rules from `domain`, and commit through
//! the store. Units of work that lose a race are retried with a bounded
//! [`RetryPolicy`]; business-rule failures are returned as they are.

pub mod cart;
pub mod coupon;
pub mod error;
pub mod inventory;
pub mod order;
pub mod retry;

pub use cart::CartService;
pub use coupon::CouponService;
pub use error::{Result, ServiceError};
pub use inventory::InventoryService;
pub use order::OrderService;
pub use retry::RetryPolicy;

use domain::PricingPolicy;
use store::Store;

/// Every service over one shared store.
#[derive(Clone)]
pub struct Storefront<S> {
    pub carts: CartService<S>,
    pub coupons: CouponService<S>,
    pub inventory: InventoryService<S>,
    pub orders: OrderService<S>,
}

impl<S: Store + Clone> Storefront<S> {
    pub fn new(store: S, policy: PricingPolicy, retry: RetryPolicy) -> Self {
        Self {
            carts: CartService::new(store.clone(), retry),
            coupons: CouponService::new(store.clone(), retry),
            inventory: InventoryService::new(store.clone(), retry),
            orders: OrderService::new(store, policy, retry),
        }
    }
}
