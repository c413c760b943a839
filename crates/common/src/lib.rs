//! Shared identifiers and value types used across the storefront crates.

pub mod ids;
pub mod money;
pub mod version;

pub use ids::{CartId, CartItemId, CouponId, InventoryLogId, OrderId, ProductId, UserId};
pub use money::Money;
pub use version::Version;
