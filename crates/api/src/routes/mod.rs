//! HTTP route handlers.

pub mod cart;
pub mod coupons;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;
pub mod products;

use std::str::FromStr;

use checkout::Storefront;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub storefront: Storefront<S>,
}

/// Parses a path segment into a typed id.
pub(crate) fn parse_id<T>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what} id: {e}")))
}
