//! Caller identity from trusted request headers.

use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use domain::{Actor, Role};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The caller, as asserted by the upstream gateway.
///
/// `x-user-id` is required; `x-user-role` defaults to `customer`.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {USER_ID_HEADER} header")))?;
        let user_id = UserId::from_str(user_id)
            .map_err(|e| ApiError::BadRequest(format!("Invalid {USER_ID_HEADER}: {e}")))?;

        let role = match header(parts, USER_ROLE_HEADER)? {
            Some(role) => Role::from_str(role)?,
            None => Role::Customer,
        };

        Ok(Identity(Actor { user_id, role }))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(str::trim)
                .map_err(|_| ApiError::BadRequest(format!("{name} is not valid text")))
        })
        .transpose()
}
