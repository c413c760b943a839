//! The caller identity handed to every core operation.
//!
//! Authentication happens upstream; the core trusts the id and role it is
//! given and only performs ownership and role checks.

use common::UserId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Role of the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            other => Err(DomainError::validation(
                "role",
                format!("unknown role '{other}'"),
            )),
        }
    }
}

/// The authenticated user performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn customer(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Customer,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fails unless the actor is an administrator.
    pub fn require_admin(&self) -> Result<(), DomainError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::Unauthorized(
                "administrator role required".to_string(),
            ))
        }
    }

    /// Fails unless the actor owns the resource or is an administrator.
    pub fn require_owner_or_admin(&self, owner: UserId) -> Result<(), DomainError> {
        if self.user_id == owner || self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::Unauthorized(
                "resource belongs to another user".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn parses_roles() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" Customer ".parse::<Role>().unwrap(), Role::Customer);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn ownership_checks() {
        let owner = UserId::new();
        let customer = Actor::customer(owner);
        let stranger = Actor::customer(UserId::new());
        let admin = Actor::admin(UserId::new());

        assert!(customer.require_owner_or_admin(owner).is_ok());
        assert!(admin.require_owner_or_admin(owner).is_ok());
        let err = stranger.require_owner_or_admin(owner).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(customer.require_admin().is_err());
    }
}
