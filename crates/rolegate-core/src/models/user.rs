//! User domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RolegateError;

/// Authorization tier of a user.
///
/// Variants are declared lowest first so the derived ordering gives
/// `User < Admin < RootAdmin`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
    RootAdmin,
}

impl Role {
    /// Stored representation (`USER`, `ADMIN`, `ROOTADMIN`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
            Role::RootAdmin => "ROOTADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RolegateError;

    /// Case-insensitive, matching how roles arrive from the identity layer.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            "ROOTADMIN" => Ok(Role::RootAdmin),
            other => Err(RolegateError::validation(format!("unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    /// Reference to the avatar blob held by the file storage collaborator.
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub avatar_url: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_totally_ordered() {
        assert!(Role::RootAdmin > Role::Admin);
        assert!(Role::Admin > Role::User);
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("rootadmin".parse::<Role>().unwrap(), Role::RootAdmin);
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::User.as_str().parse::<Role>().unwrap(), Role::User);
        assert!("superuser".parse::<Role>().is_err());
    }
}
