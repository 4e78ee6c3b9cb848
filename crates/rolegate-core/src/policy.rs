//! Role hierarchy policy evaluator.
//!
//! A pure decision function over an actor, a target user, an action and an
//! optional requested role. Every user-scoped use case goes through
//! [`authorize`] before any mutation happens.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::{Role, User};

/// A verified caller, as handed over by the identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
        }
    }
}

/// The user an action is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub id: Uuid,
    pub role: Role,
}

impl From<&User> for Target {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Update,
    Delete,
    AssignRole,
    /// Read another user's groups or effective permissions.
    Inspect,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::Update => "update",
            Action::Delete => "delete",
            Action::AssignRole => "assign a role to",
            Action::Inspect => "inspect",
        }
    }
}

/// The rule that rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Denial {
    /// ROOTADMIN is never assignable, whoever asks.
    RootAdminNotAssignable,
    /// Only a ROOTADMIN may change roles.
    RoleChangeRequiresRootAdmin,
    /// Nobody may set their own role to ADMIN or ROOTADMIN.
    SelfEscalation,
    /// An ADMIN cannot act on ADMIN or ROOTADMIN users.
    AdminTierProtected { action: Action },
    /// The actor may only act on their own account.
    SelfOnly { action: Action },
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::RootAdminNotAssignable => f.write_str("ROOTADMIN role cannot be assigned"),
            Denial::RoleChangeRequiresRootAdmin => f.write_str("only ROOTADMIN can change roles"),
            Denial::SelfEscalation => {
                f.write_str("cannot set your own role to ADMIN or ROOTADMIN")
            }
            Denial::AdminTierProtected { action } => write!(
                f,
                "admin cannot {} other admins or rootadmins",
                action.as_str()
            ),
            Denial::SelfOnly { action } => {
                write!(f, "users can only {} their own account", action.as_str())
            }
        }
    }
}

/// Decide whether `actor` may perform `action` on `target`.
///
/// `requested_role` is the role the request wants to give the target, if
/// any. Role rules are checked first so that they also bind a ROOTADMIN.
pub fn authorize(
    action: Action,
    actor: &Actor,
    target: &Target,
    requested_role: Option<Role>,
) -> Result<(), Denial> {
    if let Some(role) = requested_role {
        if role == Role::RootAdmin {
            return Err(Denial::RootAdminNotAssignable);
        }
        if actor.role != Role::RootAdmin {
            return Err(Denial::RoleChangeRequiresRootAdmin);
        }
        if actor.id == target.id && role >= Role::Admin {
            return Err(Denial::SelfEscalation);
        }
    }

    if action == Action::Inspect {
        return match actor.role {
            Role::RootAdmin => Ok(()),
            _ if actor.id == target.id => Ok(()),
            _ => Err(Denial::SelfOnly { action }),
        };
    }

    match actor.role {
        Role::RootAdmin => Ok(()),
        Role::Admin if target.role >= Role::Admin => Err(Denial::AdminTierProtected { action }),
        Role::Admin => Ok(()),
        Role::User if actor.id == target.id => Ok(()),
        Role::User => Err(Denial::SelfOnly { action }),
    }
}
