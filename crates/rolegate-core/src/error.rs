//! Error types for the rolegate system.

use thiserror::Error;

use crate::policy::Denial;

#[derive(Debug, Error)]
pub enum RolegateError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Authorization denied: {reason}")]
    AuthorizationDenied { reason: Denial },

    #[error("Consistency error: {message}")]
    Consistency { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RolegateError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// HTTP status the API layer renders this error as.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation { .. } => 400,
            Self::AuthorizationDenied { .. } => 403,
            Self::Consistency { .. } => 409,
            Self::Database(_) | Self::Internal(_) => 500,
        }
    }
}

impl From<Denial> for RolegateError {
    fn from(reason: Denial) -> Self {
        Self::AuthorizationDenied { reason }
    }
}

pub type RolegateResult<T> = Result<T, RolegateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Action;

    #[test]
    fn status_mapping_follows_error_kind() {
        assert_eq!(RolegateError::not_found("user", "42").http_status(), 404);
        assert_eq!(RolegateError::validation("dup").http_status(), 400);
        assert_eq!(
            RolegateError::from(Denial::SelfOnly {
                action: Action::Update
            })
            .http_status(),
            403
        );
        assert_eq!(RolegateError::consistency("dup grant").http_status(), 409);
        assert_eq!(RolegateError::Database("io".into()).http_status(), 500);
    }

    #[test]
    fn denial_reason_is_rendered() {
        let err = RolegateError::from(Denial::AdminTierProtected {
            action: Action::Delete,
        });
        assert!(err.to_string().contains("admin"));
    }
}
