//! Database-specific error types and conversions.

use rolegate_core::error::RolegateError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Query failed: {0}")]
    Query(String),

    /// A unique index rejected the write.
    #[error("Duplicate value: {0}")]
    Duplicate(String),

    #[error("Invalid stored value: {0}")]
    Decode(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl DbError {
    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Classify an error reported by a statement of an executed query.
    pub(crate) fn statement(err: surrealdb::Error) -> Self {
        let message = err.to_string();
        if is_unique_violation(&message) {
            Self::Duplicate(message)
        } else {
            Self::Query(message)
        }
    }
}

fn is_unique_violation(message: &str) -> bool {
    message.contains("index") && message.contains("already contains")
}

impl From<DbError> for RolegateError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => RolegateError::NotFound { entity, id },
            DbError::Duplicate(message) => RolegateError::Validation { message },
            other => RolegateError::Database(other.to_string()),
        }
    }
}
