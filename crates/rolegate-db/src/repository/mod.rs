//! SurrealDB repository implementations.

mod graph;
mod group;
mod permission;
mod user;

pub use graph::SurrealAccessGraphStore;
pub use group::SurrealGroupRepository;
pub use permission::SurrealPermissionRepository;
pub use user::SurrealUserRepository;

use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn total_of(rows: Vec<CountRow>) -> u64 {
    rows.first().map(|r| r.total).unwrap_or(0)
}

fn parse_uuid(raw: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::Decode(format!("invalid UUID {raw}: {e}")))
}
