//! Group-to-permission grant with activation state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A group's grant of a permission. Only active grants confer the
/// permission on the group's members; an inactive row still records that
/// the permission is attached to the group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupPermission {
    pub group_id: Uuid,
    pub permission_id: Uuid,
    pub is_active: bool,
}
