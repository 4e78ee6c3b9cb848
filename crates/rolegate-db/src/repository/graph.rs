//! SurrealDB implementation of [`AccessGraphStore`].
//!
//! A [`ChangeSet`] is rendered into one `BEGIN TRANSACTION ... COMMIT
//! TRANSACTION` batch. If any statement fails, SurrealDB discards the whole
//! batch, so a use case is persisted completely or not at all.

use std::collections::BTreeSet;

use rolegate_core::error::RolegateResult;
use rolegate_core::graph::{AccessGraph, ChangeSet, GraphChange};
use rolegate_core::models::group_permission::GroupPermission;
use rolegate_core::repository::AccessGraphStore;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct MembershipRow {
    user_id: String,
    group_id: String,
}

#[derive(Debug, SurrealValue)]
struct GroupPermissionRow {
    group_id: String,
    permission_id: String,
    is_active: bool,
}

#[derive(Debug, SurrealValue)]
struct DirectGrantRow {
    user_id: String,
    permission_id: String,
}

impl GroupPermissionRow {
    fn try_into_grant(self) -> Result<GroupPermission, DbError> {
        Ok(GroupPermission {
            group_id: parse_uuid(&self.group_id)?,
            permission_id: parse_uuid(&self.permission_id)?,
            is_active: self.is_active,
        })
    }
}

/// Render one change as SurrealQL. Ids are UUIDs, so inlining them as
/// backtick-quoted record ids is safe; free text goes through `binds`.
fn render(index: usize, change: &GraphChange, binds: &mut Vec<(String, String)>) -> String {
    match change {
        GraphChange::CreateGroup { group_id, name } => {
            let param = format!("name_{index}");
            binds.push((param.clone(), name.clone()));
            format!("CREATE group:`{group_id}` SET name = ${param};")
        }
        GraphChange::CreateGroupPermission {
            group_id,
            permission_id,
            is_active,
        } => format!(
            "RELATE group:`{group_id}` -> group_permission -> \
             permission:`{permission_id}` SET is_active = {is_active};"
        ),
        GraphChange::SetGroupPermissionActive {
            group_id,
            permission_id,
            is_active,
        } => format!(
            "UPDATE group_permission SET is_active = {is_active} \
             WHERE in = group:`{group_id}` AND out = permission:`{permission_id}`;"
        ),
        GraphChange::DeleteGroupPermission {
            group_id,
            permission_id,
        } => format!(
            "DELETE group_permission \
             WHERE in = group:`{group_id}` AND out = permission:`{permission_id}`;"
        ),
        GraphChange::AddMember { user_id, group_id } => {
            format!("RELATE user:`{user_id}` -> member_of -> group:`{group_id}`;")
        }
        GraphChange::RemoveMember { user_id, group_id } => {
            format!("DELETE member_of WHERE in = user:`{user_id}` AND out = group:`{group_id}`;")
        }
        GraphChange::GrantUserPermission {
            user_id,
            permission_id,
        } => format!(
            "RELATE user:`{user_id}` -> has_permission -> permission:`{permission_id}`;"
        ),
        GraphChange::RevokeUserPermission {
            user_id,
            permission_id,
        } => format!(
            "DELETE has_permission \
             WHERE in = user:`{user_id}` AND out = permission:`{permission_id}`;"
        ),
        GraphChange::DeleteUser { user_id } => format!(
            "DELETE member_of WHERE in = user:`{user_id}`; \
             DELETE has_permission WHERE in = user:`{user_id}`; \
             DELETE user:`{user_id}`;"
        ),
        GraphChange::DeleteGroup { group_id } => format!(
            "DELETE member_of WHERE out = group:`{group_id}`; \
             DELETE group_permission WHERE in = group:`{group_id}`; \
             DELETE group:`{group_id}`;"
        ),
        GraphChange::DeletePermission { permission_id } => format!(
            "DELETE group_permission WHERE out = permission:`{permission_id}`; \
             DELETE has_permission WHERE out = permission:`{permission_id}`; \
             DELETE permission:`{permission_id}`;"
        ),
    }
}

/// The whole change set as one transaction plus its bound parameters.
fn transaction_script(changes: &ChangeSet) -> (String, Vec<(String, String)>) {
    let mut binds = Vec::new();
    let mut script = String::from("BEGIN TRANSACTION;\n");
    for (index, change) in changes.iter().enumerate() {
        script.push_str(&render(index, change, &mut binds));
        script.push('\n');
    }
    script.push_str("COMMIT TRANSACTION;");
    (script, binds)
}

/// SurrealDB implementation of the access graph store.
#[derive(Clone)]
pub struct SurrealAccessGraphStore<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAccessGraphStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AccessGraphStore for SurrealAccessGraphStore<C> {
    async fn load_graph(&self) -> RolegateResult<AccessGraph> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(in) AS user_id, meta::id(out) AS group_id \
                 FROM member_of; \
                 SELECT meta::id(in) AS group_id, meta::id(out) AS permission_id, \
                 is_active FROM group_permission; \
                 SELECT meta::id(in) AS user_id, meta::id(out) AS permission_id \
                 FROM has_permission;",
            )
            .await
            .map_err(DbError::from)?;

        let memberships: Vec<MembershipRow> = result.take(0).map_err(DbError::from)?;
        let grants: Vec<GroupPermissionRow> = result.take(1).map_err(DbError::from)?;
        let direct: Vec<DirectGrantRow> = result.take(2).map_err(DbError::from)?;

        let memberships = memberships
            .into_iter()
            .map(|row| Ok((parse_uuid(&row.user_id)?, parse_uuid(&row.group_id)?)))
            .collect::<Result<Vec<_>, DbError>>()?;
        let grants = grants
            .into_iter()
            .map(GroupPermissionRow::try_into_grant)
            .collect::<Result<Vec<_>, DbError>>()?;
        let direct = direct
            .into_iter()
            .map(|row| Ok((parse_uuid(&row.user_id)?, parse_uuid(&row.permission_id)?)))
            .collect::<Result<Vec<_>, DbError>>()?;

        debug!(
            memberships = memberships.len(),
            grants = grants.len(),
            direct = direct.len(),
            "Loaded access graph"
        );

        Ok(AccessGraph::from_edges(memberships, grants, direct))
    }

    async fn apply(&self, changes: ChangeSet) -> RolegateResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let (script, binds) = transaction_script(&changes);
        debug!(changes = changes.len(), "Applying change set");

        let mut query = self.db.query(script);
        for bind in binds {
            query = query.bind(bind);
        }
        query
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::statement)?;

        Ok(())
    }

    async fn get_group_permission(
        &self,
        group_id: Uuid,
        permission_id: Uuid,
    ) -> RolegateResult<GroupPermission> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(in) AS group_id, meta::id(out) AS permission_id, \
                 is_active FROM group_permission \
                 WHERE in = type::record('group', $group_id) \
                 AND out = type::record('permission', $permission_id)",
            )
            .bind(("group_id", group_id.to_string()))
            .bind(("permission_id", permission_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GroupPermissionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| {
            DbError::not_found("group_permission", format!("{group_id}/{permission_id}"))
        })?;

        Ok(row.try_into_grant()?)
    }

    async fn list_group_permissions(&self, group_id: Uuid) -> RolegateResult<Vec<GroupPermission>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(in) AS group_id, meta::id(out) AS permission_id, \
                 is_active FROM group_permission \
                 WHERE in = type::record('group', $group_id) \
                 ORDER BY permission_id",
            )
            .bind(("group_id", group_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GroupPermissionRow> = result.take(0).map_err(DbError::from)?;
        let grants = rows
            .into_iter()
            .map(GroupPermissionRow::try_into_grant)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(grants)
    }

    async fn effective_permissions(&self, user_id: Uuid) -> RolegateResult<BTreeSet<Uuid>> {
        let mut result = self
            .db
            .query(
                "SELECT VALUE meta::id(out) FROM has_permission \
                 WHERE in = type::record('user', $user_id); \
                 SELECT VALUE meta::id(out) FROM group_permission \
                 WHERE is_active = true AND in IN (\
                     SELECT VALUE out FROM member_of \
                     WHERE in = type::record('user', $user_id)\
                 );",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let direct: Vec<String> = result.take(0).map_err(DbError::from)?;
        let via_groups: Vec<String> = result.take(1).map_err(DbError::from)?;

        let effective = direct
            .iter()
            .chain(via_groups.iter())
            .map(|raw| parse_uuid(raw))
            .collect::<Result<BTreeSet<_>, DbError>>()?;

        Ok(effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_is_wrapped_in_one_transaction() {
        let (u, g) = (Uuid::new_v4(), Uuid::new_v4());
        let mut changes = ChangeSet::new();
        changes.push(GraphChange::AddMember {
            user_id: u,
            group_id: g,
        });
        changes.push(GraphChange::DeleteGroup { group_id: g });

        let (script, binds) = transaction_script(&changes);
        assert!(binds.is_empty());
        assert!(script.starts_with("BEGIN TRANSACTION;"));
        assert!(script.ends_with("COMMIT TRANSACTION;"));
        assert_eq!(script.matches("BEGIN TRANSACTION").count(), 1);
        assert!(script.contains(&format!("RELATE user:`{u}` -> member_of -> group:`{g}`;")));
        assert!(script.contains(&format!("DELETE group:`{g}`;")));
    }

    #[test]
    fn activation_state_is_rendered_literally() {
        let (g, p) = (Uuid::new_v4(), Uuid::new_v4());
        let mut binds = Vec::new();
        let out = render(
            0,
            &GraphChange::SetGroupPermissionActive {
                group_id: g,
                permission_id: p,
                is_active: false,
            },
            &mut binds,
        );
        assert!(out.contains("SET is_active = false"));
    }

    #[test]
    fn group_names_are_bound_not_inlined() {
        let g = Uuid::new_v4();
        let mut changes = ChangeSet::new();
        changes.push(GraphChange::CreateGroup {
            group_id: g,
            name: "O'Brien; DELETE user;".into(),
        });
        changes.push(GraphChange::DeleteGroup { group_id: g });

        let (script, binds) = transaction_script(&changes);
        assert!(script.contains(&format!("CREATE group:`{g}` SET name = $name_0;")));
        assert!(!script.contains("O'Brien"));
        assert_eq!(binds, vec![("name_0".to_string(), "O'Brien; DELETE user;".to_string())]);
    }
}
