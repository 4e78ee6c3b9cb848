//! Permission and direct-grant use cases.

use rolegate_core::error::{RolegateError, RolegateResult};
use rolegate_core::models::permission::{CreatePermission, Permission, UpdatePermission};
use rolegate_core::propagation::Propagation;
use rolegate_core::repository::{
    AccessGraphStore, GroupRepository, PaginatedResult, Pagination, PermissionRepository,
    UserRepository,
};
use tracing::info;
use uuid::Uuid;

use super::{AccessService, dedup, ensure_unique, require_name, require_non_empty};

impl<U, G, P, S> AccessService<U, G, P, S>
where
    U: UserRepository,
    G: GroupRepository,
    P: PermissionRepository,
    S: AccessGraphStore,
{
    pub async fn create_permission(&self, input: CreatePermission) -> RolegateResult<Permission> {
        require_name(&input.name, "permission name")?;
        ensure_unique(
            self.permissions.get_by_name(&input.name).await,
            |p| p.id,
            None,
            || format!("permission {} already exists", input.name),
        )?;

        let permission = self.permissions.create(input).await?;
        info!(permission_id = %permission.id, name = %permission.name, "Permission created");
        Ok(permission)
    }

    pub async fn get_permission(&self, permission_id: Uuid) -> RolegateResult<Permission> {
        self.permissions.get_by_id(permission_id).await
    }

    pub async fn list_permissions(
        &self,
        pagination: Pagination,
    ) -> RolegateResult<PaginatedResult<Permission>> {
        self.permissions.list(pagination).await
    }

    pub async fn search_permissions(
        &self,
        query: &str,
        pagination: Pagination,
    ) -> RolegateResult<PaginatedResult<Permission>> {
        self.permissions.search(query, pagination).await
    }

    pub async fn update_permission(
        &self,
        permission_id: Uuid,
        input: UpdatePermission,
    ) -> RolegateResult<Permission> {
        self.permissions.get_by_id(permission_id).await?;
        if let Some(name) = &input.name {
            require_name(name, "permission name")?;
            ensure_unique(
                self.permissions.get_by_name(name).await,
                |p| p.id,
                Some(permission_id),
                || format!("permission {name} already exists"),
            )?;
        }

        let permission = self.permissions.update(permission_id, input).await?;
        info!(permission_id = %permission_id, "Permission updated");
        Ok(permission)
    }

    /// Delete a permission together with every group grant and direct
    /// grant referencing it.
    pub async fn delete_permission(&self, permission_id: Uuid) -> RolegateResult<()> {
        let _scope = self.locks.structural_scope().await;
        self.permissions.get_by_id(permission_id).await?;

        let mut graph = self.graph.load_graph().await?;
        let mut run = Propagation::new(&mut graph);
        run.delete_permission(permission_id);
        let affected = self.commit(run.finish()).await?;

        info!(
            permission_id = %permission_id,
            affected_users = affected.len(),
            "Permission deleted"
        );
        Ok(())
    }

    /// Grant permissions to a user directly. Returns how many were new.
    pub async fn grant_permissions_to_user(
        &self,
        user_id: Uuid,
        permission_ids: &[Uuid],
    ) -> RolegateResult<usize> {
        require_non_empty(permission_ids, "permission ids")?;
        let permission_ids = dedup(permission_ids);

        let _scope = self.locks.structural_scope().await;
        self.users.get_by_id(user_id).await?;
        self.require_permissions(&permission_ids).await?;

        let mut graph = self.graph.load_graph().await?;
        let mut run = Propagation::new(&mut graph);
        let granted = permission_ids
            .iter()
            .filter(|p| run.grant_user_permission(user_id, **p))
            .count();
        self.commit(run.finish()).await?;

        info!(user_id = %user_id, granted, "Permissions granted to user");
        Ok(granted)
    }

    /// Revoke direct grants. Permissions the user also holds through an
    /// active group grant stay effective.
    pub async fn remove_permissions_from_user(
        &self,
        user_id: Uuid,
        permission_ids: &[Uuid],
    ) -> RolegateResult<usize> {
        require_non_empty(permission_ids, "permission ids")?;
        let permission_ids = dedup(permission_ids);

        let _scope = self.locks.structural_scope().await;
        self.users.get_by_id(user_id).await?;
        self.require_permissions(&permission_ids).await?;

        let mut graph = self.graph.load_graph().await?;
        let mut run = Propagation::new(&mut graph);
        let revoked = permission_ids
            .iter()
            .filter(|p| run.revoke_user_permission(user_id, **p))
            .count();
        if revoked == 0 {
            return Err(RolegateError::validation(format!(
                "none of the permissions are granted directly to user {user_id}"
            )));
        }
        self.commit(run.finish()).await?;

        info!(user_id = %user_id, revoked, "Permissions removed from user");
        Ok(revoked)
    }
}
