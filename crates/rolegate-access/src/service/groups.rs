//! Group, membership and group-grant use cases.

use rolegate_core::error::{RolegateError, RolegateResult};
use rolegate_core::models::group::{CreateGroup, Group, UpdateGroup};
use rolegate_core::models::group_permission::GroupPermission;
use rolegate_core::models::user::User;
use rolegate_core::propagation::{Propagation, PropagationOutcome, apply_activations};
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
    /// Create a group, optionally with initial members and active grants.
    /// The record and all of its edges are written in one transaction.
    pub async fn create_group(&self, input: CreateGroup) -> RolegateResult<Group> {
        require_name(&input.name, "group name")?;
        ensure_unique(
            self.groups.get_by_name(&input.name).await,
            |g| g.id,
            None,
            || format!("group {} already exists", input.name),
        )?;
        let user_ids = dedup(&input.user_ids);
        let permission_ids = dedup(&input.permission_ids);
        let group_id = Uuid::new_v4();

        {
            let _scope = self.locks.structural_scope().await;
            self.require_users(&user_ids).await?;
            self.require_permissions(&permission_ids).await?;

            let mut graph = self.graph.load_graph().await?;
            let mut run = Propagation::new(&mut graph);
            run.create_group(group_id, input.name)?;
            for permission_id in &permission_ids {
                run.add_permission_to_group(group_id, *permission_id)?;
            }
            for user_id in &user_ids {
                run.add_member(*user_id, group_id);
            }
            self.commit(run.finish()).await?;
        }

        let group = self.groups.get_by_id(group_id).await?;
        info!(
            group_id = %group.id,
            name = %group.name,
            members = user_ids.len(),
            permissions = permission_ids.len(),
            "Group created"
        );
        Ok(group)
    }

    pub async fn get_group(&self, group_id: Uuid) -> RolegateResult<Group> {
        self.groups.get_by_id(group_id).await
    }

    pub async fn list_groups(&self, pagination: Pagination) -> RolegateResult<PaginatedResult<Group>> {
        self.groups.list(pagination).await
    }

    pub async fn search_groups(
        &self,
        query: &str,
        pagination: Pagination,
    ) -> RolegateResult<PaginatedResult<Group>> {
        self.groups.search(query, pagination).await
    }

    pub async fn update_group(&self, group_id: Uuid, input: UpdateGroup) -> RolegateResult<Group> {
        self.groups.get_by_id(group_id).await?;
        if let Some(name) = &input.name {
            require_name(name, "group name")?;
            ensure_unique(
                self.groups.get_by_name(name).await,
                |g| g.id,
                Some(group_id),
                || format!("group {name} already exists"),
            )?;
        }

        let group = self.groups.update(group_id, input).await?;
        info!(group_id = %group_id, name = %group.name, "Group updated");
        Ok(group)
    }

    /// Delete a group, detaching it from every member and permission.
    pub async fn delete_group(&self, group_id: Uuid) -> RolegateResult<()> {
        let _scope = self.locks.structural_scope().await;
        self.groups.get_by_id(group_id).await?;

        let mut graph = self.graph.load_graph().await?;
        let mut run = Propagation::new(&mut graph);
        run.delete_group(group_id);
        let affected = self.commit(run.finish()).await?;

        info!(group_id = %group_id, former_members = affected.len(), "Group deleted");
        Ok(())
    }

    pub async fn group_members(&self, group_id: Uuid) -> RolegateResult<Vec<User>> {
        self.groups.get_by_id(group_id).await?;
        self.groups.get_members(group_id).await
    }

    pub async fn group_permissions(&self, group_id: Uuid) -> RolegateResult<Vec<GroupPermission>> {
        self.groups.get_by_id(group_id).await?;
        self.graph.list_group_permissions(group_id).await
    }

    /// Add the user to each group. Groups the user already belongs to are
    /// skipped; returns the groups actually joined.
    pub async fn assign_user_to_groups(
        &self,
        user_id: Uuid,
        group_ids: &[Uuid],
    ) -> RolegateResult<Vec<Uuid>> {
        require_non_empty(group_ids, "group ids")?;
        let group_ids = dedup(group_ids);

        let _scope = self.locks.structural_scope().await;
        self.users.get_by_id(user_id).await?;
        self.require_groups(&group_ids).await?;

        let mut graph = self.graph.load_graph().await?;
        let mut run = Propagation::new(&mut graph);
        let joined: Vec<Uuid> = group_ids
            .into_iter()
            .filter(|group_id| run.add_member(user_id, *group_id))
            .collect();
        self.commit(run.finish()).await?;

        info!(user_id = %user_id, joined = joined.len(), "User assigned to groups");
        Ok(joined)
    }

    /// Remove the user from each group. Every group must currently contain
    /// the user.
    pub async fn remove_user_from_groups(
        &self,
        user_id: Uuid,
        group_ids: &[Uuid],
    ) -> RolegateResult<()> {
        require_non_empty(group_ids, "group ids")?;
        let group_ids = dedup(group_ids);

        let _scope = self.locks.structural_scope().await;
        self.users.get_by_id(user_id).await?;
        self.require_groups(&group_ids).await?;

        let mut graph = self.graph.load_graph().await?;
        let mut run = Propagation::new(&mut graph);
        for group_id in &group_ids {
            run.remove_member(user_id, *group_id)?;
        }
        self.commit(run.finish()).await?;

        info!(user_id = %user_id, left = group_ids.len(), "User removed from groups");
        Ok(())
    }

    /// Add the membership if missing and grant the listed permissions to
    /// the user directly. Each permission must already be attached to the
    /// group.
    pub async fn assign_user_to_group_with_permissions(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        permission_ids: &[Uuid],
    ) -> RolegateResult<()> {
        let permission_ids = dedup(permission_ids);

        let _scope = self.locks.structural_scope().await;
        self.users.get_by_id(user_id).await?;
        self.groups.get_by_id(group_id).await?;
        self.require_permissions(&permission_ids).await?;

        let mut graph = self.graph.load_graph().await?;
        if let Some(missing) = permission_ids
            .iter()
            .find(|p| graph.grant(group_id, **p).is_none())
        {
            return Err(RolegateError::consistency(format!(
                "permission {missing} is not attached to group {group_id}"
            )));
        }

        let mut run = Propagation::new(&mut graph);
        run.add_member(user_id, group_id);
        for permission_id in &permission_ids {
            run.grant_user_permission(user_id, *permission_id);
        }
        self.commit(run.finish()).await?;

        info!(
            user_id = %user_id,
            group_id = %group_id,
            permissions = permission_ids.len(),
            "User assigned to group with permissions"
        );
        Ok(())
    }

    /// Attach permissions to a group as active grants, cascading across
    /// groups that share members with it.
    pub async fn add_permissions_to_group(
        &self,
        group_id: Uuid,
        permission_ids: &[Uuid],
    ) -> RolegateResult<PropagationOutcome> {
        require_non_empty(permission_ids, "permission ids")?;
        let permission_ids = dedup(permission_ids);

        let _scope = self.locks.structural_scope().await;
        self.groups.get_by_id(group_id).await?;
        self.require_permissions(&permission_ids).await?;

        let mut graph = self.graph.load_graph().await?;
        let mut run = Propagation::new(&mut graph);
        let mut outcome = PropagationOutcome::default();
        for permission_id in &permission_ids {
            outcome.merge(run.add_permission_to_group(group_id, *permission_id)?);
        }
        self.commit(run.finish()).await?;

        info!(
            group_id = %group_id,
            permissions = permission_ids.len(),
            changed_groups = outcome.changed_groups.len(),
            "Permissions added to group"
        );
        Ok(outcome)
    }

    /// Activate or deactivate one group grant, creating the row if needed.
    pub async fn set_group_permission_active(
        &self,
        group_id: Uuid,
        permission_id: Uuid,
        active: bool,
    ) -> RolegateResult<PropagationOutcome> {
        let _scope = self.locks.grant_scope(permission_id).await;
        self.groups.get_by_id(group_id).await?;
        self.permissions.get_by_id(permission_id).await?;

        let mut graph = self.graph.load_graph().await?;
        let mut run = Propagation::new(&mut graph);
        let outcome = run.set_group_permission_active(group_id, permission_id, active);
        self.commit(run.finish()).await?;

        info!(
            group_id = %group_id,
            permission_id = %permission_id,
            active,
            visited = outcome.visited_groups,
            changed = outcome.changed_groups.len(),
            "Group permission activation set"
        );
        Ok(outcome)
    }

    /// Apply several activation changes on one group in one transaction.
    pub async fn update_group_permissions(
        &self,
        group_id: Uuid,
        updates: &[(Uuid, bool)],
    ) -> RolegateResult<PropagationOutcome> {
        require_non_empty(updates, "permission updates")?;
        let permission_ids: Vec<Uuid> = updates.iter().map(|(p, _)| *p).collect();

        let _scope = self.locks.structural_scope().await;
        self.groups.get_by_id(group_id).await?;
        self.require_permissions(&dedup(&permission_ids)).await?;

        let mut graph = self.graph.load_graph().await?;
        let mut run = Propagation::new(&mut graph);
        let outcome = apply_activations(
            &mut run,
            updates
                .iter()
                .map(|(permission_id, active)| (group_id, *permission_id, *active)),
        );
        self.commit(run.finish()).await?;

        info!(
            group_id = %group_id,
            updates = updates.len(),
            changed = outcome.changed_groups.len(),
            "Group permissions updated"
        );
        Ok(outcome)
    }

    /// Detach a permission from a group. Members keep it only if another
    /// of their groups grants it actively or it is granted to them directly.
    pub async fn remove_permission_from_group(
        &self,
        group_id: Uuid,
        permission_id: Uuid,
    ) -> RolegateResult<()> {
        let _scope = self.locks.grant_scope(permission_id).await;
        self.groups.get_by_id(group_id).await?;
        self.permissions.get_by_id(permission_id).await?;

        let mut graph = self.graph.load_graph().await?;
        let mut run = Propagation::new(&mut graph);
        run.remove_permission_from_group(group_id, permission_id)?;
        self.commit(run.finish()).await?;

        info!(
            group_id = %group_id,
            permission_id = %permission_id,
            "Permission removed from group"
        );
        Ok(())
    }
}
