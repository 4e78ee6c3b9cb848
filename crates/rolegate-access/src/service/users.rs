//! User use cases.

use rolegate_core::error::{RolegateError, RolegateResult};
use rolegate_core::models::group::Group;
use rolegate_core::models::permission::Permission;
use rolegate_core::models::user::{CreateUser, Role, UpdateUser, User};
use rolegate_core::policy::{Action, Actor, Denial};
use rolegate_core::propagation::Propagation;
use rolegate_core::repository::{
    AccessGraphStore, GroupRepository, PaginatedResult, Pagination, PermissionRepository,
    UserRepository,
};
use tracing::info;
use uuid::Uuid;

use super::{AccessService, ensure_unique, require_name};
use crate::cache::SessionUser;

fn validate_email(email: &str) -> RolegateResult<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
    if !valid {
        return Err(RolegateError::validation(format!(
            "invalid email address: {email}"
        )));
    }
    Ok(())
}

impl<U, G, P, S> AccessService<U, G, P, S>
where
    U: UserRepository,
    G: GroupRepository,
    P: PermissionRepository,
    S: AccessGraphStore,
{
    /// Register a user. ROOTADMIN accounts are only ever seeded at startup.
    pub async fn create_user(&self, input: CreateUser) -> RolegateResult<User> {
        validate_email(&input.email)?;
        require_name(&input.first_name, "first name")?;
        if input.role == Role::RootAdmin {
            return Err(Denial::RootAdminNotAssignable.into());
        }
        ensure_unique(
            self.users.get_by_email(&input.email).await,
            |u| u.id,
            None,
            || format!("email {} is already registered", input.email),
        )?;

        let user = self.users.create(input).await?;
        info!(user_id = %user.id, role = %user.role, "User created");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> RolegateResult<User> {
        self.users.get_by_id(user_id).await
    }

    pub async fn list_users(&self, pagination: Pagination) -> RolegateResult<PaginatedResult<User>> {
        self.users.list(pagination).await
    }

    pub async fn search_users(
        &self,
        query: &str,
        pagination: Pagination,
    ) -> RolegateResult<PaginatedResult<User>> {
        self.users.search(query, pagination).await
    }

    /// Update profile fields. A role differing from the current one counts
    /// as a role change and goes through the role rules.
    pub async fn update_user(
        &self,
        actor: &Actor,
        user_id: Uuid,
        input: UpdateUser,
    ) -> RolegateResult<User> {
        let current = self.users.get_by_id(user_id).await?;
        let requested_role = input.role.filter(|role| *role != current.role);
        self.authorize_on(Action::Update, actor, user_id, requested_role)
            .await?;

        if let Some(email) = &input.email {
            validate_email(email)?;
            ensure_unique(
                self.users.get_by_email(email).await,
                |u| u.id,
                Some(user_id),
                || format!("email {email} is already registered"),
            )?;
        }
        if let Some(first_name) = &input.first_name {
            require_name(first_name, "first name")?;
        }

        let user = self.users.update(user_id, input).await?;
        self.cache.invalidate(user_id).await;
        info!(actor_id = %actor.id, user_id = %user_id, "User updated");
        Ok(user)
    }

    pub async fn assign_role(&self, actor: &Actor, user_id: Uuid, role: Role) -> RolegateResult<User> {
        self.authorize_on(Action::AssignRole, actor, user_id, Some(role))
            .await?;

        let user = self
            .users
            .update(
                user_id,
                UpdateUser {
                    role: Some(role),
                    ..Default::default()
                },
            )
            .await?;
        self.cache.invalidate(user_id).await;
        info!(actor_id = %actor.id, user_id = %user_id, role = %role, "Role assigned");
        Ok(user)
    }

    /// Delete a user with every membership and direct grant.
    pub async fn delete_user(&self, actor: &Actor, user_id: Uuid) -> RolegateResult<()> {
        let _scope = self.locks.structural_scope().await;
        self.authorize_on(Action::Delete, actor, user_id, None)
            .await?;

        let mut graph = self.graph.load_graph().await?;
        let mut run = Propagation::new(&mut graph);
        run.delete_user(user_id);
        self.commit(run.finish()).await?;

        info!(actor_id = %actor.id, user_id = %user_id, "User deleted");
        Ok(())
    }

    /// Store a new avatar reference, returning the one it replaces.
    pub async fn update_avatar(
        &self,
        actor: &Actor,
        user_id: Uuid,
        reference: String,
    ) -> RolegateResult<Option<String>> {
        if reference.trim().is_empty() {
            return Err(RolegateError::validation("avatar reference must not be blank"));
        }
        self.replace_avatar(actor, user_id, Some(reference)).await
    }

    /// Clear the avatar reference, returning the removed one.
    pub async fn delete_avatar(
        &self,
        actor: &Actor,
        user_id: Uuid,
    ) -> RolegateResult<Option<String>> {
        self.replace_avatar(actor, user_id, None).await
    }

    async fn replace_avatar(
        &self,
        actor: &Actor,
        user_id: Uuid,
        reference: Option<String>,
    ) -> RolegateResult<Option<String>> {
        let current = self
            .authorize_on(Action::Update, actor, user_id, None)
            .await?;

        self.users
            .update(
                user_id,
                UpdateUser {
                    avatar_url: Some(reference),
                    ..Default::default()
                },
            )
            .await?;
        self.cache.invalidate(user_id).await;
        info!(user_id = %user_id, "Avatar reference replaced");
        Ok(current.avatar_url)
    }

    pub async fn user_groups(&self, actor: &Actor, user_id: Uuid) -> RolegateResult<Vec<Group>> {
        self.authorize_on(Action::Inspect, actor, user_id, None)
            .await?;
        self.groups.get_user_groups(user_id).await
    }

    /// Direct grants plus active grants of the user's groups.
    pub async fn effective_permissions(
        &self,
        actor: &Actor,
        user_id: Uuid,
    ) -> RolegateResult<Vec<Permission>> {
        self.authorize_on(Action::Inspect, actor, user_id, None)
            .await?;
        let ids = self.graph.effective_permissions(user_id).await?;
        let mut permissions = Vec::with_capacity(ids.len());
        for id in ids {
            permissions.push(self.permissions.get_by_id(id).await?);
        }
        Ok(permissions)
    }

    pub async fn direct_permissions(
        &self,
        actor: &Actor,
        user_id: Uuid,
    ) -> RolegateResult<Vec<Permission>> {
        self.authorize_on(Action::Inspect, actor, user_id, None)
            .await?;
        self.users.get_direct_permissions(user_id).await
    }

    /// Populate the session cache for a freshly signed-in user.
    pub async fn session_started(&self, user_id: Uuid) -> RolegateResult<SessionUser> {
        let entry = self.load_session_user(user_id).await?;
        self.cache.insert(entry.clone()).await;
        info!(user_id = %user_id, "Session started");
        Ok(entry)
    }

    pub async fn session_ended(&self, user_id: Uuid) {
        self.cache.invalidate(user_id).await;
        info!(user_id = %user_id, "Session ended");
    }

    /// The actor's own record and effective permissions, read through the
    /// session cache.
    pub async fn current_user(&self, actor: &Actor) -> RolegateResult<SessionUser> {
        if let Some(entry) = self.cache.get(actor.id).await {
            return Ok(entry);
        }
        let entry = self.load_session_user(actor.id).await?;
        self.cache.insert(entry.clone()).await;
        Ok(entry)
    }

    async fn load_session_user(&self, user_id: Uuid) -> RolegateResult<SessionUser> {
        let user = self.users.get_by_id(user_id).await?;
        let permissions = self.graph.effective_permissions(user_id).await?;
        Ok(SessionUser { user, permissions })
    }

    /// Whether a session entry is currently cached for the user.
    pub fn is_session_cached(&self, user_id: Uuid) -> bool {
        self.cache.contains(user_id)
    }
}
