//! Aggregate access service.
//!
//! Each public use case follows the same pipeline: validate the input,
//! check uniqueness, take the graph lock, check that referenced entities
//! exist and authorize actor-scoped requests, plan graph changes on a
//! snapshot, then commit the plan as one store transaction while still
//! holding the lock. Nothing is written before the final commit, so
//! validation, authorization and consistency errors never leave side
//! effects.

mod groups;
mod permissions;
mod users;

use std::collections::{BTreeSet, HashSet};

use rolegate_core::error::{RolegateError, RolegateResult};
use rolegate_core::models::user::{Role, User};
use rolegate_core::policy::{self, Action, Actor, Target};
use rolegate_core::propagation::PropagationPlan;
use rolegate_core::repository::{
    AccessGraphStore, GroupRepository, PermissionRepository, UserRepository,
};
use tracing::warn;
use uuid::Uuid;

use crate::cache::SessionUserCache;
use crate::config::AccessConfig;
use crate::locks::GraphLocks;

/// Aggregate service over users, groups, permissions and their graph.
///
/// Generic over repository implementations so that the service layer has
/// no dependency on the database crate.
pub struct AccessService<U, G, P, S>
where
    U: UserRepository,
    G: GroupRepository,
    P: PermissionRepository,
    S: AccessGraphStore,
{
    users: U,
    groups: G,
    permissions: P,
    graph: S,
    locks: GraphLocks,
    cache: SessionUserCache,
}

impl<U, G, P, S> AccessService<U, G, P, S>
where
    U: UserRepository,
    G: GroupRepository,
    P: PermissionRepository,
    S: AccessGraphStore,
{
    pub fn new(users: U, groups: G, permissions: P, graph: S, config: AccessConfig) -> Self {
        Self {
            users,
            groups,
            permissions,
            graph,
            locks: GraphLocks::new(),
            cache: SessionUserCache::new(&config),
        }
    }

    /// Load the target and run it through the policy evaluator.
    async fn authorize_on(
        &self,
        action: Action,
        actor: &Actor,
        target_id: Uuid,
        requested_role: Option<Role>,
    ) -> RolegateResult<User> {
        let target = self.users.get_by_id(target_id).await?;
        policy::authorize(action, actor, &Target::from(&target), requested_role).map_err(
            |denial| {
                warn!(
                    actor_id = %actor.id,
                    target_id = %target_id,
                    %denial,
                    "Authorization denied"
                );
                RolegateError::from(denial)
            },
        )?;
        Ok(target)
    }

    /// Apply a plan and drop cached sessions of every affected user.
    async fn commit(&self, plan: PropagationPlan) -> RolegateResult<BTreeSet<Uuid>> {
        self.graph.apply(plan.changes).await?;
        self.cache
            .invalidate_many(plan.affected_users.iter().copied())
            .await;
        Ok(plan.affected_users)
    }

    async fn require_users(&self, user_ids: &[Uuid]) -> RolegateResult<()> {
        for id in user_ids {
            self.users.get_by_id(*id).await?;
        }
        Ok(())
    }

    async fn require_groups(&self, group_ids: &[Uuid]) -> RolegateResult<()> {
        for id in group_ids {
            self.groups.get_by_id(*id).await?;
        }
        Ok(())
    }

    async fn require_permissions(&self, permission_ids: &[Uuid]) -> RolegateResult<()> {
        for id in permission_ids {
            self.permissions.get_by_id(*id).await?;
        }
        Ok(())
    }
}

/// `Ok(())` if the lookup found nothing, a validation error if it found an
/// entity other than `except`.
fn ensure_unique<T>(
    lookup: RolegateResult<T>,
    id_of: impl FnOnce(&T) -> Uuid,
    except: Option<Uuid>,
    message: impl FnOnce() -> String,
) -> RolegateResult<()> {
    match lookup {
        Ok(found) if Some(id_of(&found)) == except => Ok(()),
        Ok(_) => Err(RolegateError::validation(message())),
        Err(RolegateError::NotFound { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

fn require_non_empty<T>(items: &[T], what: &str) -> RolegateResult<()> {
    if items.is_empty() {
        return Err(RolegateError::validation(format!("{what} must not be empty")));
    }
    Ok(())
}

fn require_name(name: &str, what: &str) -> RolegateResult<()> {
    if name.trim().is_empty() {
        return Err(RolegateError::validation(format!("{what} must not be blank")));
    }
    Ok(())
}

/// Order-preserving de-duplication.
fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
