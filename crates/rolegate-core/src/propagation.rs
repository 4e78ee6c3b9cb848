//! Permission propagation engine.
//!
//! Operations run against an [`AccessGraph`] snapshot and record the store
//! mutations they imply. The caller applies the resulting [`ChangeSet`] as a
//! single transaction, so a failure anywhere leaves the store untouched.
//!
//! Activation spreads across every group reachable through shared members,
//! using a breadth-first worklist with a visited set so each group is
//! processed at most once per run. Deactivation never spreads.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{RolegateError, RolegateResult};
use crate::graph::{AccessGraph, ChangeSet, GraphChange, GroupIdx};

/// Summary of one activation or deactivation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropagationOutcome {
    /// Groups examined by the run, the starting group included.
    pub visited_groups: usize,
    /// Groups whose grant row was created or flipped, in visit order.
    pub changed_groups: Vec<Uuid>,
    /// Members of the changed groups.
    pub affected_users: BTreeSet<Uuid>,
}

impl PropagationOutcome {
    pub fn merge(&mut self, other: PropagationOutcome) {
        self.visited_groups += other.visited_groups;
        self.changed_groups.extend(other.changed_groups);
        self.affected_users.extend(other.affected_users);
    }
}

/// What a finished propagation hands back to the caller.
#[derive(Debug, Clone, Default)]
pub struct PropagationPlan {
    pub changes: ChangeSet,
    /// Users whose effective permissions may have changed.
    pub affected_users: BTreeSet<Uuid>,
    /// Recomputed effective permissions of the affected users still present.
    pub effective: BTreeMap<Uuid, BTreeSet<Uuid>>,
}

pub struct Propagation<'g> {
    graph: &'g mut AccessGraph,
    changes: ChangeSet,
    affected_users: BTreeSet<Uuid>,
}

impl<'g> Propagation<'g> {
    pub fn new(graph: &'g mut AccessGraph) -> Self {
        Self {
            graph,
            changes: ChangeSet::new(),
            affected_users: BTreeSet::new(),
        }
    }

    pub fn graph(&self) -> &AccessGraph {
        self.graph
    }

    /// Create or update the grant row, cascading activation across the
    /// shared-membership component of `group_id`.
    pub fn set_group_permission_active(
        &mut self,
        group_id: Uuid,
        permission_id: Uuid,
        active: bool,
    ) -> PropagationOutcome {
        let outcome = if active {
            self.activate(group_id, permission_id)
        } else {
            self.deactivate(group_id, permission_id)
        };
        self.affected_users
            .extend(outcome.affected_users.iter().copied());
        outcome
    }

    /// Attach a permission to a group as an active grant.
    pub fn add_permission_to_group(
        &mut self,
        group_id: Uuid,
        permission_id: Uuid,
    ) -> RolegateResult<PropagationOutcome> {
        if self.graph.grant(group_id, permission_id).is_some() {
            return Err(RolegateError::consistency(format!(
                "permission {permission_id} is already attached to group {group_id}"
            )));
        }
        Ok(self.set_group_permission_active(group_id, permission_id, true))
    }

    /// Delete the grant row. Members keep the permission only through other
    /// active grants or direct grants.
    pub fn remove_permission_from_group(
        &mut self,
        group_id: Uuid,
        permission_id: Uuid,
    ) -> RolegateResult<()> {
        if self.graph.remove_grant(group_id, permission_id).is_none() {
            return Err(RolegateError::consistency(format!(
                "permission {permission_id} is not attached to group {group_id}"
            )));
        }
        self.changes.push(GraphChange::DeleteGroupPermission {
            group_id,
            permission_id,
        });
        self.affected_users.extend(self.graph.members(group_id));
        Ok(())
    }

    /// Add a membership and reconcile activation across the merged
    /// component. Returns `false` if the user was already a member.
    pub fn add_member(&mut self, user_id: Uuid, group_id: Uuid) -> bool {
        if !self.graph.add_membership(user_id, group_id) {
            return false;
        }
        self.changes
            .push(GraphChange::AddMember { user_id, group_id });
        self.affected_users.insert(user_id);

        let active: BTreeSet<Uuid> = self
            .graph
            .groups_of(user_id)
            .into_iter()
            .flat_map(|g| self.graph.grants(g))
            .filter(|grant| grant.is_active)
            .map(|grant| grant.permission_id)
            .collect();
        for permission_id in active {
            let outcome = self.activate(group_id, permission_id);
            self.affected_users.extend(outcome.affected_users);
        }
        true
    }

    pub fn remove_member(&mut self, user_id: Uuid, group_id: Uuid) -> RolegateResult<()> {
        if !self.graph.remove_membership(user_id, group_id) {
            return Err(RolegateError::validation(format!(
                "user {user_id} is not a member of group {group_id}"
            )));
        }
        self.changes
            .push(GraphChange::RemoveMember { user_id, group_id });
        self.affected_users.insert(user_id);
        Ok(())
    }

    /// Returns `false` if the direct grant already existed.
    pub fn grant_user_permission(&mut self, user_id: Uuid, permission_id: Uuid) -> bool {
        if !self.graph.add_direct_permission(user_id, permission_id) {
            return false;
        }
        self.changes.push(GraphChange::GrantUserPermission {
            user_id,
            permission_id,
        });
        self.affected_users.insert(user_id);
        true
    }

    /// Returns `false` if there was no direct grant to revoke.
    pub fn revoke_user_permission(&mut self, user_id: Uuid, permission_id: Uuid) -> bool {
        if !self.graph.remove_direct_permission(user_id, permission_id) {
            return false;
        }
        self.changes.push(GraphChange::RevokeUserPermission {
            user_id,
            permission_id,
        });
        self.affected_users.insert(user_id);
        true
    }

    pub fn delete_user(&mut self, user_id: Uuid) {
        self.graph.remove_user(user_id);
        self.changes.push(GraphChange::DeleteUser { user_id });
        self.affected_users.insert(user_id);
    }

    /// Register a new group so that grants and members can be attached
    /// to it in the same plan.
    pub fn create_group(&mut self, group_id: Uuid, name: impl Into<String>) -> RolegateResult<()> {
        if !self.graph.add_group(group_id) {
            return Err(RolegateError::consistency(format!(
                "group {group_id} already exists"
            )));
        }
        self.changes.push(GraphChange::CreateGroup {
            group_id,
            name: name.into(),
        });
        Ok(())
    }

    /// Detach the group from all members and drop its grant rows.
    pub fn delete_group(&mut self, group_id: Uuid) {
        let former_members = self.graph.remove_group(group_id);
        debug!(
            group_id = %group_id,
            members = former_members.len(),
            "Detaching group"
        );
        self.changes.push(GraphChange::DeleteGroup { group_id });
        self.affected_users.extend(former_members);
    }

    /// Strip a permission from every group grant and every direct grant.
    pub fn delete_permission(&mut self, permission_id: Uuid) {
        for group_id in self.graph.groups_granting(permission_id) {
            self.graph.remove_grant(group_id, permission_id);
            self.affected_users.extend(self.graph.members(group_id));
        }
        for user_id in self.graph.users_granted(permission_id) {
            self.graph.remove_direct_permission(user_id, permission_id);
            self.affected_users.insert(user_id);
        }
        self.changes
            .push(GraphChange::DeletePermission { permission_id });
    }

    /// Full recomputation over the current snapshot.
    pub fn recompute_effective_permissions(&self, user_id: Uuid) -> BTreeSet<Uuid> {
        self.graph.effective_permissions(user_id)
    }

    pub fn finish(self) -> PropagationPlan {
        let effective = self
            .affected_users
            .iter()
            .filter(|u| self.graph.contains_user(**u))
            .map(|u| (*u, self.graph.effective_permissions(*u)))
            .collect();
        PropagationPlan {
            changes: self.changes,
            affected_users: self.affected_users,
            effective,
        }
    }

    fn activate(&mut self, group_id: Uuid, permission_id: Uuid) -> PropagationOutcome {
        let start = self.graph.group_idx(group_id);
        let mut visited: HashSet<GroupIdx> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut outcome = PropagationOutcome::default();

        while let Some(idx) = queue.pop_front() {
            outcome.visited_groups += 1;
            if self.mark_active(idx, permission_id) {
                outcome.changed_groups.push(self.graph.group_id(idx));
                outcome
                    .affected_users
                    .extend(self.graph.member_ids_at(idx));
            }
            for next in self.graph.neighbours(idx) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        debug!(
            group_id = %group_id,
            permission_id = %permission_id,
            visited = outcome.visited_groups,
            changed = outcome.changed_groups.len(),
            "Activation propagated"
        );
        outcome
    }

    fn deactivate(&mut self, group_id: Uuid, permission_id: Uuid) -> PropagationOutcome {
        let mut outcome = PropagationOutcome {
            visited_groups: 1,
            ..Default::default()
        };
        let change = match self.graph.set_grant(group_id, permission_id, false) {
            Some(false) => None,
            Some(true) => Some(GraphChange::SetGroupPermissionActive {
                group_id,
                permission_id,
                is_active: false,
            }),
            None => Some(GraphChange::CreateGroupPermission {
                group_id,
                permission_id,
                is_active: false,
            }),
        };
        if let Some(change) = change {
            self.changes.push(change);
            outcome.changed_groups.push(group_id);
            outcome.affected_users.extend(self.graph.members(group_id));
        }
        outcome
    }

    /// Returns `true` if the grant row was created or flipped.
    fn mark_active(&mut self, idx: GroupIdx, permission_id: Uuid) -> bool {
        let group_id = self.graph.group_id(idx);
        let change = match self.graph.grant_at(idx, permission_id) {
            Some(true) => return false,
            Some(false) => GraphChange::SetGroupPermissionActive {
                group_id,
                permission_id,
                is_active: true,
            },
            None => GraphChange::CreateGroupPermission {
                group_id,
                permission_id,
                is_active: true,
            },
        };
        self.graph.set_grant_at(idx, permission_id, true);
        self.changes.push(change);
        true
    }
}

/// Run several activation changes on one snapshot and fold their outcomes.
pub fn apply_activations(
    propagation: &mut Propagation<'_>,
    updates: impl IntoIterator<Item = (Uuid, Uuid, bool)>,
) -> PropagationOutcome {
    let mut total = PropagationOutcome::default();
    for (group_id, permission_id, active) in updates {
        total.merge(propagation.set_group_permission_active(group_id, permission_id, active));
    }
    total
}
