//! In-memory snapshot of the membership and grant graph.
//!
//! Users and groups live in arenas addressed by index; edges are stored as
//! index sets on both ends so that "members of a group" and "groups of a
//! user" are both cheap. The propagation engine mutates a snapshot in place
//! while recording the equivalent store mutations in a [`ChangeSet`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use uuid::Uuid;

use crate::models::group_permission::GroupPermission;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct UserIdx(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct GroupIdx(usize);

#[derive(Debug, Clone)]
struct UserNode {
    id: Uuid,
    groups: BTreeSet<GroupIdx>,
    direct: BTreeSet<Uuid>,
}

#[derive(Debug, Clone)]
struct GroupNode {
    id: Uuid,
    members: BTreeSet<UserIdx>,
    /// permission id -> is_active
    grants: BTreeMap<Uuid, bool>,
}

#[derive(Debug, Clone, Default)]
pub struct AccessGraph {
    users: Vec<UserNode>,
    groups: Vec<GroupNode>,
    user_index: HashMap<Uuid, UserIdx>,
    group_index: HashMap<Uuid, GroupIdx>,
}

impl AccessGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from the three edge sets held by the store.
    pub fn from_edges(
        memberships: impl IntoIterator<Item = (Uuid, Uuid)>,
        grants: impl IntoIterator<Item = GroupPermission>,
        direct_grants: impl IntoIterator<Item = (Uuid, Uuid)>,
    ) -> Self {
        let mut graph = Self::new();
        for (user_id, group_id) in memberships {
            graph.add_membership(user_id, group_id);
        }
        for grant in grants {
            graph.set_grant(grant.group_id, grant.permission_id, grant.is_active);
        }
        for (user_id, permission_id) in direct_grants {
            graph.add_direct_permission(user_id, permission_id);
        }
        graph
    }

    fn user_slot(&mut self, id: Uuid) -> UserIdx {
        if let Some(idx) = self.user_index.get(&id) {
            return *idx;
        }
        let idx = UserIdx(self.users.len());
        self.users.push(UserNode {
            id,
            groups: BTreeSet::new(),
            direct: BTreeSet::new(),
        });
        self.user_index.insert(id, idx);
        idx
    }

    fn group_slot(&mut self, id: Uuid) -> GroupIdx {
        if let Some(idx) = self.group_index.get(&id) {
            return *idx;
        }
        let idx = GroupIdx(self.groups.len());
        self.groups.push(GroupNode {
            id,
            members: BTreeSet::new(),
            grants: BTreeMap::new(),
        });
        self.group_index.insert(id, idx);
        idx
    }

    pub(crate) fn group_idx(&mut self, id: Uuid) -> GroupIdx {
        self.group_slot(id)
    }

    pub(crate) fn group_id(&self, idx: GroupIdx) -> Uuid {
        self.groups[idx.0].id
    }

    /// Groups sharing at least one member with `idx`, excluding `idx`.
    pub(crate) fn neighbours(&self, idx: GroupIdx) -> BTreeSet<GroupIdx> {
        self.groups[idx.0]
            .members
            .iter()
            .flat_map(|u| self.users[u.0].groups.iter().copied())
            .filter(|g| *g != idx)
            .collect()
    }

    pub(crate) fn grant_at(&self, idx: GroupIdx, permission_id: Uuid) -> Option<bool> {
        self.groups[idx.0].grants.get(&permission_id).copied()
    }

    pub(crate) fn set_grant_at(&mut self, idx: GroupIdx, permission_id: Uuid, active: bool) {
        self.groups[idx.0].grants.insert(permission_id, active);
    }

    pub(crate) fn member_ids_at(&self, idx: GroupIdx) -> impl Iterator<Item = Uuid> + '_ {
        self.groups[idx.0].members.iter().map(|u| self.users[u.0].id)
    }

    pub fn contains_user(&self, user_id: Uuid) -> bool {
        self.user_index.contains_key(&user_id)
    }

    pub fn contains_group(&self, group_id: Uuid) -> bool {
        self.group_index.contains_key(&group_id)
    }

    /// Register a group without edges. Returns `false` if it was known.
    pub fn add_group(&mut self, group_id: Uuid) -> bool {
        let known = self.contains_group(group_id);
        self.group_slot(group_id);
        !known
    }

    /// Returns `false` if the membership already existed.
    pub fn add_membership(&mut self, user_id: Uuid, group_id: Uuid) -> bool {
        let u = self.user_slot(user_id);
        let g = self.group_slot(group_id);
        self.groups[g.0].members.insert(u);
        self.users[u.0].groups.insert(g)
    }

    /// Returns `false` if there was no such membership.
    pub fn remove_membership(&mut self, user_id: Uuid, group_id: Uuid) -> bool {
        let (Some(&u), Some(&g)) = (self.user_index.get(&user_id), self.group_index.get(&group_id))
        else {
            return false;
        };
        self.groups[g.0].members.remove(&u);
        self.users[u.0].groups.remove(&g)
    }

    pub fn is_member(&self, user_id: Uuid, group_id: Uuid) -> bool {
        match (self.user_index.get(&user_id), self.group_index.get(&group_id)) {
            (Some(u), Some(g)) => self.users[u.0].groups.contains(g),
            _ => false,
        }
    }

    /// Create or update a grant; returns the previous activation state.
    pub fn set_grant(&mut self, group_id: Uuid, permission_id: Uuid, active: bool) -> Option<bool> {
        let g = self.group_slot(group_id);
        self.groups[g.0].grants.insert(permission_id, active)
    }

    pub fn remove_grant(&mut self, group_id: Uuid, permission_id: Uuid) -> Option<bool> {
        let g = self.group_index.get(&group_id)?;
        self.groups[g.0].grants.remove(&permission_id)
    }

    pub fn grant(&self, group_id: Uuid, permission_id: Uuid) -> Option<bool> {
        let g = self.group_index.get(&group_id)?;
        self.groups[g.0].grants.get(&permission_id).copied()
    }

    pub fn grants(&self, group_id: Uuid) -> Vec<GroupPermission> {
        let Some(g) = self.group_index.get(&group_id) else {
            return Vec::new();
        };
        self.groups[g.0]
            .grants
            .iter()
            .map(|(permission_id, is_active)| GroupPermission {
                group_id,
                permission_id: *permission_id,
                is_active: *is_active,
            })
            .collect()
    }

    pub fn add_direct_permission(&mut self, user_id: Uuid, permission_id: Uuid) -> bool {
        let u = self.user_slot(user_id);
        self.users[u.0].direct.insert(permission_id)
    }

    pub fn remove_direct_permission(&mut self, user_id: Uuid, permission_id: Uuid) -> bool {
        match self.user_index.get(&user_id) {
            Some(u) => self.users[u.0].direct.remove(&permission_id),
            None => false,
        }
    }

    pub fn has_direct_permission(&self, user_id: Uuid, permission_id: Uuid) -> bool {
        self.user_index
            .get(&user_id)
            .is_some_and(|u| self.users[u.0].direct.contains(&permission_id))
    }

    pub fn members(&self, group_id: Uuid) -> Vec<Uuid> {
        match self.group_index.get(&group_id) {
            Some(g) => self.member_ids_at(*g).collect(),
            None => Vec::new(),
        }
    }

    pub fn groups_of(&self, user_id: Uuid) -> Vec<Uuid> {
        match self.user_index.get(&user_id) {
            Some(u) => self.users[u.0]
                .groups
                .iter()
                .map(|g| self.groups[g.0].id)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Detach a user from every group and drop its direct grants.
    pub fn remove_user(&mut self, user_id: Uuid) {
        let Some(u) = self.user_index.remove(&user_id) else {
            return;
        };
        let groups = std::mem::take(&mut self.users[u.0].groups);
        for g in groups {
            self.groups[g.0].members.remove(&u);
        }
        self.users[u.0].direct.clear();
    }

    /// Detach a group from every member and drop its grants. Returns the
    /// former members.
    pub fn remove_group(&mut self, group_id: Uuid) -> Vec<Uuid> {
        let Some(g) = self.group_index.remove(&group_id) else {
            return Vec::new();
        };
        let members = std::mem::take(&mut self.groups[g.0].members);
        self.groups[g.0].grants.clear();
        members
            .into_iter()
            .map(|u| {
                self.users[u.0].groups.remove(&g);
                self.users[u.0].id
            })
            .collect()
    }

    /// Groups holding a grant row for `permission_id`.
    pub fn groups_granting(&self, permission_id: Uuid) -> Vec<Uuid> {
        self.group_index
            .values()
            .filter(|g| self.groups[g.0].grants.contains_key(&permission_id))
            .map(|g| self.groups[g.0].id)
            .collect()
    }

    /// Users holding `permission_id` as a direct grant.
    pub fn users_granted(&self, permission_id: Uuid) -> Vec<Uuid> {
        self.user_index
            .values()
            .filter(|u| self.users[u.0].direct.contains(&permission_id))
            .map(|u| self.users[u.0].id)
            .collect()
    }

    /// Union of direct grants and active grants of the user's groups.
    pub fn effective_permissions(&self, user_id: Uuid) -> BTreeSet<Uuid> {
        let Some(u) = self.user_index.get(&user_id) else {
            return BTreeSet::new();
        };
        let node = &self.users[u.0];
        let mut effective = node.direct.clone();
        for g in &node.groups {
            effective.extend(
                self.groups[g.0]
                    .grants
                    .iter()
                    .filter(|(_, active)| **active)
                    .map(|(permission_id, _)| *permission_id),
            );
        }
        effective
    }
}

/// A single store mutation produced by the propagation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphChange {
    /// Insert a group record. Must precede the edges that reference it.
    CreateGroup {
        group_id: Uuid,
        name: String,
    },
    CreateGroupPermission {
        group_id: Uuid,
        permission_id: Uuid,
        is_active: bool,
    },
    SetGroupPermissionActive {
        group_id: Uuid,
        permission_id: Uuid,
        is_active: bool,
    },
    DeleteGroupPermission {
        group_id: Uuid,
        permission_id: Uuid,
    },
    AddMember {
        user_id: Uuid,
        group_id: Uuid,
    },
    RemoveMember {
        user_id: Uuid,
        group_id: Uuid,
    },
    GrantUserPermission {
        user_id: Uuid,
        permission_id: Uuid,
    },
    RevokeUserPermission {
        user_id: Uuid,
        permission_id: Uuid,
    },
    /// Remove the user record and every edge touching it.
    DeleteUser { user_id: Uuid },
    /// Remove the group record, its memberships and its grant rows.
    DeleteGroup { group_id: Uuid },
    /// Remove the permission record and every grant referencing it.
    DeletePermission { permission_id: Uuid },
}

/// Ordered list of mutations applied by the store as one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<GraphChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: GraphChange) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GraphChange> {
        self.changes.iter()
    }
}

impl IntoIterator for ChangeSet {
    type Item = GraphChange;
    type IntoIter = std::vec::IntoIter<GraphChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a GraphChange;
    type IntoIter = std::slice::Iter<'a, GraphChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_is_tracked_on_both_ends() {
        let (u, g) = (Uuid::new_v4(), Uuid::new_v4());
        let mut graph = AccessGraph::new();
        assert!(graph.add_membership(u, g));
        assert!(!graph.add_membership(u, g));
        assert_eq!(graph.members(g), vec![u]);
        assert_eq!(graph.groups_of(u), vec![g]);
        assert!(graph.remove_membership(u, g));
        assert!(graph.members(g).is_empty());
        assert!(!graph.is_member(u, g));
    }

    #[test]
    fn effective_permissions_union_active_and_direct() {
        let (u, g1, g2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (p_active, p_inactive, p_direct) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let graph = AccessGraph::from_edges(
            [(u, g1), (u, g2)],
            [
                GroupPermission {
                    group_id: g1,
                    permission_id: p_active,
                    is_active: true,
                },
                GroupPermission {
                    group_id: g2,
                    permission_id: p_inactive,
                    is_active: false,
                },
            ],
            [(u, p_direct)],
        );

        let effective = graph.effective_permissions(u);
        assert!(effective.contains(&p_active));
        assert!(effective.contains(&p_direct));
        assert!(!effective.contains(&p_inactive));
    }

    #[test]
    fn removing_a_group_detaches_members() {
        let (u1, u2, g, other) = (
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        let mut graph = AccessGraph::from_edges([(u1, g), (u2, g), (u1, other)], [], []);
        graph.set_grant(g, Uuid::new_v4(), true);

        let mut former = graph.remove_group(g);
        former.sort();
        let mut expected = vec![u1, u2];
        expected.sort();
        assert_eq!(former, expected);
        assert_eq!(graph.groups_of(u1), vec![other]);
        assert!(graph.groups_of(u2).is_empty());
        assert!(!graph.contains_group(g));
    }

    #[test]
    fn neighbours_exclude_the_group_itself() {
        let (u, g1, g2, g3) = (
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        let mut graph = AccessGraph::from_edges([(u, g1), (u, g2)], [], []);
        let i1 = graph.group_idx(g1);
        let i2 = graph.group_idx(g2);
        let i3 = graph.group_idx(g3);
        let neighbours = graph.neighbours(i1);
        assert!(neighbours.contains(&i2));
        assert!(!neighbours.contains(&i1));
        assert!(!neighbours.contains(&i3));
    }
}
