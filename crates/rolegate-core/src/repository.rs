//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Entity repositories cover record
//! CRUD; edges and cascading deletes go through [`AccessGraphStore`] so that
//! one use case lands as one transaction.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::error::RolegateResult;
use crate::graph::{AccessGraph, ChangeSet};
use crate::models::{
    group::{CreateGroup, Group, UpdateGroup},
    group_permission::GroupPermission,
    permission::{CreatePermission, Permission, UpdatePermission},
    user::{CreateUser, UpdateUser, User},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = RolegateResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = RolegateResult<User>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = RolegateResult<User>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateUser,
    ) -> impl Future<Output = RolegateResult<User>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = RolegateResult<PaginatedResult<User>>> + Send;
    /// Case-insensitive substring match on email and name fields.
    fn search(
        &self,
        query: &str,
        pagination: Pagination,
    ) -> impl Future<Output = RolegateResult<PaginatedResult<User>>> + Send;
    /// Direct per-user grants, independent of groups.
    fn get_direct_permissions(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = RolegateResult<Vec<Permission>>> + Send;
}

pub trait GroupRepository: Send + Sync {
    /// Creates the record only; members and grants are graph edges.
    fn create(&self, input: CreateGroup) -> impl Future<Output = RolegateResult<Group>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = RolegateResult<Group>> + Send;
    fn get_by_name(&self, name: &str) -> impl Future<Output = RolegateResult<Group>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateGroup,
    ) -> impl Future<Output = RolegateResult<Group>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = RolegateResult<PaginatedResult<Group>>> + Send;
    fn search(
        &self,
        query: &str,
        pagination: Pagination,
    ) -> impl Future<Output = RolegateResult<PaginatedResult<Group>>> + Send;
    fn get_members(&self, group_id: Uuid) -> impl Future<Output = RolegateResult<Vec<User>>> + Send;
    fn get_user_groups(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = RolegateResult<Vec<Group>>> + Send;
}

pub trait PermissionRepository: Send + Sync {
    fn create(
        &self,
        input: CreatePermission,
    ) -> impl Future<Output = RolegateResult<Permission>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = RolegateResult<Permission>> + Send;
    fn get_by_name(&self, name: &str) -> impl Future<Output = RolegateResult<Permission>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdatePermission,
    ) -> impl Future<Output = RolegateResult<Permission>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = RolegateResult<PaginatedResult<Permission>>> + Send;
    fn search(
        &self,
        query: &str,
        pagination: Pagination,
    ) -> impl Future<Output = RolegateResult<PaginatedResult<Permission>>> + Send;
}

/// Membership and grant edges, plus cascading deletes.
pub trait AccessGraphStore: Send + Sync {
    /// Snapshot of every membership, group grant and direct user grant.
    fn load_graph(&self) -> impl Future<Output = RolegateResult<AccessGraph>> + Send;
    /// Apply every change atomically, or none of them.
    fn apply(&self, changes: ChangeSet) -> impl Future<Output = RolegateResult<()>> + Send;
    fn get_group_permission(
        &self,
        group_id: Uuid,
        permission_id: Uuid,
    ) -> impl Future<Output = RolegateResult<GroupPermission>> + Send;
    fn list_group_permissions(
        &self,
        group_id: Uuid,
    ) -> impl Future<Output = RolegateResult<Vec<GroupPermission>>> + Send;
    /// Direct grants plus active grants of the user's groups, read from the
    /// store.
    fn effective_permissions(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = RolegateResult<BTreeSet<Uuid>>> + Send;
}
