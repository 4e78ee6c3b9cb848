//! Lock scopes around access-graph mutations.
//!
//! Every mutating use case reads a graph snapshot, plans its changes and
//! commits them while holding one of two scopes:
//!
//! - [`GrantScope`]: shared structural lock plus an exclusive lock on one
//!   permission. Activations of different permissions run concurrently,
//!   activations of the same permission are serialized.
//! - [`StructuralScope`]: exclusive structural lock, for membership edits,
//!   deletes and anything touching several permissions at once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
pub struct GraphLocks {
    structure: RwLock<()>,
    grants: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

#[must_use = "the lock is released as soon as the scope is dropped"]
pub struct GrantScope<'a> {
    _structure: RwLockReadGuard<'a, ()>,
    _grant: OwnedMutexGuard<()>,
}

#[must_use = "the lock is released as soon as the scope is dropped"]
pub struct StructuralScope<'a> {
    _structure: RwLockWriteGuard<'a, ()>,
}

impl GraphLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant_scope(&self, permission_id: Uuid) -> GrantScope<'_> {
        let structure = self.structure.read().await;
        let lock = {
            let mut grants = self.grants.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop locks nobody is holding or waiting on.
            grants.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(grants.entry(permission_id).or_default())
        };
        let grant = lock.lock_owned().await;
        GrantScope {
            _structure: structure,
            _grant: grant,
        }
    }

    pub async fn structural_scope(&self) -> StructuralScope<'_> {
        StructuralScope {
            _structure: self.structure.write().await,
        }
    }

    #[cfg(test)]
    fn tracked_permissions(&self) -> usize {
        self.grants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn different_permissions_do_not_block_each_other() {
        let locks = GraphLocks::new();
        let _a = locks.grant_scope(Uuid::new_v4()).await;
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.grant_scope(Uuid::new_v4()),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn same_permission_is_serialized() {
        let locks = GraphLocks::new();
        let permission = Uuid::new_v4();
        let _held = locks.grant_scope(permission).await;
        let second =
            tokio::time::timeout(Duration::from_millis(50), locks.grant_scope(permission)).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn structural_scope_excludes_grant_scopes() {
        let locks = GraphLocks::new();
        let _structural = locks.structural_scope().await;
        let grant = tokio::time::timeout(
            Duration::from_millis(50),
            locks.grant_scope(Uuid::new_v4()),
        )
        .await;
        assert!(grant.is_err());
    }

    #[tokio::test]
    async fn released_permission_locks_are_pruned() {
        let locks = GraphLocks::new();
        for _ in 0..3 {
            let _scope = locks.grant_scope(Uuid::new_v4()).await;
        }
        let _last = locks.grant_scope(Uuid::new_v4()).await;
        assert_eq!(locks.tracked_permissions(), 1);
    }
}
