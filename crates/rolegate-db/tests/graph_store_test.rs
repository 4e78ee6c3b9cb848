//! Integration tests for the access graph store using in-memory SurrealDB.

use rolegate_core::graph::{ChangeSet, GraphChange};
use rolegate_core::models::group::CreateGroup;
use rolegate_core::models::permission::CreatePermission;
use rolegate_core::models::user::{CreateUser, Role};
use rolegate_core::repository::{
    AccessGraphStore, GroupRepository, PermissionRepository, UserRepository,
};
use rolegate_db::repository::{
    SurrealAccessGraphStore, SurrealGroupRepository, SurrealPermissionRepository,
    SurrealUserRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

struct Fixture {
    db: Surreal<Db>,
    store: SurrealAccessGraphStore<Db>,
    user: Uuid,
    group: Uuid,
    permission: Uuid,
}

async fn setup() -> Fixture {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    rolegate_db::run_migrations(&db).await.unwrap();

    let user = SurrealUserRepository::new(db.clone())
        .create(CreateUser {
            email: "alice@example.com".into(),
            first_name: "Alice".into(),
            last_name: "Tester".into(),
            role: Role::User,
        })
        .await
        .unwrap();
    let group = SurrealGroupRepository::new(db.clone())
        .create(CreateGroup {
            name: "Developers".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let permission = SurrealPermissionRepository::new(db.clone())
        .create(CreatePermission {
            name: "repo.push".into(),
            description: String::new(),
        })
        .await
        .unwrap();

    Fixture {
        store: SurrealAccessGraphStore::new(db.clone()),
        db,
        user: user.id,
        group: group.id,
        permission: permission.id,
    }
}

fn change_set(changes: impl IntoIterator<Item = GraphChange>) -> ChangeSet {
    let mut set = ChangeSet::new();
    for change in changes {
        set.push(change);
    }
    set
}

#[tokio::test]
async fn applied_edges_round_trip_through_the_snapshot() {
    let f = setup().await;
    f.store
        .apply(change_set([
            GraphChange::AddMember {
                user_id: f.user,
                group_id: f.group,
            },
            GraphChange::CreateGroupPermission {
                group_id: f.group,
                permission_id: f.permission,
                is_active: false,
            },
        ]))
        .await
        .unwrap();

    let graph = f.store.load_graph().await.unwrap();
    assert!(graph.is_member(f.user, f.group));
    assert_eq!(graph.grant(f.group, f.permission), Some(false));

    let row = f
        .store
        .get_group_permission(f.group, f.permission)
        .await
        .unwrap();
    assert!(!row.is_active);
    assert!(
        f.store
            .effective_permissions(f.user)
            .await
            .unwrap()
            .is_empty()
    );

    f.store
        .apply(change_set([GraphChange::SetGroupPermissionActive {
            group_id: f.group,
            permission_id: f.permission,
            is_active: true,
        }]))
        .await
        .unwrap();
    assert!(
        f.store
            .effective_permissions(f.user)
            .await
            .unwrap()
            .contains(&f.permission)
    );
}

#[tokio::test]
async fn failing_change_set_leaves_store_untouched() {
    let f = setup().await;

    // The second RELATE violates the unique (in, out) index.
    let result = f
        .store
        .apply(change_set([
            GraphChange::CreateGroupPermission {
                group_id: f.group,
                permission_id: f.permission,
                is_active: true,
            },
            GraphChange::AddMember {
                user_id: f.user,
                group_id: f.group,
            },
            GraphChange::AddMember {
                user_id: f.user,
                group_id: f.group,
            },
        ]))
        .await;
    assert!(result.is_err());

    let graph = f.store.load_graph().await.unwrap();
    assert!(!graph.is_member(f.user, f.group));
    assert_eq!(graph.grant(f.group, f.permission), None);
}

#[tokio::test]
async fn deleting_a_permission_removes_every_reference() {
    let f = setup().await;
    f.store
        .apply(change_set([
            GraphChange::AddMember {
                user_id: f.user,
                group_id: f.group,
            },
            GraphChange::CreateGroupPermission {
                group_id: f.group,
                permission_id: f.permission,
                is_active: true,
            },
            GraphChange::GrantUserPermission {
                user_id: f.user,
                permission_id: f.permission,
            },
        ]))
        .await
        .unwrap();

    f.store
        .apply(change_set([GraphChange::DeletePermission {
            permission_id: f.permission,
        }]))
        .await
        .unwrap();

    assert!(
        f.store
            .list_group_permissions(f.group)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        f.store
            .effective_permissions(f.user)
            .await
            .unwrap()
            .is_empty()
    );
    let permissions = SurrealPermissionRepository::new(f.db.clone());
    assert!(permissions.get_by_id(f.permission).await.is_err());

    let mut result = f
        .db
        .query("SELECT * FROM has_permission")
        .await
        .unwrap();
    let rows: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn deleting_a_group_detaches_members() {
    let f = setup().await;
    f.store
        .apply(change_set([
            GraphChange::AddMember {
                user_id: f.user,
                group_id: f.group,
            },
            GraphChange::CreateGroupPermission {
                group_id: f.group,
                permission_id: f.permission,
                is_active: true,
            },
        ]))
        .await
        .unwrap();

    f.store
        .apply(change_set([GraphChange::DeleteGroup { group_id: f.group }]))
        .await
        .unwrap();

    let groups = SurrealGroupRepository::new(f.db.clone());
    assert!(groups.get_by_id(f.group).await.is_err());
    assert!(groups.get_user_groups(f.user).await.unwrap().is_empty());
    let graph = f.store.load_graph().await.unwrap();
    assert!(graph.groups_of(f.user).is_empty());
}

#[tokio::test]
async fn missing_grant_row_is_not_found() {
    let f = setup().await;
    let err = f
        .store
        .get_group_permission(f.group, f.permission)
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn edges_to_missing_records_are_rejected() {
    let f = setup().await;
    let ghost = Uuid::new_v4();

    let result = f
        .store
        .apply(change_set([
            GraphChange::AddMember {
                user_id: f.user,
                group_id: f.group,
            },
            GraphChange::CreateGroupPermission {
                group_id: ghost,
                permission_id: f.permission,
                is_active: true,
            },
        ]))
        .await;
    assert!(result.is_err());

    let graph = f.store.load_graph().await.unwrap();
    assert!(!graph.is_member(f.user, f.group));
    assert!(!graph.contains_group(ghost));
}

#[tokio::test]
async fn group_record_and_edges_commit_together() {
    let f = setup().await;
    let groups = SurrealGroupRepository::new(f.db.clone());
    let created = Uuid::new_v4();

    f.store
        .apply(change_set([
            GraphChange::CreateGroup {
                group_id: created,
                name: "Release Team".into(),
            },
            GraphChange::AddMember {
                user_id: f.user,
                group_id: created,
            },
            GraphChange::CreateGroupPermission {
                group_id: created,
                permission_id: f.permission,
                is_active: true,
            },
        ]))
        .await
        .unwrap();

    let group = groups.get_by_id(created).await.unwrap();
    assert_eq!(group.name, "Release Team");
    assert!(
        f.store
            .effective_permissions(f.user)
            .await
            .unwrap()
            .contains(&f.permission)
    );
}

#[tokio::test]
async fn failed_group_creation_leaves_no_record() {
    let f = setup().await;
    let groups = SurrealGroupRepository::new(f.db.clone());
    let created = Uuid::new_v4();

    let result = f
        .store
        .apply(change_set([
            GraphChange::CreateGroup {
                group_id: created,
                name: "Orphan".into(),
            },
            GraphChange::AddMember {
                user_id: Uuid::new_v4(),
                group_id: created,
            },
        ]))
        .await;
    assert!(result.is_err());
    assert_eq!(groups.get_by_id(created).await.unwrap_err().http_status(), 404);

    // A name clash inside a change set is reported as a validation error.
    let err = f
        .store
        .apply(change_set([GraphChange::CreateGroup {
            group_id: Uuid::new_v4(),
            name: "Developers".into(),
        }]))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
}
