//! Integration tests for the Group repository using in-memory SurrealDB.

use rolegate_core::error::RolegateError;
use rolegate_core::graph::{ChangeSet, GraphChange};
use rolegate_core::models::group::{CreateGroup, UpdateGroup};
use rolegate_core::models::user::{CreateUser, Role};
use rolegate_core::repository::{AccessGraphStore, GroupRepository, Pagination, UserRepository};
use rolegate_db::repository::{
    SurrealAccessGraphStore, SurrealGroupRepository, SurrealUserRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

/// Helper: spin up in-memory DB, run migrations, create 2 users.
async fn setup() -> (Surreal<Db>, Uuid, Uuid) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    rolegate_db::run_migrations(&db).await.unwrap();

    let users = SurrealUserRepository::new(db.clone());
    let mut ids = Vec::new();
    for (email, name) in [("alice@example.com", "Alice"), ("bob@example.com", "Bob")] {
        let user = users
            .create(CreateUser {
                email: email.into(),
                first_name: name.into(),
                last_name: "Tester".into(),
                role: Role::User,
            })
            .await
            .unwrap();
        ids.push(user.id);
    }

    (db, ids[0], ids[1])
}

fn named(name: &str) -> CreateGroup {
    CreateGroup {
        name: name.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn create_and_get_group() {
    let (db, _, _) = setup().await;
    let repo = SurrealGroupRepository::new(db);

    let group = repo.create(named("Developers")).await.unwrap();
    assert_eq!(group.name, "Developers");

    let fetched = repo.get_by_id(group.id).await.unwrap();
    assert_eq!(fetched.id, group.id);

    let by_name = repo.get_by_name("Developers").await.unwrap();
    assert_eq!(by_name.id, group.id);
}

#[tokio::test]
async fn rename_group() {
    let (db, _, _) = setup().await;
    let repo = SurrealGroupRepository::new(db);

    let group = repo.create(named("Original")).await.unwrap();
    let updated = repo
        .update(
            group.id,
            UpdateGroup {
                name: Some("Renamed".into()),
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.name, "Renamed");
    assert!(repo.get_by_name("Original").await.is_err());
}

#[tokio::test]
async fn list_groups_with_pagination() {
    let (db, _, _) = setup().await;
    let repo = SurrealGroupRepository::new(db);

    for i in 0..5 {
        repo.create(named(&format!("group-{i}"))).await.unwrap();
    }

    let page1 = repo
        .list(Pagination {
            offset: 0,
            limit: 3,
        })
        .await
        .unwrap();
    assert_eq!(page1.items.len(), 3);
    assert_eq!(page1.total, 5);

    let page2 = repo
        .list(Pagination {
            offset: 3,
            limit: 3,
        })
        .await
        .unwrap();
    assert_eq!(page2.items.len(), 2);

    let search = repo.search("GROUP-4", Pagination::default()).await.unwrap();
    assert_eq!(search.total, 1);
}

#[tokio::test]
async fn duplicate_name_rejected() {
    let (db, _, _) = setup().await;
    let repo = SurrealGroupRepository::new(db);

    repo.create(named("Ops")).await.unwrap();
    let err = repo.create(named("Ops")).await.unwrap_err();
    assert!(matches!(err, RolegateError::Validation { .. }), "{err:?}");

    let other = repo.create(named("Dev")).await.unwrap();
    let err = repo
        .update(
            other.id,
            UpdateGroup {
                name: Some("Ops".into()),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
}

#[tokio::test]
async fn members_and_user_groups_follow_edges() {
    let (db, alice, bob) = setup().await;
    let repo = SurrealGroupRepository::new(db.clone());
    let store = SurrealAccessGraphStore::new(db);

    let devs = repo.create(named("Developers")).await.unwrap();
    let ops = repo.create(named("Ops")).await.unwrap();

    let mut changes = ChangeSet::new();
    for (user_id, group_id) in [(alice, devs.id), (bob, devs.id), (alice, ops.id)] {
        changes.push(GraphChange::AddMember { user_id, group_id });
    }
    store.apply(changes).await.unwrap();

    let members = repo.get_members(devs.id).await.unwrap();
    assert_eq!(members.len(), 2);

    let groups = repo.get_user_groups(alice).await.unwrap();
    let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["Developers", "Ops"]);

    assert!(repo.get_user_groups(bob).await.unwrap().len() == 1);
}
