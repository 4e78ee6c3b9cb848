//! Integration tests for the User and Permission repositories using
//! in-memory SurrealDB.

use rolegate_core::error::RolegateError;
use rolegate_core::models::permission::{CreatePermission, UpdatePermission};
use rolegate_core::models::user::{CreateUser, Role, UpdateUser};
use rolegate_core::repository::{Pagination, PermissionRepository, UserRepository};
use rolegate_db::repository::{SurrealPermissionRepository, SurrealUserRepository};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    rolegate_db::run_migrations(&db).await.unwrap();
    db
}

fn new_user(email: &str, first: &str) -> CreateUser {
    CreateUser {
        email: email.into(),
        first_name: first.into(),
        last_name: "Tester".into(),
        role: Role::User,
    }
}

#[tokio::test]
async fn create_and_fetch_user() {
    let repo = SurrealUserRepository::new(setup().await);

    let user = repo
        .create(new_user("alice@example.com", "Alice"))
        .await
        .unwrap();
    assert_eq!(user.role, Role::User);
    assert!(user.avatar_url.is_none());

    let by_id = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(by_id, user);

    let by_email = repo.get_by_email("alice@example.com").await.unwrap();
    assert_eq!(by_email.id, user.id);
}

#[tokio::test]
async fn missing_user_is_not_found() {
    let repo = SurrealUserRepository::new(setup().await);
    let err = repo.get_by_id(uuid::Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn duplicate_email_rejected() {
    let repo = SurrealUserRepository::new(setup().await);
    repo.create(new_user("dup@example.com", "One"))
        .await
        .unwrap();
    let err = repo
        .create(new_user("dup@example.com", "Two"))
        .await
        .unwrap_err();
    assert!(matches!(err, RolegateError::Validation { .. }), "{err:?}");
}

#[tokio::test]
async fn update_sets_and_clears_avatar() {
    let repo = SurrealUserRepository::new(setup().await);
    let user = repo
        .create(new_user("bob@example.com", "Bob"))
        .await
        .unwrap();

    let updated = repo
        .update(
            user.id,
            UpdateUser {
                avatar_url: Some(Some("avatars/bob.png".into())),
                role: Some(Role::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.avatar_url.as_deref(), Some("avatars/bob.png"));
    assert_eq!(updated.role, Role::Admin);
    assert_eq!(updated.first_name, "Bob");

    let cleared = repo
        .update(
            user.id,
            UpdateUser {
                avatar_url: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(cleared.avatar_url.is_none());
}

#[tokio::test]
async fn search_matches_name_and_email_substrings() {
    let repo = SurrealUserRepository::new(setup().await);
    repo.create(new_user("carol@corp.io", "Carol"))
        .await
        .unwrap();
    repo.create(new_user("dave@corp.io", "Dave"))
        .await
        .unwrap();
    repo.create(new_user("erin@home.net", "Erin"))
        .await
        .unwrap();

    let corp = repo.search("CORP", Pagination::default()).await.unwrap();
    assert_eq!(corp.total, 2);

    let carol = repo.search("caro", Pagination::default()).await.unwrap();
    assert_eq!(carol.items.len(), 1);
    assert_eq!(carol.items[0].first_name, "Carol");

    let all = repo
        .list(Pagination {
            offset: 1,
            limit: 10,
        })
        .await
        .unwrap();
    assert_eq!(all.total, 3);
    assert_eq!(all.items.len(), 2);
}

#[tokio::test]
async fn permission_crud_and_search() {
    let repo = SurrealPermissionRepository::new(setup().await);

    let read = repo
        .create(CreatePermission {
            name: "reports.read".into(),
            description: "Read reports".into(),
        })
        .await
        .unwrap();
    repo.create(CreatePermission {
        name: "reports.write".into(),
        description: String::new(),
    })
    .await
    .unwrap();

    assert_eq!(repo.get_by_name("reports.read").await.unwrap().id, read.id);

    let renamed = repo
        .update(
            read.id,
            UpdatePermission {
                name: Some("reports.view".into()),
                description: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "reports.view");
    assert_eq!(renamed.description, "Read reports");

    let found = repo.search("write", Pagination::default()).await.unwrap();
    assert_eq!(found.total, 1);

    let duplicate = repo
        .create(CreatePermission {
            name: "reports.write".into(),
            description: String::new(),
        })
        .await;
    assert_eq!(duplicate.unwrap_err().http_status(), 400);
}
