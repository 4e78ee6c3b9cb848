//! rolegate process entry point.

mod config;

use rolegate_access::AccessService;
use rolegate_core::error::RolegateError;
use rolegate_core::models::user::{CreateUser, Role};
use rolegate_core::repository::UserRepository;
use rolegate_db::repository::{
    SurrealAccessGraphStore, SurrealGroupRepository, SurrealPermissionRepository,
    SurrealUserRepository,
};
use rolegate_db::{DbError, DbManager};
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::{BootstrapRoot, LogConfig, ServerConfig};

#[derive(Debug, Error)]
enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("database connection failed: {0}")]
    Connect(#[from] surrealdb::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] DbError),

    #[error("root admin bootstrap failed: {0}")]
    Bootstrap(#[from] RolegateError),

    #[error("signal handler failed: {0}")]
    Signal(#[from] std::io::Error),
}

fn init_tracing(log: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Seed the root admin unless a user with that email already exists.
async fn bootstrap_root(db: &Surreal<Any>, seed: &BootstrapRoot) -> Result<(), RolegateError> {
    let users = SurrealUserRepository::new(db.clone());
    match users.get_by_email(&seed.email).await {
        Ok(existing) => {
            tracing::info!(user_id = %existing.id, "Root admin already present");
            Ok(())
        }
        Err(RolegateError::NotFound { .. }) => {
            let root = users
                .create(CreateUser {
                    email: seed.email.clone(),
                    first_name: seed.first_name.clone(),
                    last_name: seed.last_name.clone(),
                    role: Role::RootAdmin,
                })
                .await?;
            tracing::info!(user_id = %root.id, "Root admin seeded");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn run() -> Result<(), StartupError> {
    let config = ServerConfig::load()?;
    init_tracing(&config.log);
    tracing::info!(url = %config.db.url, "Starting rolegate");

    let manager = DbManager::connect(&config.db).await?;
    let db = manager.client().clone();
    rolegate_db::run_migrations(&db).await?;

    if let Some(seed) = &config.bootstrap_root {
        bootstrap_root(&db, seed).await?;
    }

    let _service = AccessService::new(
        SurrealUserRepository::new(db.clone()),
        SurrealGroupRepository::new(db.clone()),
        SurrealPermissionRepository::new(db.clone()),
        SurrealAccessGraphStore::new(db),
        config.access,
    );
    tracing::info!("Access service ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("rolegate: {e}");
        std::process::exit(1);
    }
}
