//! rolegate access layer: the aggregate service that ties the role policy,
//! permission propagation and entity store together, plus the lock scopes
//! and session-user cache it relies on.

pub mod cache;
pub mod config;
pub mod locks;
pub mod service;

pub use cache::{SessionUser, SessionUserCache};
pub use config::AccessConfig;
pub use service::AccessService;
