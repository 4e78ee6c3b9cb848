//! Domain models for rolegate.
//!
//! These are the core types shared across all crates.

pub mod group;
pub mod group_permission;
pub mod permission;
pub mod user;
