//! Core domain for rolegate: models, error taxonomy, store traits, the role
//! hierarchy policy and the permission propagation engine.

pub mod error;
pub mod graph;
pub mod models;
pub mod policy;
pub mod propagation;
pub mod repository;
