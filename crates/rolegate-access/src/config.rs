//! Access service configuration.

use serde::Deserialize;

/// Configuration for the aggregate access service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Maximum number of session users kept in memory (default: 10_000).
    pub user_cache_capacity: u64,
    /// Lifetime of a cached session user in seconds (default: 900 = 15 minutes).
    pub user_cache_ttl_secs: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            user_cache_capacity: 10_000,
            user_cache_ttl_secs: 900,
        }
    }
}
