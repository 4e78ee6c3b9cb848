//! Layered process configuration.
//!
//! Built-in defaults are overridden by a TOML file (`rolegate.toml`, or the
//! path in `ROLEGATE_CONFIG`), which is in turn overridden by
//! `ROLEGATE_`-prefixed environment variables. Nested keys use `__`, e.g.
//! `ROLEGATE_DB__URL` or `ROLEGATE_ACCESS__USER_CACHE_TTL_SECS`.

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use rolegate_access::AccessConfig;
use rolegate_db::DbConfig;
use serde::Deserialize;

const CONFIG_PATH_VAR: &str = "ROLEGATE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "rolegate.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub access: AccessConfig,
    pub log: LogConfig,
    /// Root admin seeded at startup when no user has this email yet.
    pub bootstrap_root: Option<BootstrapRoot>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "rolegate=info".into(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapRoot {
    pub email: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl ServerConfig {
    pub fn load() -> Result<Self, figment::Error> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::figment(&path).extract()
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ROLEGATE_").split("__").ignore(&["config"]))
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn defaults_apply_without_sources() {
        Jail::expect_with(|_jail| {
            let config: ServerConfig = ServerConfig::figment("missing.toml").extract()?;
            assert_eq!(config.db.namespace, "rolegate");
            assert_eq!(config.access.user_cache_capacity, 10_000);
            assert_eq!(config.log.filter, "rolegate=info");
            assert!(config.bootstrap_root.is_none());
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "rolegate.toml",
                r#"
                [db]
                url = "mem://"
                database = "from_file"

                [log]
                json = true

                [bootstrap_root]
                email = "root@example.com"
                first_name = "Root"
                "#,
            )?;
            jail.set_env("ROLEGATE_DB__DATABASE", "from_env");
            jail.set_env("ROLEGATE_ACCESS__USER_CACHE_TTL_SECS", "60");

            let config: ServerConfig = ServerConfig::figment("rolegate.toml").extract()?;
            assert_eq!(config.db.url, "mem://");
            assert_eq!(config.db.database, "from_env");
            assert_eq!(config.access.user_cache_ttl_secs, 60);
            assert!(config.log.json);
            let root = config.bootstrap_root.unwrap();
            assert_eq!(root.email, "root@example.com");
            assert_eq!(root.last_name, "");
            Ok(())
        });
    }
}
