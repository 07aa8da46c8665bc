//! Server configuration
//!
//! Read from an optional TOML file, then overlaid with `DATA_ENTRY__*`
//! environment variables (`DATA_ENTRY__AUTH__SECRET` sets `auth.secret`).

use data_entry_console::auth::{AccessPolicy, AuthConfig};
use data_entry_console::ConnectionSettings;
use serde::Deserialize;
use std::path::Path;

pub const ENV_PREFIX: &str = "DATA_ENTRY";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Mount point of the console routes
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// `sqlite:` or `postgres://` connection URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Mount the unauthenticated `/debug` mirrors
    #[serde(default)]
    pub debug_endpoints: bool,

    /// Create and fill the sample tables (SQLite only)
    #[serde(default = "default_seed_sample_data")]
    pub seed_sample_data: bool,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub access: AccessPolicy,

    /// Defaults reported by the settings endpoint
    #[serde(default)]
    pub connection: ConnectionSettings,
}

fn default_bind_address() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_base_path() -> String {
    "/api".to_string()
}

fn default_database_url() -> String {
    "sqlite:./console.db?mode=rwc".to_string()
}

fn default_seed_sample_data() -> bool {
    true
}

impl ServerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn is_postgres(&self) -> bool {
        self.database_url.starts_with("postgres://") || self.database_url.starts_with("postgresql://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
bind_address = "0.0.0.0:9000"
database_url = "postgres://clerk@db.internal/inventory"
debug_endpoints = true

[auth]
audience = "console"

[access]
unrestricted = false

[access.grants]
clerk = ["orders", "customers"]

[connection]
endpoint = "db.internal"
port = "5432"
"#
        )
        .unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.base_path, "/api");
        assert!(config.is_postgres());
        assert!(config.debug_endpoints);
        assert!(config.seed_sample_data);
        assert_eq!(config.auth.audience.as_deref(), Some("console"));
        assert!(!config.access.unrestricted);
        assert_eq!(config.access.grants["clerk"].len(), 2);
        assert_eq!(config.connection.endpoint, "db.internal");
        assert_eq!(config.connection.database, "");
    }
}
