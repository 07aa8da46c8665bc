//! Client configuration
//!
//! Loaded from an optional TOML file overlaid with `DATA_ENTRY_CLIENT__*`
//! environment variables (`DATA_ENTRY_CLIENT__OAUTH__CLIENT_ID` sets
//! `oauth.client_id`).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable prefix for client settings
pub const ENV_PREFIX: &str = "DATA_ENTRY_CLIENT";

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL, without a trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Rows requested per page by the table editor
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Try the unauthenticated debug mirrors before the authenticated routes
    #[serde(default)]
    pub debug_fallback: bool,

    /// Where per-table view modes are stored
    #[serde(default = "default_preferences_path")]
    pub preferences_path: PathBuf,

    /// Fixed bearer token, used instead of the OAuth flow when set
    #[serde(default)]
    pub token: Option<String>,

    /// Signed-in account name
    #[serde(default)]
    pub account: Option<String>,

    /// Port shown by the settings form when the backend reports none
    #[serde(default = "default_database_port")]
    pub default_database_port: String,

    #[serde(default)]
    pub oauth: Option<OAuthConfig>,
}

/// Identity provider endpoints and client registration
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,

    #[serde(default)]
    pub client_secret: Option<String>,

    pub authorize_url: String,

    pub token_url: String,

    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Refresh token from an earlier sign-in
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_page_size() -> u32 {
    20
}

fn default_preferences_path() -> PathBuf {
    PathBuf::from("view-modes.json")
}

fn default_database_port() -> String {
    "5432".to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:3000".to_string()
}

fn default_scopes() -> Vec<String> {
    ["openid", "profile", "email", "offline_access"]
        .iter()
        .map(|scope| scope.to_string())
        .collect()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            debug_fallback: false,
            preferences_path: default_preferences_path(),
            token: None,
            account: None,
            default_database_port: default_database_port(),
            oauth: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from `path` (if given) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let mut loaded: ClientConfig = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        loaded.base_url = loaded.base_url.trim_end_matches('/').to_string();
        Ok(loaded)
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
base_url = "http://console.local/"
page_size = 25
debug_fallback = true
account = "ada@example.com"

[oauth]
client_id = "console"
authorize_url = "http://idp.local/authorize"
token_url = "http://idp.local/token"
"#
        )
        .unwrap();

        let config = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.base_url, "http://console.local");
        assert_eq!(config.page_size, 25);
        assert!(config.debug_fallback);
        assert_eq!(config.account.as_deref(), Some("ada@example.com"));
        assert_eq!(config.default_database_port, "5432");

        let oauth = config.oauth.unwrap();
        assert_eq!(oauth.client_id, "console");
        assert_eq!(oauth.redirect_uri, "http://localhost:3000");
        assert!(oauth.scopes.contains(&"openid".to_string()));
    }
}
