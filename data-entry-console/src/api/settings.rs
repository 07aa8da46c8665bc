//! Database connection settings endpoints
//!
//! Each setting resolves, in order, from a runtime override posted through
//! the API, from the process environment, then from the configured default.
//! Overrides live in memory only and are lost on restart.

use axum::{extract::State, response::Json};
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use super::{ApiError, AppState};
use crate::database::traits::DatabaseProvider;
use crate::schema::{ConnectionSettings, SettingField, SettingSource, SettingsResponse};

/// Placeholder reported instead of a stored password
///
/// Posting it back keeps the current password.
pub const MASKED_PASSWORD: &str = "********";

/// Environment variables consulted for each setting
const ENV_VARS: [(&str, &str); 5] = [
    ("endpoint", "SQL_SERVER_ENDPOINT"),
    ("port", "SQL_SERVER_PORT"),
    ("database", "SQL_DATABASE_NAME"),
    ("username", "SQL_USERNAME"),
    ("password", "SQL_PASSWORD"),
];

/// Layered connection settings
pub struct SettingsStore {
    defaults: ConnectionSettings,
    env: ConnectionSettings,
    overrides: RwLock<Option<ConnectionSettings>>,
}

impl SettingsStore {
    pub fn new(defaults: ConnectionSettings, env: ConnectionSettings) -> Self {
        Self {
            defaults,
            env,
            overrides: RwLock::new(None),
        }
    }

    /// Build a store whose environment layer is read from the process environment
    pub fn from_env(defaults: ConnectionSettings) -> Self {
        let mut env = ConnectionSettings::default();
        for (field, variable) in ENV_VARS {
            if let (Some(slot), Ok(value)) = (env.field_mut(field), std::env::var(variable)) {
                *slot = value;
            }
        }
        Self::new(defaults, env)
    }

    fn resolve(&self, overrides: Option<&ConnectionSettings>, field: &str) -> SettingField {
        if let Some(value) = overrides.and_then(|settings| settings.field(field)) {
            return SettingField {
                value: value.to_string(),
                source: SettingSource::Override,
            };
        }

        match self.env.field(field) {
            Some(value) if !value.is_empty() => SettingField {
                value: value.to_string(),
                source: SettingSource::Env,
            },
            _ => SettingField {
                value: self.defaults.field(field).unwrap_or_default().to_string(),
                source: SettingSource::Default,
            },
        }
    }

    /// The settings currently in effect
    pub async fn effective(&self) -> ConnectionSettings {
        let overrides = self.overrides.read().await;
        let mut settings = ConnectionSettings::default();
        for field in ConnectionSettings::FIELDS {
            if let Some(slot) = settings.field_mut(field) {
                *slot = self.resolve(overrides.as_ref(), field).value;
            }
        }
        settings
    }

    /// Settings with provenance, password masked
    pub async fn report(&self) -> SettingsResponse {
        let overrides = self.overrides.read().await;
        let field = |name: &str| self.resolve(overrides.as_ref(), name);

        let mut password = field("password");
        if !password.value.is_empty() {
            password.value = MASKED_PASSWORD.to_string();
        }

        SettingsResponse {
            endpoint: field("endpoint"),
            port: field("port"),
            database: field("database"),
            username: field("username"),
            password,
        }
    }

    pub async fn replace(&self, settings: ConnectionSettings) {
        *self.overrides.write().await = Some(settings);
    }
}

/// Read the posted body into settings, requiring every field
fn parse_settings(body: &Map<String, Value>) -> Result<ConnectionSettings, ApiError> {
    let mut settings = ConnectionSettings::default();

    for field in ConnectionSettings::FIELDS {
        let value = match body.get(field) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Number(number)) => number.to_string(),
            _ => {
                return Err(ApiError::BadRequest(format!(
                    "Missing required field: {}",
                    field
                )))
            }
        };
        if let Some(slot) = settings.field_mut(field) {
            *slot = value;
        }
    }

    Ok(settings)
}

/// Handler for GET /settings/db-credentials
pub async fn get_settings_handler<DB: DatabaseProvider>(
    State(state): State<AppState<DB>>,
) -> Json<SettingsResponse> {
    Json(state.settings.report().await)
}

/// Handler for POST /settings/db-credentials
///
/// Reconnects the database with the posted settings and records them as
/// overrides once the new connection is up.
pub async fn save_settings_handler<DB: DatabaseProvider>(
    State(state): State<AppState<DB>>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Value>, ApiError> {
    let mut settings = parse_settings(&body)?;

    if settings.password == MASKED_PASSWORD {
        settings.password = state.settings.effective().await.password;
    }

    state.database.reconnect(&settings).await?;
    tracing::info!(endpoint = %settings.endpoint, database = %settings.database, "Connection settings replaced");
    state.settings.replace(settings).await;

    Ok(Json(json!({ "status": "ok", "message": "Settings updated" })))
}
