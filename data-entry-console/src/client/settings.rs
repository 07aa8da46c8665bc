//! Database connection settings form

use super::api::{ClientError, SettingsBackend};
use crate::schema::{ConnectionSettings, SettingSource};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Unknown setting '{0}'")]
    UnknownField(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Form state for the connection settings endpoint
pub struct SettingsForm<S: SettingsBackend + ?Sized> {
    backend: Arc<S>,
    default_port: String,
    values: ConnectionSettings,
    sources: HashMap<&'static str, SettingSource>,
}

impl<S: SettingsBackend + ?Sized> SettingsForm<S> {
    pub fn new(backend: Arc<S>, default_port: impl Into<String>) -> Self {
        Self {
            backend,
            default_port: default_port.into(),
            values: ConnectionSettings::default(),
            sources: HashMap::new(),
        }
    }

    /// Read the current settings into the form
    ///
    /// An empty port is replaced by the configured default.
    pub async fn load(&mut self) -> Result<&ConnectionSettings, SettingsError> {
        let response = self.backend.get_settings().await?;

        for name in ConnectionSettings::FIELDS {
            if let (Some(field), Some(slot)) = (response.field(name), self.values.field_mut(name)) {
                *slot = field.value.clone();
                self.sources.insert(name, field.source);
            }
        }

        if self.values.port.trim().is_empty() {
            self.values.port = self.default_port.clone();
        }

        Ok(&self.values)
    }

    pub fn values(&self) -> &ConnectionSettings {
        &self.values
    }

    /// Where the loaded value of `field` came from
    pub fn source(&self, field: &str) -> Option<SettingSource> {
        self.sources.get(field).copied()
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) -> Result<(), SettingsError> {
        let slot = self
            .values
            .field_mut(field)
            .ok_or_else(|| SettingsError::UnknownField(field.to_string()))?;
        *slot = value.into();
        Ok(())
    }

    /// Post every field of the form
    pub async fn save(&mut self) -> Result<(), SettingsError> {
        self.backend.save_settings(&self.values).await?;
        for name in ConnectionSettings::FIELDS {
            self.sources.insert(name, SettingSource::Override);
        }
        tracing::info!(database = %self.values.database, "Connection settings saved");
        Ok(())
    }
}
