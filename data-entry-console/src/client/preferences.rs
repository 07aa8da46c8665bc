//! Per-table view mode, persisted as a small JSON document

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("Failed to access preferences file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Preferences file {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unknown view mode '{0}' (expected 'classic' or 'spreadsheet')")]
    UnknownMode(String),
}

/// How a table is presented
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Classic,
    Spreadsheet,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Classic => write!(f, "classic"),
            ViewMode::Spreadsheet => write!(f, "spreadsheet"),
        }
    }
}

impl FromStr for ViewMode {
    type Err = PreferencesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" => Ok(ViewMode::Classic),
            "spreadsheet" => Ok(ViewMode::Spreadsheet),
            other => Err(PreferencesError::UnknownMode(other.to_string())),
        }
    }
}

fn storage_key(table: &str) -> String {
    format!("tableView_{}_mode", table)
}

/// View modes keyed per table
pub struct ViewPreferences {
    path: PathBuf,
    entries: BTreeMap<String, ViewMode>,
}

impl ViewPreferences {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PreferencesError> {
        let path = path.into();

        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| {
                PreferencesError::Parse {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(PreferencesError::Io { path, source }),
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored mode for `table`, or [`ViewMode::Classic`]
    pub fn get(&self, table: &str) -> ViewMode {
        self.entries
            .get(&storage_key(table))
            .copied()
            .unwrap_or_default()
    }

    /// Record the mode for `table` and write the file
    pub fn set(&mut self, table: &str, mode: ViewMode) -> Result<(), PreferencesError> {
        self.entries.insert(storage_key(table), mode);

        let contents = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            PreferencesError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;

        std::fs::write(&self.path, contents).map_err(|source| PreferencesError::Io {
            path: self.path.clone(),
            source,
        })?;

        tracing::debug!(table, %mode, "Saved view mode");
        Ok(())
    }
}
