//! Table list view

use super::api::{ClientError, TableBackend};
use super::editor::TableEditor;
use crate::schema::TableInfo;
use std::sync::Arc;

/// The tables the signed-in user can open
pub struct TableCatalog<B: TableBackend> {
    backend: Arc<B>,
    page_size: u32,
    tables: Vec<TableInfo>,
}

impl<B: TableBackend> TableCatalog<B> {
    pub fn new(backend: Arc<B>, page_size: u32) -> Self {
        Self {
            backend,
            page_size,
            tables: Vec::new(),
        }
    }

    /// Fetch the accessible tables, replacing the previous list
    pub async fn load(&mut self) -> Result<&[TableInfo], ClientError> {
        match self.backend.list_tables().await {
            Ok(tables) => {
                tracing::debug!(count = tables.len(), "Loaded table list");
                self.tables = tables;
                Ok(&self.tables)
            }
            Err(error) => {
                tracing::error!(%error, "Error fetching tables");
                self.tables.clear();
                Err(error)
            }
        }
    }

    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    /// Editor for `name`; call [`TableEditor::load`] to populate it
    pub fn open(&self, name: &str) -> TableEditor<B> {
        TableEditor::new(self.backend.clone(), name, self.page_size)
    }
}
