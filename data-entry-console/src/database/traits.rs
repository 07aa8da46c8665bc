//! Database provider trait
//!
//! This trait defines the interface that all database implementations must provide.

use crate::schema::{ConnectionSettings, PageQuery, PageResponse, RowValues, TableInfo, TableMetadata};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Database provider trait for schema discovery and row editing
///
/// Column names reaching the mutation methods have already been validated
/// against the table's metadata by the API layer; implementations still
/// quote every identifier they interpolate.
#[async_trait]
pub trait DatabaseProvider: Send + Sync + 'static {
    /// List all user tables in the database
    async fn list_tables(&self) -> Result<Vec<TableInfo>, DatabaseError>;

    /// Get column and key metadata for a specific table
    ///
    /// # Arguments
    ///
    /// * `table` - Name of the table
    async fn table_metadata(&self, table: &str) -> Result<TableMetadata, DatabaseError>;

    /// Fetch one page of rows, ordered by `order_by` when given
    ///
    /// The filter, when present, is a case-insensitive substring match on
    /// the filter column.
    async fn fetch_page(
        &self,
        table: &str,
        query: &PageQuery,
        order_by: Option<&str>,
    ) -> Result<PageResponse, DatabaseError>;

    /// Insert a row and return it as stored, including generated columns
    async fn insert_row(&self, table: &str, values: &RowValues) -> Result<RowValues, DatabaseError>;

    /// Update the row whose `key` column equals `id` and return it as stored
    async fn update_row(
        &self,
        table: &str,
        key: &str,
        id: &Value,
        values: &RowValues,
    ) -> Result<RowValues, DatabaseError>;

    /// Delete the row whose `key` column equals `id`
    async fn delete_row(&self, table: &str, key: &str, id: &Value) -> Result<(), DatabaseError>;

    /// Cheap connectivity probe
    async fn ping(&self) -> Result<(), DatabaseError>;

    /// Replace the connection pool using new connection settings
    async fn reconnect(&self, settings: &ConnectionSettings) -> Result<(), DatabaseError>;
}

/// Database error type
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Generic database error
    #[error("Database error: {0}")]
    Query(String),

    /// Table not found
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Invalid column name
    #[error("Invalid column: {0}")]
    InvalidColumn(String),

    /// No row matched the given key
    #[error("Row {key} = {id} not found in table '{table}'")]
    RowNotFound { table: String, key: String, id: String },

    /// Connection settings could not be turned into a pool
    #[error("Connection failed: {0}")]
    Connection(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        DatabaseError::Query(error.to_string())
    }
}
