//! Database abstraction layer
//!
//! This module provides a database-agnostic interface for table discovery
//! and row editing.

pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-export the main trait
pub use traits::{DatabaseError, DatabaseProvider};

use crate::schema::TableInfo;

/// Build table descriptors from table names in catalog order
pub(crate) fn describe_tables(names: Vec<String>) -> Vec<TableInfo> {
    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| TableInfo {
            id: index as u32 + 1,
            description: Some(describe_table(&name)),
            name,
        })
        .collect()
}

/// Default description for a table: its name, capitalized, plus "table"
pub(crate) fn describe_table(name: &str) -> String {
    let mut characters = name.chars();
    match characters.next() {
        Some(first) => format!("{}{} table", first.to_uppercase(), characters.as_str()),
        None => String::from("table"),
    }
}

/// Quote an identifier (table or column name) to prevent SQL injection
///
/// Both SQLite and PostgreSQL use double quotes for identifiers; embedded
/// double quotes are escaped by doubling them.
pub(crate) fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Escape LIKE wildcards so a filter value matches literally
pub(crate) fn like_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
