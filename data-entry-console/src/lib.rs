//! # data-entry-console
//!
//! A data-entry console for SQL tables: an Axum backend exposing paged,
//! filterable row editing behind bearer authentication, and a client that
//! keeps an editable page of rows in sync with it.
//!
//! ## Features
//!
//! - Table discovery with per-user access grants
//! - Paged rows with a case-insensitive column filter
//! - Insert, update and delete addressed by primary key
//! - Optimistic client edits reconciled against server responses
//! - Unauthenticated debug mirrors for development
//! - Support for SQLite and PostgreSQL
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use data_entry_console::DataEntryLayer;
//! use sqlx::SqlitePool;
//!
//! #[tokio::main]
//! async fn main() {
//!     let pool = SqlitePool::connect("sqlite::memory:")
//!         .await
//!         .unwrap();
//!
//!     let app = Router::new()
//!         .route("/", get(|| async { "Hello, World!" }))
//!         .merge(DataEntryLayer::sqlite("/api", pool).into_router());
//!
//!     // Serve the application...
//! }
//! ```

// Public modules
pub mod api;
pub mod auth;
pub mod client;
pub mod database;
pub mod layer;
pub mod schema;

// Public exports
pub use layer::DataEntryLayer;
pub use schema::{
    ColumnInfo, ConnectionSettings, PageQuery, PageResponse, RowValues, TableInfo, TableMetadata,
};

// Re-export database providers
pub use database::traits::DatabaseProvider;

#[cfg(feature = "sqlite")]
pub use database::sqlite::SqliteProvider;

#[cfg(feature = "postgres")]
pub use database::postgres::PostgresProvider;
