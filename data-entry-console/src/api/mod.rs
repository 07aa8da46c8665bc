//! REST API endpoints
//!
//! This module contains the handlers for table discovery, row editing and
//! connection settings, together with the error type they share.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::{AccessPolicy, Caller};
use crate::database::traits::{DatabaseError, DatabaseProvider};

pub mod data;
pub mod settings;
pub mod tables;

// Re-export handlers for convenience
pub use data::{delete_row_handler, get_page_handler, insert_row_handler, update_row_handler};
pub use settings::{get_settings_handler, save_settings_handler, SettingsStore};
pub use tables::{list_tables_handler, table_metadata_handler};

/// State shared by every handler
pub struct AppState<DB: DatabaseProvider> {
    pub database: Arc<DB>,
    pub policy: Arc<AccessPolicy>,
    pub settings: Arc<SettingsStore>,
}

impl<DB: DatabaseProvider> Clone for AppState<DB> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            policy: self.policy.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// Errors returned by API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    BadRequest(String),

    #[error("You don't have access to table '{0}'")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Database(DatabaseError::TableNotFound(_))
            | ApiError::Database(DatabaseError::RowNotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Database(DatabaseError::InvalidColumn(_)) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Database(DatabaseError::Connection(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Database(DatabaseError::Query(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "Request failed");
        } else {
            tracing::warn!(%status, error = %self, "Request rejected");
        }

        let body = Json(json!({ "error": self.to_string() }));
        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

/// Reject callers the access policy does not grant `table`
///
/// Requests without a principal only reach handlers through the debug
/// mirrors, which are unrestricted.
pub(crate) fn authorize<DB: DatabaseProvider>(
    state: &AppState<DB>,
    caller: &Caller,
    table: &str,
) -> Result<(), ApiError> {
    match &caller.0 {
        Some(principal) if !state.policy.allows(principal, table) => {
            Err(ApiError::Forbidden(table.to_string()))
        }
        _ => Ok(()),
    }
}

/// Handler for GET /health
pub async fn health_handler<DB: DatabaseProvider>(State(state): State<AppState<DB>>) -> Response {
    match state.database.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(error) => {
            tracing::error!(%error, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": error.to_string() })),
            )
                .into_response()
        }
    }
}

/// Handler for GET /debug/db-info
///
/// Reports connectivity, the tables in the database, the access grants and
/// the connection settings in effect (password masked).
pub async fn db_info_handler<DB: DatabaseProvider>(
    State(state): State<AppState<DB>>,
) -> Response {
    let tables = match state.database.ping().await {
        Ok(()) => state.database.list_tables().await,
        Err(error) => Err(error),
    };

    match tables {
        Ok(tables) => {
            let names: Vec<String> = tables.into_iter().map(|table| table.name).collect();
            let settings = state.settings.report().await;
            let body = json!({
                "connection": "Connection successful",
                "database_tables": names,
                "access": {
                    "unrestricted": state.policy.unrestricted,
                    "grants": state.policy.grants,
                },
                "settings": settings,
            });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(error) => {
            tracing::error!(%error, "Database diagnostics failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": error.to_string(),
                    "message": "Error connecting to database",
                })),
            )
                .into_response()
        }
    }
}
