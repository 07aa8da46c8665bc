//! Table listing and metadata endpoints

use axum::{
    extract::{Path, State},
    response::Json,
};

use super::{authorize, ApiError, AppState};
use crate::auth::Caller;
use crate::database::traits::DatabaseProvider;
use crate::schema::{TableInfo, TableMetadata};

/// Handler for GET /tables/
///
/// Returns the tables the caller may access.
pub async fn list_tables_handler<DB: DatabaseProvider>(
    State(state): State<AppState<DB>>,
    caller: Caller,
) -> Result<Json<Vec<TableInfo>>, ApiError> {
    let mut tables = state.database.list_tables().await?;

    if let Some(principal) = &caller.0 {
        tables.retain(|table| state.policy.allows(principal, &table.name));
        tracing::debug!(username = %principal.username, count = tables.len(), "Listed tables");
    }

    Ok(Json(tables))
}

/// Handler for GET /tables/metadata/{table}
///
/// Returns column descriptors plus the primary-key name and whether the
/// database generates it.
pub async fn table_metadata_handler<DB: DatabaseProvider>(
    State(state): State<AppState<DB>>,
    caller: Caller,
    Path(table): Path<String>,
) -> Result<Json<TableMetadata>, ApiError> {
    authorize(&state, &caller, &table)?;
    Ok(Json(state.database.table_metadata(&table).await?))
}
