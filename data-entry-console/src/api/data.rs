//! Row endpoints: paginated reads and single-row mutations

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde_json::Value;

use super::{authorize, ApiError, AppState};
use crate::auth::Caller;
use crate::database::traits::{DatabaseError, DatabaseProvider};
use crate::schema::{
    FieldKind, KeyQuery, MutationResponse, PageQuery, PageResponse, RowValues, TableMetadata,
    MAX_PAGE_SIZE,
};

/// Resolve the key column for a mutation: `?pk=` first, then the metadata
fn resolve_key(metadata: &TableMetadata, query: &KeyQuery) -> Result<String, ApiError> {
    let key = match query.pk.as_deref() {
        Some(pk) if !pk.is_empty() => pk,
        _ => metadata.key_column(),
    };

    if metadata.column(key).is_none() {
        return Err(DatabaseError::InvalidColumn(key.to_string()).into());
    }

    Ok(key.to_string())
}

/// Check every submitted column against the metadata and coerce its value
fn coerce_values(metadata: &TableMetadata, values: RowValues) -> Result<RowValues, ApiError> {
    values
        .into_iter()
        .map(|(name, value)| {
            let column = metadata
                .column(&name)
                .ok_or_else(|| DatabaseError::InvalidColumn(name.clone()))?;
            let value = column
                .kind()
                .coerce(value)
                .map_err(|message| ApiError::BadRequest(format!("Column '{}': {}", name, message)))?;
            Ok((name, value))
        })
        .collect()
}

/// Turn the `{row_id}` path segment into a key value of the column's kind
fn coerce_key(metadata: &TableMetadata, key: &str, row_id: String) -> Result<Value, ApiError> {
    let kind = metadata
        .column(key)
        .map(|column| column.kind())
        .unwrap_or(FieldKind::Text);

    match kind.coerce(Value::String(row_id)) {
        Ok(Value::Null) => Err(ApiError::BadRequest("Row identifier is empty".to_string())),
        Ok(id) => Ok(id),
        Err(message) => Err(ApiError::BadRequest(format!("Row identifier {}", message))),
    }
}

/// Handler for GET /data/{table}
///
/// Query parameters:
/// - page: One-based page number (default: 1)
/// - page_size: Rows per page (default: 50, max: 100)
/// - filter_column, filter_value: Case-insensitive substring filter, applied
///   only when both are present
pub async fn get_page_handler<DB: DatabaseProvider>(
    State(state): State<AppState<DB>>,
    caller: Caller,
    Path(table): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse>, ApiError> {
    authorize(&state, &caller, &table)?;

    if query.page < 1 {
        return Err(ApiError::BadRequest("page must be at least 1".to_string()));
    }
    if query.page_size < 1 || query.page_size > MAX_PAGE_SIZE {
        return Err(ApiError::BadRequest(format!(
            "page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let metadata = state.database.table_metadata(&table).await?;

    if let Some((column, _)) = query.filter() {
        if metadata.column(column).is_none() {
            return Err(DatabaseError::InvalidColumn(column.to_string()).into());
        }
    }

    let key = metadata.key_column();
    let order_by = metadata.column(key).map(|column| column.name.as_str());

    let page = state.database.fetch_page(&table, &query, order_by).await?;
    tracing::debug!(
        table = %table,
        page = page.page,
        total = page.total,
        "Fetched page"
    );

    Ok(Json(page))
}

/// Handler for POST /data/{table}
///
/// A null or empty value for a generated key column is dropped so the
/// database assigns it.
pub async fn insert_row_handler<DB: DatabaseProvider>(
    State(state): State<AppState<DB>>,
    caller: Caller,
    Path(table): Path<String>,
    Query(key_query): Query<KeyQuery>,
    Json(values): Json<RowValues>,
) -> Result<(StatusCode, Json<RowValues>), ApiError> {
    authorize(&state, &caller, &table)?;

    let metadata = state.database.table_metadata(&table).await?;
    let key = resolve_key(&metadata, &key_query)?;
    let mut values = coerce_values(&metadata, values)?;

    let generated = metadata
        .column(&key)
        .is_some_and(|column| column.auto_increment);
    if generated && values.get(&key).is_some_and(Value::is_null) {
        values.remove(&key);
    }

    if values.is_empty() {
        return Err(ApiError::BadRequest("No values provided".to_string()));
    }

    let row = state.database.insert_row(&table, &values).await?;
    tracing::info!(table = %table, key = %key, id = ?row.get(&key), "Inserted row");

    Ok((StatusCode::CREATED, Json(row)))
}

/// Handler for PATCH /data/{table}/{row_id}
pub async fn update_row_handler<DB: DatabaseProvider>(
    State(state): State<AppState<DB>>,
    caller: Caller,
    Path((table, row_id)): Path<(String, String)>,
    Query(key_query): Query<KeyQuery>,
    Json(values): Json<RowValues>,
) -> Result<Json<RowValues>, ApiError> {
    authorize(&state, &caller, &table)?;

    if values.is_empty() {
        return Err(ApiError::BadRequest("No updates provided".to_string()));
    }

    let metadata = state.database.table_metadata(&table).await?;
    let key = resolve_key(&metadata, &key_query)?;
    let id = coerce_key(&metadata, &key, row_id)?;
    let values = coerce_values(&metadata, values)?;

    let row = state.database.update_row(&table, &key, &id, &values).await?;
    tracing::info!(table = %table, key = %key, id = %id, "Updated row");

    Ok(Json(row))
}

/// Handler for DELETE /data/{table}/{row_id}
pub async fn delete_row_handler<DB: DatabaseProvider>(
    State(state): State<AppState<DB>>,
    caller: Caller,
    Path((table, row_id)): Path<(String, String)>,
    Query(key_query): Query<KeyQuery>,
) -> Result<Json<MutationResponse>, ApiError> {
    authorize(&state, &caller, &table)?;

    let metadata = state.database.table_metadata(&table).await?;
    let key = resolve_key(&metadata, &key_query)?;
    let id = coerce_key(&metadata, &key, row_id.clone())?;

    state.database.delete_row(&table, &key, &id).await?;
    tracing::info!(table = %table, key = %key, id = %id, "Deleted row");

    Ok(Json(MutationResponse {
        success: true,
        message: format!("Row {} deleted successfully", row_id),
    }))
}
