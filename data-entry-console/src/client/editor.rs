//! Table editor state and reconciliation
//!
//! [`TableEditor`] holds one page of a table together with the edit,
//! insert and delete state a presentation layer renders. Mutations are
//! applied to the visible rows before the server confirms them and are
//! reconciled (or rolled back by reloading the page) once the response
//! arrives. Every operation takes `&mut self`, so operations on one editor
//! never interleave.
//!
//! User-facing outcomes are queued as [`Notice`]s; drain them with
//! [`TableEditor::take_notices`].

use super::api::{ClientError, TableBackend};
use super::row::RowEntry;
use crate::schema::{
    key_matches, value_text, FieldKind, PageQuery, RowValues, TableMetadata, DEFAULT_PRIMARY_KEY,
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Response fields that describe the request rather than the row
const ACKNOWLEDGEMENT_FIELDS: [&str; 2] = ["success", "message"];

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("Primary key value is required for this table (column '{0}')")]
    MissingPrimaryKey(String),

    #[error("No row at index {0}")]
    NoSuchRow(usize),

    #[error("No visible row has key {0}")]
    NoSuchKey(String),

    #[error("Row {0} has no value for its primary key '{1}'")]
    MissingRowKey(usize, String),

    #[error("Row is still being saved")]
    PendingRow,

    #[error("No row is being edited")]
    NotEditing,

    #[error("Row {0} has unsaved changes; save or cancel them first")]
    UnsavedEdit(usize),

    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Invalid value for column '{column}': {reason}")]
    InvalidValue { column: String, reason: String },

    #[error("No delete is awaiting confirmation")]
    NoPendingDelete,

    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// A transient message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Paging state as last reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Whether the view has data to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewStatus {
    Ready,
    Failed(String),
    AccessDenied(String),
}

#[derive(Debug, Clone)]
struct EditSession {
    index: usize,
    key: Value,
    original: RowValues,
    buffer: RowValues,
}

impl EditSession {
    /// Fields whose buffered value differs from the original row
    fn changes(&self) -> RowValues {
        self.buffer
            .iter()
            .filter(|(column, value)| self.original.get(column.as_str()) != Some(value))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect()
    }

    fn is_dirty(&self) -> bool {
        self.buffer
            .iter()
            .any(|(column, value)| self.original.get(column.as_str()) != Some(value))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// Kind of a value when no column metadata is available
fn kind_of(value: &Value) -> FieldKind {
    match value {
        Value::Bool(_) => FieldKind::Boolean,
        Value::Number(number) if number.is_f64() => FieldKind::Real,
        Value::Number(_) => FieldKind::Integer,
        _ => FieldKind::Text,
    }
}

/// Build the confirmed row for a successful insert
///
/// The key is taken from the response's key field, then its `id` field,
/// then (for client-supplied keys) the submitted value. Other response
/// fields overwrite the submitted ones.
pub(crate) fn reconcile_insert(
    key: &str,
    auto_increment: bool,
    submitted: &RowValues,
    submitted_key: Option<&Value>,
    response: RowValues,
) -> RowValues {
    let from_key = response.get(key).filter(|value| !value.is_null()).cloned();
    let from_id = response.get("id").filter(|value| !value.is_null()).cloned();
    let id_is_key_fallback = from_key.is_none() && from_id.is_some();

    let resolved = from_key.or(from_id).or_else(|| {
        if auto_increment {
            None
        } else {
            submitted_key.cloned()
        }
    });

    let mut row = submitted.clone();
    for (column, value) in response {
        let skip = ACKNOWLEDGEMENT_FIELDS.contains(&column.as_str())
            || column == key
            || (id_is_key_fallback && column == "id");
        if !skip {
            row.insert(column, value);
        }
    }
    if let Some(resolved) = resolved {
        row.insert(key.to_string(), resolved);
    }

    row
}

/// Editable view over one table
pub struct TableEditor<B: TableBackend> {
    backend: Arc<B>,
    table: String,
    metadata: Option<TableMetadata>,
    primary_key: String,
    auto_increment: bool,
    rows: Vec<RowEntry>,
    pagination: Pagination,
    filter: Option<Filter>,
    edit: Option<EditSession>,
    pending_delete: Option<Value>,
    status: ViewStatus,
    notices: Vec<Notice>,
}

impl<B: TableBackend> TableEditor<B> {
    pub fn new(backend: Arc<B>, table: impl Into<String>, page_size: u32) -> Self {
        Self {
            backend,
            table: table.into(),
            metadata: None,
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            auto_increment: true,
            rows: Vec::new(),
            pagination: Pagination {
                page: 1,
                page_size: page_size.max(1),
                total_pages: 0,
                total: 0,
            },
            filter: None,
            edit: None,
            pending_delete: None,
            status: ViewStatus::Ready,
            notices: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn rows(&self) -> &[RowEntry] {
        &self.rows
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn active_filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn status(&self) -> &ViewStatus {
        &self.status
    }

    pub fn metadata(&self) -> Option<&TableMetadata> {
        self.metadata.as_ref()
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Index of the row being edited
    pub fn editing(&self) -> Option<usize> {
        self.edit.as_ref().map(|session| session.index)
    }

    pub fn edit_buffer(&self) -> Option<&RowValues> {
        self.edit.as_ref().map(|session| &session.buffer)
    }

    /// Key of the row awaiting delete confirmation
    pub fn pending_delete(&self) -> Option<&Value> {
        self.pending_delete.as_ref()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Visible columns: those of the first row on the page, or the
    /// metadata's columns when the page is empty
    pub fn columns(&self) -> Vec<String> {
        let position = |name: &str| {
            self.metadata
                .as_ref()
                .and_then(|metadata| metadata.columns.iter().position(|column| column.name == name))
                .unwrap_or(usize::MAX)
        };

        match self.rows.first() {
            Some(row) => {
                let mut names: Vec<String> = row.values().keys().cloned().collect();
                names.sort_by_key(|name| position(name));
                names
            }
            None => self
                .metadata
                .as_ref()
                .map(|metadata| metadata.columns.iter().map(|column| column.name.clone()).collect())
                .unwrap_or_default(),
        }
    }

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Error => tracing::warn!(table = %self.table, %message, "Editor error"),
            _ => tracing::debug!(table = %self.table, %message, "Editor notice"),
        }
        self.notices.push(Notice { level, message });
    }

    /// Surface an error as a notice and hand it back
    fn fail(&mut self, error: EditorError) -> EditorError {
        self.notify(NoticeLevel::Error, error.to_string());
        error
    }

    /// Drop a clean edit session; refuse while edits are unsaved
    fn ensure_clean_edit(&mut self) -> Result<(), EditorError> {
        match &self.edit {
            Some(session) if session.is_dirty() => {
                let index = session.index;
                Err(self.fail(EditorError::UnsavedEdit(index)))
            }
            Some(_) => {
                self.edit = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Point the edit session at its row again after the row set changed
    fn reanchor_edit(&mut self) {
        let Some(session) = self.edit.take() else {
            return;
        };

        let primary_key = &self.primary_key;
        let index = self.rows.iter().position(|row| {
            row.key(primary_key)
                .is_some_and(|key| key_matches(key, &session.key))
        });

        match index {
            Some(index) => self.edit = Some(EditSession { index, ..session }),
            None => tracing::debug!(table = %self.table, "Edited row left the visible set"),
        }
    }

    fn key_position(&self, key: &Value) -> Option<usize> {
        self.rows.iter().position(|row| {
            row.key(&self.primary_key)
                .is_some_and(|candidate| key_matches(candidate, key))
        })
    }

    fn field_kind(&self, column: &str, current: &Value) -> FieldKind {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.column(column))
            .map(|column| column.kind())
            .unwrap_or_else(|| kind_of(current))
    }

    /// Fetch metadata and the requested page
    ///
    /// Without metadata the key column defaults to `id` and is assumed to be
    /// generated by the database.
    pub async fn load(&mut self, page: u32, filter: Option<Filter>) -> Result<(), EditorError> {
        self.ensure_clean_edit()?;
        self.load_metadata().await;
        self.filter = filter;
        self.fetch(page.max(1)).await
    }

    async fn load_metadata(&mut self) {
        match self.backend.table_metadata(&self.table).await {
            Ok(metadata) => {
                let key = metadata.primary_key.clone().or_else(|| {
                    metadata
                        .columns
                        .iter()
                        .find(|column| column.primary_key)
                        .map(|column| column.name.clone())
                });

                match key {
                    Some(key) => {
                        self.auto_increment = metadata.is_auto_increment.unwrap_or(true);
                        self.primary_key = key;
                    }
                    None => {
                        self.primary_key = DEFAULT_PRIMARY_KEY.to_string();
                        self.auto_increment = true;
                    }
                }
                self.metadata = Some(metadata);
            }
            Err(error) => {
                tracing::warn!(table = %self.table, %error, "Metadata unavailable, assuming generated 'id' key");
                self.metadata = None;
                self.primary_key = DEFAULT_PRIMARY_KEY.to_string();
                self.auto_increment = true;
            }
        }
    }

    /// Replace the visible rows with one page from the server
    async fn fetch(&mut self, page: u32) -> Result<(), EditorError> {
        let query = PageQuery {
            page,
            page_size: self.pagination.page_size,
            filter_column: self.filter.as_ref().map(|filter| filter.column.clone()),
            filter_value: self.filter.as_ref().map(|filter| filter.value.clone()),
        };

        match self.backend.fetch_page(&self.table, &query).await {
            Ok(response) => {
                self.rows = response.data.into_iter().map(RowEntry::confirmed).collect();
                self.pending_delete = None;
                self.pagination = Pagination {
                    page: response.page,
                    page_size: response.page_size,
                    total_pages: response.total_pages,
                    total: response.total,
                };
                self.status = ViewStatus::Ready;
                self.reanchor_edit();
                Ok(())
            }
            Err(error) => {
                self.rows.clear();
                self.edit = None;
                self.pending_delete = None;
                self.status = match &error {
                    ClientError::AccessDenied(_) => ViewStatus::AccessDenied(error.to_string()),
                    _ => ViewStatus::Failed(error.to_string()),
                };
                self.notify(NoticeLevel::Error, format!("Failed to load data: {}", error));
                Err(error.into())
            }
        }
    }

    /// Reload after a mutation; failures are already surfaced by `fetch`
    async fn resync(&mut self) {
        if let Err(error) = self.fetch(self.pagination.page).await {
            tracing::warn!(table = %self.table, %error, "Reload after mutation failed");
        }
    }

    /// Start editing the row at `index`
    pub fn begin_edit(&mut self, index: usize) -> Result<(), EditorError> {
        let Some(row) = self.rows.get(index) else {
            return Err(self.fail(EditorError::NoSuchRow(index)));
        };
        if row.is_pending() {
            return Err(self.fail(EditorError::PendingRow));
        }

        let key = row.key(&self.primary_key).cloned();
        let original = row.values().clone();

        if let Some(session) = &self.edit {
            if session.index == index {
                return Ok(());
            }
        }
        self.ensure_clean_edit()?;

        let Some(key) = key else {
            let primary_key = self.primary_key.clone();
            return Err(self.fail(EditorError::MissingRowKey(index, primary_key)));
        };

        self.edit = Some(EditSession {
            index,
            key,
            buffer: original.clone(),
            original,
        });
        Ok(())
    }

    /// Replace one buffered field with text typed by the user
    ///
    /// The text is converted to the column's kind. Clearing a field that was
    /// NULL keeps it NULL.
    pub fn set_field(&mut self, column: &str, text: &str) -> Result<(), EditorError> {
        let Some(session) = &self.edit else {
            return Err(self.fail(EditorError::NotEditing));
        };

        let known = session.original.contains_key(column)
            || self
                .metadata
                .as_ref()
                .is_some_and(|metadata| metadata.column(column).is_some());
        if !known {
            return Err(self.fail(EditorError::UnknownColumn(column.to_string())));
        }

        let current = session.original.get(column).cloned().unwrap_or(Value::Null);
        let value = if text.is_empty() && current.is_null() {
            Ok(Value::Null)
        } else {
            self.field_kind(column, &current)
                .coerce(Value::String(text.to_string()))
        };

        match value {
            Ok(value) => {
                if let Some(session) = self.edit.as_mut() {
                    session.buffer.insert(column.to_string(), value);
                }
                Ok(())
            }
            Err(reason) => Err(self.fail(EditorError::InvalidValue {
                column: column.to_string(),
                reason,
            })),
        }
    }

    pub fn cancel_edit(&mut self) {
        self.edit = None;
    }

    /// Send the changed fields of the row being edited
    ///
    /// Nothing is sent when no field changed. On failure the row keeps its
    /// previous values and the page is reloaded; the edit session stays open
    /// if its row is still visible.
    pub async fn commit_edit(&mut self) -> Result<(), EditorError> {
        let Some(session) = &self.edit else {
            return Err(self.fail(EditorError::NotEditing));
        };

        let changes = session.changes();
        let (index, id) = (session.index, session.key.clone());

        if changes.is_empty() {
            self.edit = None;
            self.notify(NoticeLevel::Info, "No changes to save");
            return Ok(());
        }

        match self
            .backend
            .update_row(&self.table, &self.primary_key, &id, &changes)
            .await
        {
            Ok(response) => {
                if let Some(RowEntry::Confirmed { values }) = self.rows.get_mut(index) {
                    values.extend(changes);
                    values.extend(
                        response
                            .into_iter()
                            .filter(|(column, _)| !ACKNOWLEDGEMENT_FIELDS.contains(&column.as_str())),
                    );
                }
                self.edit = None;
                self.notify(NoticeLevel::Success, "Row updated successfully");
                Ok(())
            }
            Err(error) => {
                self.notify(NoticeLevel::Error, format!("Failed to update row: {}", error));
                self.resync().await;
                Err(error.into())
            }
        }
    }

    /// Insert a row optimistically
    ///
    /// Text values are converted to their column's kind. A generated key is
    /// never sent; a client-supplied key must be present.
    pub async fn insert_row(&mut self, values: RowValues) -> Result<(), EditorError> {
        let key = self.primary_key.clone();

        let mut submitted = RowValues::new();
        for (column, value) in values {
            // A generated key is dropped before conversion
            if self.auto_increment && column == key {
                continue;
            }
            let value = match value {
                Value::String(text) => {
                    let kind = self.field_kind(&column, &Value::Null);
                    match kind.coerce(Value::String(text)) {
                        Ok(value) => value,
                        Err(reason) => {
                            return Err(self.fail(EditorError::InvalidValue { column, reason }))
                        }
                    }
                }
                other => other,
            };
            submitted.insert(column, value);
        }

        let submitted_key = submitted.get(&key).filter(|value| !is_blank(value)).cloned();
        if !self.auto_increment && submitted_key.is_none() {
            return Err(self.fail(EditorError::MissingPrimaryKey(key)));
        }

        let pending = RowEntry::pending(submitted.clone());
        let temp_id = pending.temp_id().unwrap_or_default().to_string();
        self.rows.push(pending);

        match self.backend.insert_row(&self.table, &key, &submitted).await {
            Ok(response) => {
                let confirmed = reconcile_insert(
                    &key,
                    self.auto_increment,
                    &submitted,
                    submitted_key.as_ref(),
                    response,
                );
                if let Some(row) = self
                    .rows
                    .iter_mut()
                    .find(|row| row.temp_id() == Some(temp_id.as_str()))
                {
                    *row = RowEntry::confirmed(confirmed);
                }

                self.notify(NoticeLevel::Success, "Row added successfully");
                self.resync().await;
                Ok(())
            }
            Err(error) => {
                self.rows.retain(|row| row.temp_id() != Some(temp_id.as_str()));
                self.notify(NoticeLevel::Error, format!("Failed to add row: {}", error));
                Err(error.into())
            }
        }
    }

    /// Ask for confirmation before deleting the row with `key`
    ///
    /// The request lapses whenever the visible rows are replaced.
    pub fn request_delete(&mut self, key: Value) -> Result<(), EditorError> {
        if self.key_position(&key).is_none() {
            return Err(self.fail(EditorError::NoSuchKey(value_text(&key))));
        }
        self.pending_delete = Some(key);
        Ok(())
    }

    pub fn dismiss_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Delete the row awaiting confirmation
    ///
    /// The row disappears immediately; if the server refuses, the page is
    /// reloaded.
    pub async fn confirm_delete(&mut self) -> Result<(), EditorError> {
        let Some(key) = self.pending_delete.take() else {
            return Err(self.fail(EditorError::NoPendingDelete));
        };
        if self.key_position(&key).is_none() {
            return Err(self.fail(EditorError::NoSuchKey(value_text(&key))));
        }

        let primary_key = self.primary_key.clone();
        self.rows.retain(|row| {
            !row.key(&primary_key)
                .is_some_and(|candidate| key_matches(candidate, &key))
        });
        self.reanchor_edit();

        match self.backend.delete_row(&self.table, &primary_key, &key).await {
            Ok(()) => {
                self.notify(NoticeLevel::Success, "Row deleted successfully");
                Ok(())
            }
            Err(error) => {
                self.notify(NoticeLevel::Error, format!("Failed to delete row: {}", error));
                self.resync().await;
                Err(error.into())
            }
        }
    }

    /// Apply a filter and show its first page
    pub async fn filter(
        &mut self,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), EditorError> {
        self.ensure_clean_edit()?;
        self.filter = Some(Filter::new(column, value));
        self.fetch(1).await
    }

    /// Clear the filter and show the first page
    pub async fn reset_filter(&mut self) -> Result<(), EditorError> {
        self.ensure_clean_edit()?;
        self.filter = None;
        self.fetch(1).await
    }

    /// Show page `page`; pages outside `1..=total_pages` are ignored
    ///
    /// Returns whether a fetch happened.
    pub async fn change_page(&mut self, page: u32) -> Result<bool, EditorError> {
        if page < 1 || page > self.pagination.total_pages {
            return Ok(false);
        }
        self.ensure_clean_edit()?;
        self.fetch(page).await?;
        Ok(true)
    }

    /// Fetch the current page again with the current filter
    pub async fn refresh(&mut self) -> Result<(), EditorError> {
        self.ensure_clean_edit()?;
        self.fetch(self.pagination.page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{total_pages, ColumnInfo, PageResponse, TableInfo};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Metadata,
        Fetch(PageQuery),
        Insert(RowValues),
        Update(Value, RowValues),
        Delete(Value),
    }

    #[derive(Default)]
    struct MemoryState {
        rows: Vec<RowValues>,
        metadata: Option<TableMetadata>,
        next_id: i64,
        fail_inserts: bool,
        fail_updates: bool,
        fail_deletes: bool,
        deny: bool,
        calls: Vec<Call>,
    }

    /// In-memory stand-in for the backend
    #[derive(Default)]
    struct MemoryBackend {
        state: Mutex<MemoryState>,
    }

    impl MemoryBackend {
        fn calls(&self) -> Vec<Call> {
            self.state.lock().unwrap().calls.clone()
        }

        fn network_calls(&self) -> usize {
            self.calls().len()
        }

        fn server_rows(&self) -> Vec<RowValues> {
            self.state.lock().unwrap().rows.clone()
        }

        fn with<F: FnOnce(&mut MemoryState)>(&self, change: F) {
            change(&mut self.state.lock().unwrap());
        }
    }

    fn server_error() -> ClientError {
        ClientError::Http {
            status: 500,
            message: "Internal Server Error".to_string(),
        }
    }

    #[async_trait]
    impl TableBackend for MemoryBackend {
        async fn list_tables(&self) -> Result<Vec<TableInfo>, ClientError> {
            Ok(Vec::new())
        }

        async fn table_metadata(&self, table: &str) -> Result<TableMetadata, ClientError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Metadata);
            if state.deny {
                return Err(ClientError::AccessDenied(table.to_string()));
            }
            state.metadata.clone().ok_or_else(server_error)
        }

        async fn fetch_page(
            &self,
            table: &str,
            query: &PageQuery,
        ) -> Result<PageResponse, ClientError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Fetch(query.clone()));
            if state.deny {
                return Err(ClientError::AccessDenied(table.to_string()));
            }

            let matching: Vec<RowValues> = state
                .rows
                .iter()
                .filter(|row| match query.filter() {
                    Some((column, value)) => row
                        .get(column)
                        .map(value_text)
                        .unwrap_or_default()
                        .to_lowercase()
                        .contains(&value.to_lowercase()),
                    None => true,
                })
                .cloned()
                .collect();

            let total = matching.len() as u64;
            let data = matching
                .into_iter()
                .skip(query.offset() as usize)
                .take(query.page_size as usize)
                .collect();

            Ok(PageResponse {
                data,
                page: query.page,
                page_size: query.page_size,
                total_pages: total_pages(total, query.page_size),
                total,
            })
        }

        async fn insert_row(
            &self,
            _table: &str,
            key: &str,
            values: &RowValues,
        ) -> Result<RowValues, ClientError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Insert(values.clone()));
            if state.fail_inserts {
                return Err(server_error());
            }

            let mut row = values.clone();
            if !row.contains_key(key) {
                row.insert(key.to_string(), json!(state.next_id));
                state.next_id += 1;
            }
            state.rows.push(row.clone());
            Ok(row)
        }

        async fn update_row(
            &self,
            _table: &str,
            key: &str,
            id: &Value,
            values: &RowValues,
        ) -> Result<RowValues, ClientError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Update(id.clone(), values.clone()));
            if state.fail_updates {
                return Err(server_error());
            }

            let row = state
                .rows
                .iter_mut()
                .find(|row| row.get(key).is_some_and(|candidate| key_matches(candidate, id)))
                .ok_or_else(|| ClientError::Http {
                    status: 404,
                    message: "Not Found".to_string(),
                })?;
            row.extend(values.clone());
            Ok(row.clone())
        }

        async fn delete_row(&self, _table: &str, key: &str, id: &Value) -> Result<(), ClientError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Delete(id.clone()));
            if state.fail_deletes {
                return Err(server_error());
            }
            let column = key.to_string();
            state
                .rows
                .retain(|row| !row.get(&column).is_some_and(|candidate| key_matches(candidate, id)));
            Ok(())
        }
    }

    fn column(name: &str, data_type: &str, primary_key: bool, auto_increment: bool) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
            primary_key,
            nullable: !primary_key,
            auto_increment,
        }
    }

    fn employee(id: i64, status: &str) -> RowValues {
        let mut row = RowValues::new();
        row.insert("id".to_string(), json!(id));
        row.insert("name".to_string(), json!(format!("Employee {}", id)));
        row.insert("status".to_string(), json!(status));
        row
    }

    /// `count` employees; even ids are active, odd ids retired
    fn employees(count: i64) -> Arc<MemoryBackend> {
        let backend = MemoryBackend::default();
        backend.with(|state| {
            state.rows = (1..=count)
                .map(|id| employee(id, if id % 2 == 0 { "active" } else { "retired" }))
                .collect();
            state.next_id = count + 1;
            state.metadata = Some(TableMetadata {
                name: "employees".to_string(),
                description: None,
                columns: vec![
                    column("id", "INTEGER", true, true),
                    column("name", "TEXT", false, false),
                    column("status", "TEXT", false, false),
                ],
                primary_key: Some("id".to_string()),
                is_auto_increment: Some(true),
            });
        });
        Arc::new(backend)
    }

    fn codes() -> Arc<MemoryBackend> {
        let backend = MemoryBackend::default();
        backend.with(|state| {
            state.metadata = Some(TableMetadata {
                name: "codes".to_string(),
                description: None,
                columns: vec![
                    column("code", "TEXT", true, false),
                    column("label", "TEXT", false, false),
                ],
                primary_key: Some("code".to_string()),
                is_auto_increment: Some(false),
            });
        });
        Arc::new(backend)
    }

    fn visible(editor: &TableEditor<MemoryBackend>) -> Vec<RowValues> {
        editor.rows().iter().map(|row| row.values().clone()).collect()
    }

    fn has_error(notices: &[Notice]) -> bool {
        notices.iter().any(|notice| notice.level == NoticeLevel::Error)
    }

    #[tokio::test]
    async fn test_paging_bounds() {
        let backend = employees(101);
        let mut editor = TableEditor::new(backend.clone(), "employees", 20);
        editor.load(1, None).await.unwrap();

        assert_eq!(editor.pagination().total_pages, 6);
        assert_eq!(editor.rows().len(), 20);

        let calls = backend.network_calls();
        let before = visible(&editor);
        assert!(!editor.change_page(7).await.unwrap());
        assert!(!editor.change_page(0).await.unwrap());
        assert_eq!(backend.network_calls(), calls);
        assert_eq!(visible(&editor), before);
        assert_eq!(editor.pagination().page, 1);

        assert!(editor.change_page(6).await.unwrap());
        assert_eq!(editor.rows().len(), 1);
        assert_eq!(editor.rows()[0].values()["id"], json!(101));
    }

    #[tokio::test]
    async fn test_insert_with_generated_key() {
        let backend = employees(56);
        let mut editor = TableEditor::new(backend.clone(), "employees", 20);
        editor.load(3, None).await.unwrap();

        let mut values = RowValues::new();
        values.insert("id".to_string(), json!("999"));
        values.insert("name".to_string(), json!("Ada"));
        editor.insert_row(values).await.unwrap();

        let inserted = backend
            .calls()
            .into_iter()
            .find_map(|call| match call {
                Call::Insert(values) => Some(values),
                _ => None,
            })
            .unwrap();
        assert!(!inserted.contains_key("id"));
        assert_eq!(inserted["name"], json!("Ada"));

        let ada = editor
            .rows()
            .iter()
            .find(|row| row.values().get("name") == Some(&json!("Ada")))
            .unwrap();
        assert!(!ada.is_pending());
        assert_eq!(ada.values()["id"], json!(57));
        assert!(!ada.values().contains_key("_tempId"));
        assert!(editor.rows().iter().all(|row| !row.is_pending()));
    }

    #[test]
    fn test_reconcile_insert_key_sources() {
        let mut submitted = RowValues::new();
        submitted.insert("name".to_string(), json!("Ada"));

        let response = json!({"id": 57, "name": "Ada"});
        let row = reconcile_insert("id", true, &submitted, None, response.as_object().unwrap().clone());
        assert_eq!(row["id"], json!(57));
        assert_eq!(row["name"], json!("Ada"));

        // Acknowledgement-only response carrying a generic id
        let response = json!({"success": true, "id": 8, "message": "Row inserted"});
        let row = reconcile_insert("code", true, &submitted, None, response.as_object().unwrap().clone());
        assert_eq!(row["code"], json!(8));
        assert!(!row.contains_key("id"));
        assert!(!row.contains_key("success"));

        // Client-supplied key survives a bare acknowledgement
        submitted.insert("code".to_string(), json!("X1"));
        let response = json!({"success": true});
        let row = reconcile_insert(
            "code",
            false,
            &submitted,
            Some(&json!("X1")),
            response.as_object().unwrap().clone(),
        );
        assert_eq!(row["code"], json!("X1"));
    }

    #[tokio::test]
    async fn test_generated_key_is_dropped_before_conversion() {
        let backend = employees(4);
        let mut editor = TableEditor::new(backend.clone(), "employees", 20);
        editor.load(1, None).await.unwrap();

        let mut values = RowValues::new();
        values.insert("id".to_string(), json!("new"));
        values.insert("name".to_string(), json!("Ada"));
        editor.insert_row(values).await.unwrap();

        let inserted: Vec<RowValues> = backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Insert(values) => Some(values),
                _ => None,
            })
            .collect();
        assert_eq!(inserted.len(), 1);
        assert!(!inserted[0].contains_key("id"));

        let ada = editor
            .rows()
            .iter()
            .find(|row| row.values().get("name") == Some(&json!("Ada")))
            .unwrap();
        assert_eq!(ada.values()["id"], json!(5));
    }

    #[tokio::test]
    async fn test_insert_requires_client_key() {
        let backend = codes();
        let mut editor = TableEditor::new(backend.clone(), "codes", 20);
        editor.load(1, None).await.unwrap();
        assert!(!editor.is_auto_increment());

        let calls = backend.network_calls();
        let mut values = RowValues::new();
        values.insert("code".to_string(), json!("  "));
        values.insert("label".to_string(), json!("Blank"));

        let error = editor.insert_row(values).await.unwrap_err();
        assert!(matches!(error, EditorError::MissingPrimaryKey(column) if column == "code"));
        assert_eq!(backend.network_calls(), calls);
        assert!(editor.rows().is_empty());
        assert!(has_error(&editor.take_notices()));

        let mut values = RowValues::new();
        values.insert("code".to_string(), json!("X1"));
        values.insert("label".to_string(), json!("First"));
        editor.insert_row(values).await.unwrap();
        assert_eq!(editor.rows().len(), 1);
        assert_eq!(editor.rows()[0].key("code"), Some(&json!("X1")));
    }

    #[tokio::test]
    async fn test_failed_insert_removes_pending_row() {
        let backend = employees(3);
        backend.with(|state| state.fail_inserts = true);
        let mut editor = TableEditor::new(backend.clone(), "employees", 20);
        editor.load(1, None).await.unwrap();

        let mut values = RowValues::new();
        values.insert("name".to_string(), json!("Ada"));
        assert!(editor.insert_row(values).await.is_err());

        assert_eq!(editor.rows().len(), 3);
        assert!(editor.rows().iter().all(|row| !row.is_pending()));
    }

    #[tokio::test]
    async fn test_commit_without_changes_sends_nothing() {
        let backend = employees(5);
        let mut editor = TableEditor::new(backend.clone(), "employees", 20);
        editor.load(1, None).await.unwrap();
        editor.take_notices();

        let before = visible(&editor);
        editor.begin_edit(2).unwrap();
        editor.set_field("name", "Employee 3").unwrap();
        editor.set_field("id", "3").unwrap();

        let calls = backend.network_calls();
        editor.commit_edit().await.unwrap();

        assert_eq!(backend.network_calls(), calls);
        assert_eq!(visible(&editor), before);
        assert_eq!(editor.editing(), None);
        let notices = editor.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Info);
    }

    #[tokio::test]
    async fn test_commit_sends_field_diff_and_merges() {
        let backend = employees(5);
        let mut editor = TableEditor::new(backend.clone(), "employees", 20);
        editor.load(1, None).await.unwrap();

        editor.begin_edit(1).unwrap();
        editor.set_field("status", "retired").unwrap();
        editor.commit_edit().await.unwrap();

        let mut expected = RowValues::new();
        expected.insert("status".to_string(), json!("retired"));
        assert_eq!(
            backend.calls().last(),
            Some(&Call::Update(json!(2), expected))
        );
        assert_eq!(editor.rows()[1].values()["status"], json!("retired"));
        assert_eq!(editor.editing(), None);
    }

    #[tokio::test]
    async fn test_failed_commit_reloads_server_rows() {
        let backend = employees(5);
        let mut editor = TableEditor::new(backend.clone(), "employees", 20);
        editor.load(1, None).await.unwrap();

        backend.with(|state| {
            state.fail_updates = true;
            // Someone else changed row 1 meanwhile
            state.rows[0].insert("name".to_string(), json!("Renamed"));
        });

        editor.begin_edit(3).unwrap();
        editor.set_field("name", "Changed").unwrap();
        assert!(editor.commit_edit().await.is_err());

        assert_eq!(visible(&editor), backend.server_rows());
        assert_eq!(editor.rows()[3].values()["name"], json!("Employee 4"));
        assert_eq!(editor.editing(), Some(3));
        assert!(has_error(&editor.take_notices()));
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation() {
        let backend = employees(5);
        let mut editor = TableEditor::new(backend.clone(), "employees", 20);
        editor.load(1, None).await.unwrap();

        editor.request_delete(json!(4)).unwrap();
        editor.dismiss_delete();
        assert!(matches!(
            editor.confirm_delete().await,
            Err(EditorError::NoPendingDelete)
        ));
        assert!(!backend.calls().iter().any(|call| matches!(call, Call::Delete(_))));

        editor.request_delete(json!(4)).unwrap();
        editor.confirm_delete().await.unwrap();
        assert!(editor
            .rows()
            .iter()
            .all(|row| row.key("id") != Some(&json!(4))));
        assert_eq!(editor.rows().len(), 4);
    }

    #[tokio::test]
    async fn test_pending_delete_lapses_on_navigation() {
        let backend = employees(30);
        let mut editor = TableEditor::new(backend.clone(), "employees", 10);
        editor.load(1, None).await.unwrap();

        editor.request_delete(json!(3)).unwrap();
        assert!(editor.change_page(2).await.unwrap());
        assert_eq!(editor.pending_delete(), None);
        assert!(matches!(
            editor.confirm_delete().await,
            Err(EditorError::NoPendingDelete)
        ));

        editor.request_delete(json!(12)).unwrap();
        editor.filter("status", "active").await.unwrap();
        assert!(matches!(
            editor.confirm_delete().await,
            Err(EditorError::NoPendingDelete)
        ));

        assert!(!backend.calls().iter().any(|call| matches!(call, Call::Delete(_))));
        assert_eq!(backend.server_rows().len(), 30);
    }

    #[tokio::test]
    async fn test_failed_delete_restores_server_rows() {
        let backend = employees(5);
        backend.with(|state| state.fail_deletes = true);
        let mut editor = TableEditor::new(backend.clone(), "employees", 20);
        editor.load(1, None).await.unwrap();

        editor.request_delete(json!(2)).unwrap();
        assert!(editor.confirm_delete().await.is_err());

        assert_eq!(visible(&editor), backend.server_rows());
        assert_eq!(editor.rows().len(), 5);
    }

    #[tokio::test]
    async fn test_filter_resets_to_first_page() {
        let backend = employees(500);
        let mut editor = TableEditor::new(backend.clone(), "employees", 20);
        editor.load(1, None).await.unwrap();
        assert!(editor.change_page(4).await.unwrap());
        assert_eq!(editor.pagination().page, 4);

        editor.filter("status", "active").await.unwrap();
        assert_eq!(editor.pagination().page, 1);
        assert_eq!(editor.pagination().total, 250);
        assert!(editor
            .rows()
            .iter()
            .all(|row| row.values()["status"] == json!("active")));

        // The filter stays in force across page changes
        assert!(editor.change_page(2).await.unwrap());
        match backend.calls().last() {
            Some(Call::Fetch(query)) => assert_eq!(query.filter(), Some(("status", "active"))),
            other => panic!("unexpected call {:?}", other),
        }

        editor.reset_filter().await.unwrap();
        assert_eq!(editor.pagination().page, 1);
        assert_eq!(editor.pagination().total, 500);
        assert!(editor.active_filter().is_none());
    }

    #[tokio::test]
    async fn test_unsaved_edit_blocks_navigation() {
        let backend = employees(50);
        let mut editor = TableEditor::new(backend.clone(), "employees", 20);
        editor.load(1, None).await.unwrap();

        editor.begin_edit(0).unwrap();
        editor.set_field("name", "Draft").unwrap();

        assert!(matches!(
            editor.change_page(2).await,
            Err(EditorError::UnsavedEdit(0))
        ));
        assert!(matches!(editor.begin_edit(1), Err(EditorError::UnsavedEdit(0))));
        assert!(matches!(
            editor.filter("status", "active").await,
            Err(EditorError::UnsavedEdit(0))
        ));
        assert_eq!(editor.pagination().page, 1);

        editor.cancel_edit();
        editor.begin_edit(1).unwrap();
        // A clean session is dropped silently
        assert!(editor.change_page(2).await.unwrap());
        assert_eq!(editor.editing(), None);
    }

    #[tokio::test]
    async fn test_refresh_keeps_page_and_filter() {
        let backend = employees(60);
        let mut editor = TableEditor::new(backend.clone(), "employees", 10);
        editor.load(1, Some(Filter::new("status", "active"))).await.unwrap();
        assert!(editor.change_page(2).await.unwrap());

        backend.with(|state| {
            state.rows[21].insert("name".to_string(), json!("Renamed"));
        });
        editor.refresh().await.unwrap();

        assert_eq!(editor.pagination().page, 2);
        assert_eq!(editor.pagination().total, 30);
        assert_eq!(editor.rows()[0].values()["id"], json!(22));
        assert_eq!(editor.rows()[0].values()["name"], json!("Renamed"));

        editor.begin_edit(0).unwrap();
        editor.set_field("name", "Draft").unwrap();
        assert!(matches!(editor.refresh().await, Err(EditorError::UnsavedEdit(0))));
    }

    #[tokio::test]
    async fn test_invalid_field_text_is_rejected() {
        let backend = employees(2);
        let mut editor = TableEditor::new(backend.clone(), "employees", 20);
        editor.load(1, None).await.unwrap();

        editor.begin_edit(0).unwrap();
        assert!(matches!(
            editor.set_field("id", "abc"),
            Err(EditorError::InvalidValue { .. })
        ));
        assert!(matches!(
            editor.set_field("salary", "1"),
            Err(EditorError::UnknownColumn(_))
        ));
    }

    #[tokio::test]
    async fn test_metadata_failure_falls_back_to_id() {
        let backend = employees(3);
        backend.with(|state| state.metadata = None);
        let mut editor = TableEditor::new(backend.clone(), "employees", 20);
        editor.load(1, None).await.unwrap();

        assert_eq!(editor.primary_key(), "id");
        assert!(editor.is_auto_increment());
        assert_eq!(editor.rows().len(), 3);
    }

    #[tokio::test]
    async fn test_access_denied_state() {
        let backend = employees(3);
        backend.with(|state| state.deny = true);
        let mut editor = TableEditor::new(backend.clone(), "employees", 20);

        assert!(editor.load(1, None).await.is_err());
        assert!(matches!(editor.status(), ViewStatus::AccessDenied(_)));
        assert!(editor.rows().is_empty());
    }

    #[tokio::test]
    async fn test_columns_for_empty_table_come_from_metadata() {
        let backend = codes();
        let mut editor = TableEditor::new(backend.clone(), "codes", 20);
        editor.load(1, None).await.unwrap();

        assert!(editor.rows().is_empty());
        assert_eq!(editor.columns(), vec!["code".to_string(), "label".to_string()]);

        let populated = employees(1);
        let mut editor = TableEditor::new(populated, "employees", 20);
        editor.load(1, None).await.unwrap();
        assert_eq!(
            editor.columns(),
            vec!["id".to_string(), "name".to_string(), "status".to_string()]
        );
    }
}
