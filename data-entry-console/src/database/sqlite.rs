//! SQLite database provider implementation

use crate::database::traits::{DatabaseError, DatabaseProvider};
use crate::database::{describe_table, describe_tables, like_pattern, quote_identifier};
use crate::schema::{
    total_pages, ColumnInfo, ConnectionSettings, PageQuery, PageResponse, RowValues, TableInfo,
    TableMetadata,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};
use std::str::FromStr;
use tokio::sync::RwLock;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite database provider
pub struct SqliteProvider {
    pool: RwLock<SqlitePool>,
}

impl SqliteProvider {
    /// Create a new SQLite provider
    ///
    /// # Arguments
    ///
    /// * `pool` - SQLite connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: RwLock::new(pool),
        }
    }

    async fn pool(&self) -> SqlitePool {
        self.pool.read().await.clone()
    }

    /// Convert a SQLite row to a JSON object
    fn row_to_json(row: &SqliteRow) -> Result<RowValues, DatabaseError> {
        let mut map = RowValues::new();

        for column in row.columns() {
            let value = Self::extract_column_value(row, column)?;
            map.insert(column.name().to_string(), value);
        }

        Ok(map)
    }

    /// Extract a column value from a SQLite row and convert to JSON
    fn extract_column_value(
        row: &SqliteRow,
        column: &sqlx::sqlite::SqliteColumn,
    ) -> Result<Value, DatabaseError> {
        let ordinal = column.ordinal();

        if row.try_get_raw(ordinal)?.is_null() {
            return Ok(Value::Null);
        }

        // SQLite reports storage affinities; try the matching type first
        match column.type_info().name() {
            "INTEGER" | "BIGINT" | "INT" => {
                if let Ok(value) = row.try_get::<i64, _>(ordinal) {
                    return Ok(Value::from(value));
                }
            }
            "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
                if let Ok(value) = row.try_get::<f64, _>(ordinal) {
                    if let Some(number) = serde_json::Number::from_f64(value) {
                        return Ok(Value::Number(number));
                    }
                }
            }
            "BOOLEAN" | "BOOL" => {
                if let Ok(value) = row.try_get::<bool, _>(ordinal) {
                    return Ok(Value::Bool(value));
                }
            }
            "BLOB" => {
                if let Ok(value) = row.try_get::<Vec<u8>, _>(ordinal) {
                    return Ok(Value::String(format!("[BLOB: {} bytes]", value.len())));
                }
            }
            _ => {
                if let Ok(value) = row.try_get::<String, _>(ordinal) {
                    return Ok(Value::String(value));
                }
            }
        }

        // Fallback: try common types in order
        if let Ok(value) = row.try_get::<i64, _>(ordinal) {
            return Ok(Value::from(value));
        }
        if let Ok(value) = row.try_get::<f64, _>(ordinal) {
            if let Some(number) = serde_json::Number::from_f64(value) {
                return Ok(Value::Number(number));
            }
        }
        if let Ok(value) = row.try_get::<String, _>(ordinal) {
            return Ok(Value::String(value));
        }

        Ok(Value::Null)
    }

    /// Bind a JSON scalar using the closest SQLite storage class
    fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
        match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(flag) => query.bind(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(integer) => query.bind(integer),
                None => query.bind(number.as_f64().unwrap_or_default()),
            },
            Value::String(text) => query.bind(text.clone()),
            other => query.bind(other.to_string()),
        }
    }

    /// Build a WHERE clause for a case-insensitive substring filter
    fn build_where_clause(query: &PageQuery) -> (String, Option<String>) {
        match query.filter() {
            Some((column, value)) => (
                format!(
                    " WHERE CAST({} AS TEXT) LIKE ? ESCAPE '\\'",
                    quote_identifier(column)
                ),
                Some(like_pattern(value)),
            ),
            None => (String::new(), None),
        }
    }

    async fn ensure_table(&self, pool: &SqlitePool, table: &str) -> Result<(), DatabaseError> {
        let table_exists: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name = ? AND name NOT LIKE 'sqlite_%'",
        )
        .bind(table)
        .fetch_optional(pool)
        .await?;

        match table_exists {
            Some(_) => Ok(()),
            None => Err(DatabaseError::TableNotFound(table.to_string())),
        }
    }
}

#[async_trait]
impl DatabaseProvider for SqliteProvider {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, DatabaseError> {
        let query = "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

        let names: Vec<String> = sqlx::query_scalar(query).fetch_all(&self.pool().await).await?;

        Ok(describe_tables(names))
    }

    async fn table_metadata(&self, table: &str) -> Result<TableMetadata, DatabaseError> {
        // PRAGMA table_info returns: cid, name, type, notnull, dflt_value, pk
        let table_info_query = format!("PRAGMA table_info({})", quote_identifier(table));
        let column_rows = sqlx::query(&table_info_query)
            .fetch_all(&self.pool().await)
            .await?;

        if column_rows.is_empty() {
            return Err(DatabaseError::TableNotFound(table.to_string()));
        }

        let mut columns = Vec::with_capacity(column_rows.len());
        for row in column_rows {
            let name: String = row.try_get("name")?;
            let data_type: String = row.try_get("type")?;
            let not_null: i32 = row.try_get("notnull")?;
            let primary_key: i32 = row.try_get("pk")?;

            columns.push(ColumnInfo {
                name,
                data_type,
                primary_key: primary_key > 0,
                nullable: not_null == 0,
                auto_increment: false,
            });
        }

        // Composite keys cannot address a row through a single path segment
        let key_columns: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.primary_key)
            .map(|(index, _)| index)
            .collect();

        let mut primary_key = None;
        let mut is_auto_increment = false;
        if let [index] = key_columns.as_slice() {
            // A lone INTEGER PRIMARY KEY aliases the rowid and is generated on insert
            let column = &mut columns[*index];
            is_auto_increment = column.data_type.eq_ignore_ascii_case("INTEGER");
            column.auto_increment = is_auto_increment;
            primary_key = Some(column.name.clone());
        }

        Ok(TableMetadata {
            name: table.to_string(),
            description: Some(describe_table(table)),
            columns,
            primary_key,
            is_auto_increment: Some(is_auto_increment),
        })
    }

    async fn fetch_page(
        &self,
        table: &str,
        query: &PageQuery,
        order_by: Option<&str>,
    ) -> Result<PageResponse, DatabaseError> {
        let pool = self.pool().await;
        self.ensure_table(&pool, table).await?;

        let (where_clause, pattern) = Self::build_where_clause(query);

        let count_query = format!("SELECT COUNT(*) FROM {}{}", quote_identifier(table), where_clause);
        let mut count_sql_query = sqlx::query_scalar::<_, i64>(&count_query);
        if let Some(pattern) = &pattern {
            count_sql_query = count_sql_query.bind(pattern.clone());
        }
        let total = count_sql_query.fetch_one(&pool).await?.max(0) as u64;

        let order_clause = order_by
            .map(|column| format!(" ORDER BY {}", quote_identifier(column)))
            .unwrap_or_default();

        let select_query = format!(
            "SELECT * FROM {}{}{} LIMIT ? OFFSET ?",
            quote_identifier(table),
            where_clause,
            order_clause
        );

        let mut sql_query = sqlx::query(&select_query);
        if let Some(pattern) = &pattern {
            sql_query = sql_query.bind(pattern.clone());
        }
        sql_query = sql_query
            .bind(i64::from(query.page_size))
            .bind(query.offset() as i64);

        let rows = sql_query.fetch_all(&pool).await?;
        let data = rows
            .iter()
            .map(Self::row_to_json)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PageResponse {
            data,
            page: query.page,
            page_size: query.page_size,
            total_pages: total_pages(total, query.page_size),
            total,
        })
    }

    async fn insert_row(&self, table: &str, values: &RowValues) -> Result<RowValues, DatabaseError> {
        let insert_query = if values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quote_identifier(table))
        } else {
            let columns: Vec<String> = values.keys().map(|column| quote_identifier(column)).collect();
            let placeholders = vec!["?"; values.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
                quote_identifier(table),
                columns.join(", "),
                placeholders
            )
        };

        let mut sql_query = sqlx::query(&insert_query);
        for value in values.values() {
            sql_query = Self::bind_value(sql_query, value);
        }

        let row = sql_query.fetch_one(&self.pool().await).await?;
        Self::row_to_json(&row)
    }

    async fn update_row(
        &self,
        table: &str,
        key: &str,
        id: &Value,
        values: &RowValues,
    ) -> Result<RowValues, DatabaseError> {
        let assignments: Vec<String> = values
            .keys()
            .map(|column| format!("{} = ?", quote_identifier(column)))
            .collect();

        let update_query = format!(
            "UPDATE {} SET {} WHERE {} = ? RETURNING *",
            quote_identifier(table),
            assignments.join(", "),
            quote_identifier(key)
        );

        let mut sql_query = sqlx::query(&update_query);
        for value in values.values() {
            sql_query = Self::bind_value(sql_query, value);
        }
        sql_query = Self::bind_value(sql_query, id);

        match sql_query.fetch_optional(&self.pool().await).await? {
            Some(row) => Self::row_to_json(&row),
            None => Err(DatabaseError::RowNotFound {
                table: table.to_string(),
                key: key.to_string(),
                id: crate::schema::value_text(id),
            }),
        }
    }

    async fn delete_row(&self, table: &str, key: &str, id: &Value) -> Result<(), DatabaseError> {
        let delete_query = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_identifier(table),
            quote_identifier(key)
        );

        let result = Self::bind_value(sqlx::query(&delete_query), id)
            .execute(&self.pool().await)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::RowNotFound {
                table: table.to_string(),
                key: key.to_string(),
                id: crate::schema::value_text(id),
            });
        }

        Ok(())
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool().await).await?;
        Ok(())
    }

    async fn reconnect(&self, settings: &ConnectionSettings) -> Result<(), DatabaseError> {
        let database = settings.database.trim();
        if database.is_empty() {
            return Err(DatabaseError::Connection(
                "a database file path is required".to_string(),
            ));
        }

        let options = if database == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|error| DatabaseError::Connection(error.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(database)
                .create_if_missing(true)
        };

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|error| DatabaseError::Connection(error.to_string()))?;

        let previous = std::mem::replace(&mut *self.pool.write().await, pool);
        previous.close().await;
        tracing::info!(database, "SQLite connection replaced");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn provider() -> SqliteProvider {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(
            "CREATE TABLE employees (id INTEGER PRIMARY KEY, name TEXT NOT NULL, status TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("CREATE TABLE codes (code TEXT PRIMARY KEY, label TEXT)")
            .execute(&pool)
            .await
            .unwrap();

        for index in 1..=101 {
            let status = if index % 2 == 0 { "active" } else { "retired" };
            sqlx::query("INSERT INTO employees (name, status) VALUES (?, ?)")
                .bind(format!("Employee {}", index))
                .bind(status)
                .execute(&pool)
                .await
                .unwrap();
        }

        SqliteProvider::new(pool)
    }

    fn page(page: u32, page_size: u32) -> PageQuery {
        PageQuery {
            page,
            page_size,
            ..PageQuery::default()
        }
    }

    #[tokio::test]
    async fn test_metadata_detects_rowid_alias() {
        let provider = provider().await;

        let employees = provider.table_metadata("employees").await.unwrap();
        assert_eq!(employees.primary_key.as_deref(), Some("id"));
        assert_eq!(employees.is_auto_increment, Some(true));
        assert!(employees.column("id").unwrap().auto_increment);
        assert!(!employees.column("name").unwrap().nullable);

        let codes = provider.table_metadata("codes").await.unwrap();
        assert_eq!(codes.primary_key.as_deref(), Some("code"));
        assert_eq!(codes.is_auto_increment, Some(false));

        assert!(matches!(
            provider.table_metadata("missing").await,
            Err(DatabaseError::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pagination_of_101_rows() {
        let provider = provider().await;

        let first = provider.fetch_page("employees", &page(1, 20), Some("id")).await.unwrap();
        assert_eq!(first.total, 101);
        assert_eq!(first.total_pages, 6);
        assert_eq!(first.data.len(), 20);
        assert_eq!(first.data[0]["id"], json!(1));

        let last = provider.fetch_page("employees", &page(6, 20), Some("id")).await.unwrap();
        assert_eq!(last.data.len(), 1);
        assert_eq!(last.data[0]["id"], json!(101));
    }

    #[tokio::test]
    async fn test_filter_is_case_insensitive_substring() {
        let provider = provider().await;

        let query = PageQuery {
            page: 1,
            page_size: 20,
            filter_column: Some("status".to_string()),
            filter_value: Some("ACT".to_string()),
        };
        let filtered = provider.fetch_page("employees", &query, Some("id")).await.unwrap();
        assert_eq!(filtered.total, 50);
        assert_eq!(filtered.total_pages, 3);
        assert!(filtered.data.iter().all(|row| row["status"] == json!("active")));
    }

    #[tokio::test]
    async fn test_insert_update_delete() {
        let provider = provider().await;

        let mut values = RowValues::new();
        values.insert("name".to_string(), json!("Ada"));
        let inserted = provider.insert_row("employees", &values).await.unwrap();
        assert_eq!(inserted["id"], json!(102));
        assert_eq!(inserted["name"], json!("Ada"));

        let mut changes = RowValues::new();
        changes.insert("status".to_string(), json!("active"));
        let updated = provider
            .update_row("employees", "id", &json!(102), &changes)
            .await
            .unwrap();
        assert_eq!(updated["status"], json!("active"));
        assert_eq!(updated["name"], json!("Ada"));

        provider.delete_row("employees", "id", &json!(102)).await.unwrap();
        assert!(matches!(
            provider.delete_row("employees", "id", &json!(102)).await,
            Err(DatabaseError::RowNotFound { .. })
        ));
        assert!(matches!(
            provider.update_row("employees", "id", &json!(102), &changes).await,
            Err(DatabaseError::RowNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_tables() {
        let provider = provider().await;
        let tables = provider.list_tables().await.unwrap();
        let names: Vec<&str> = tables.iter().map(|table| table.name.as_str()).collect();
        assert_eq!(names, vec!["codes", "employees"]);
    }

    #[tokio::test]
    async fn test_reconnect_requires_database_path() {
        let provider = provider().await;
        let result = provider.reconnect(&ConnectionSettings::default()).await;
        assert!(matches!(result, Err(DatabaseError::Connection(_))));
        // the old pool is still in service
        provider.ping().await.unwrap();
    }
}
