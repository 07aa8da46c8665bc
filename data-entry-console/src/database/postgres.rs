//! PostgreSQL database provider implementation

use crate::database::traits::{DatabaseError, DatabaseProvider};
use crate::database::{describe_table, describe_tables, like_pattern, quote_identifier};
use crate::schema::{
    total_pages, value_text, ColumnInfo, ConnectionSettings, PageQuery, PageResponse, RowValues,
    TableInfo, TableMetadata,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Postgres, Row, TypeInfo};
use std::collections::HashMap;
use tokio::sync::RwLock;

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

const DEFAULT_PORT: u16 = 5432;

/// PostgreSQL database provider
pub struct PostgresProvider {
    pool: RwLock<PgPool>,
}

impl PostgresProvider {
    /// Create a new PostgreSQL provider
    ///
    /// # Arguments
    ///
    /// * `pool` - PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: RwLock::new(pool),
        }
    }

    async fn pool(&self) -> PgPool {
        self.pool.read().await.clone()
    }

    /// Convert a PostgreSQL row to a JSON object
    fn row_to_json(row: &PgRow) -> Result<RowValues, DatabaseError> {
        let mut map = RowValues::new();

        for column in row.columns() {
            let column_name = column.name();

            let value: Value = match column.type_info().name() {
                "BOOL" => {
                    let val: Option<bool> = row.try_get(column_name)?;
                    val.map(Value::Bool).unwrap_or(Value::Null)
                }
                "INT2" => {
                    let val: Option<i16> = row.try_get(column_name)?;
                    val.map(Value::from).unwrap_or(Value::Null)
                }
                "INT4" => {
                    let val: Option<i32> = row.try_get(column_name)?;
                    val.map(Value::from).unwrap_or(Value::Null)
                }
                "INT8" => {
                    let val: Option<i64> = row.try_get(column_name)?;
                    val.map(Value::from).unwrap_or(Value::Null)
                }
                "FLOAT4" => {
                    let val: Option<f32> = row.try_get(column_name)?;
                    val.and_then(|v| serde_json::Number::from_f64(f64::from(v)))
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
                "FLOAT8" => {
                    let val: Option<f64> = row.try_get(column_name)?;
                    val.and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
                "BYTEA" => {
                    let val: Option<Vec<u8>> = row.try_get(column_name)?;
                    val.map(|bytes| Value::String(format!("[BLOB: {} bytes]", bytes.len())))
                        .unwrap_or(Value::Null)
                }
                "JSON" | "JSONB" => {
                    let val: Option<Value> = row.try_get(column_name)?;
                    val.unwrap_or(Value::Null)
                }
                _ => {
                    // Text-like and everything else; rows are selected with
                    // text casts for types sqlx cannot decode as String
                    let val: Option<String> = row.try_get(column_name).ok().flatten();
                    val.map(Value::String).unwrap_or(Value::Null)
                }
            };

            map.insert(column_name.to_string(), value);
        }

        Ok(map)
    }

    /// Bind a JSON scalar; the SQL side casts it to the column's type
    fn bind_value<'q>(query: PgQuery<'q>, value: &Value) -> PgQuery<'q> {
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

    /// A placeholder cast to the column's declared type
    fn placeholder(index: usize, column: &str, types: &HashMap<String, String>) -> String {
        match types.get(column) {
            Some(udt) => format!("CAST(${} AS {})", index, quote_identifier(udt)),
            None => format!("${}", index),
        }
    }

    /// Map column name to its underlying type name
    async fn column_types(
        &self,
        pool: &PgPool,
        table: &str,
    ) -> Result<HashMap<String, String>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT column_name::text AS column_name, udt_name::text AS udt_name
            FROM information_schema.columns
            WHERE table_schema = 'public'
              AND table_name = $1
            "#,
        )
        .bind(table)
        .fetch_all(pool)
        .await?;

        if rows.is_empty() {
            return Err(DatabaseError::TableNotFound(table.to_string()));
        }

        rows.iter()
            .map(|row| Ok((row.try_get("column_name")?, row.try_get("udt_name")?)))
            .collect::<Result<HashMap<_, _>, sqlx::Error>>()
            .map_err(DatabaseError::from)
    }

    /// Select list that turns types without a JSON mapping into text
    async fn select_list(&self, pool: &PgPool, table: &str) -> Result<String, DatabaseError> {
        let types = self.column_types(pool, table).await?;
        let metadata = self.table_metadata(table).await?;

        let columns: Vec<String> = metadata
            .columns
            .iter()
            .map(|column| {
                let quoted = quote_identifier(&column.name);
                match types.get(&column.name).map(String::as_str) {
                    Some(
                        "bool" | "int2" | "int4" | "int8" | "float4" | "float8" | "bytea" | "json"
                        | "jsonb" | "text" | "varchar" | "bpchar" | "name",
                    ) => quoted,
                    _ => format!("{}::text AS {}", quoted, quoted),
                }
            })
            .collect();

        Ok(columns.join(", "))
    }
}

#[async_trait]
impl DatabaseProvider for PostgresProvider {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, DatabaseError> {
        let query = r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = 'public'
              AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;

        let names: Vec<String> = sqlx::query_scalar(query).fetch_all(&self.pool().await).await?;

        Ok(describe_tables(names))
    }

    async fn table_metadata(&self, table: &str) -> Result<TableMetadata, DatabaseError> {
        let pool = self.pool().await;

        let column_query = r#"
            SELECT
                column_name::text AS column_name,
                data_type::text AS data_type,
                is_nullable::text AS is_nullable,
                column_default::text AS column_default,
                is_identity::text AS is_identity
            FROM information_schema.columns
            WHERE table_schema = 'public'
              AND table_name = $1
            ORDER BY ordinal_position
        "#;

        let column_rows = sqlx::query(column_query).bind(table).fetch_all(&pool).await?;

        if column_rows.is_empty() {
            return Err(DatabaseError::TableNotFound(table.to_string()));
        }

        let pk_query = r#"
            SELECT kcu.column_name::text AS column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
              AND tc.table_schema = kcu.table_schema
            WHERE tc.table_schema = 'public'
              AND tc.table_name = $1
              AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY kcu.ordinal_position
        "#;

        let key_columns: Vec<String> = sqlx::query_scalar(pk_query).bind(table).fetch_all(&pool).await?;

        let columns: Vec<ColumnInfo> = column_rows
            .iter()
            .map(|row| {
                let name: String = row.try_get("column_name")?;
                let is_nullable: String = row.try_get("is_nullable")?;
                let column_default: Option<String> = row.try_get("column_default")?;
                let is_identity: Option<String> = row.try_get("is_identity")?;

                let generated = column_default
                    .as_deref()
                    .is_some_and(|default| default.starts_with("nextval("))
                    || is_identity.as_deref() == Some("YES");

                Ok(ColumnInfo {
                    primary_key: key_columns.contains(&name),
                    auto_increment: generated,
                    data_type: row.try_get("data_type")?,
                    nullable: is_nullable == "YES",
                    name,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let (primary_key, is_auto_increment) = match key_columns.as_slice() {
            [key] => {
                let generated = columns
                    .iter()
                    .any(|column| &column.name == key && column.auto_increment);
                (Some(key.clone()), generated)
            }
            _ => (None, false),
        };

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
        let select_list = self.select_list(&pool, table).await?;
        let quoted_table = quote_identifier(table);

        let (where_clause, pattern) = match query.filter() {
            Some((column, value)) => (
                format!(" WHERE CAST({} AS TEXT) ILIKE $1", quote_identifier(column)),
                Some(like_pattern(value)),
            ),
            None => (String::new(), None),
        };

        let count_query = format!("SELECT COUNT(*) FROM {}{}", quoted_table, where_clause);
        let mut count_sql_query = sqlx::query_scalar::<_, i64>(&count_query);
        if let Some(pattern) = &pattern {
            count_sql_query = count_sql_query.bind(pattern.clone());
        }
        let total = count_sql_query.fetch_one(&pool).await?.max(0) as u64;

        let order_clause = order_by
            .map(|column| format!(" ORDER BY {}", quote_identifier(column)))
            .unwrap_or_default();
        let next_parameter = if pattern.is_some() { 2 } else { 1 };

        let select_query = format!(
            "SELECT {} FROM {}{}{} LIMIT ${} OFFSET ${}",
            select_list,
            quoted_table,
            where_clause,
            order_clause,
            next_parameter,
            next_parameter + 1
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
        let pool = self.pool().await;
        let types = self.column_types(&pool, table).await?;
        let select_list = self.select_list(&pool, table).await?;

        let insert_query = if values.is_empty() {
            format!(
                "INSERT INTO {} DEFAULT VALUES RETURNING {}",
                quote_identifier(table),
                select_list
            )
        } else {
            let columns: Vec<String> = values.keys().map(|column| quote_identifier(column)).collect();
            let placeholders: Vec<String> = values
                .keys()
                .enumerate()
                .map(|(index, column)| Self::placeholder(index + 1, column, &types))
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                quote_identifier(table),
                columns.join(", "),
                placeholders.join(", "),
                select_list
            )
        };

        let mut sql_query = sqlx::query(&insert_query);
        for value in values.values() {
            sql_query = Self::bind_value(sql_query, value);
        }

        let row = sql_query.fetch_one(&pool).await?;
        Self::row_to_json(&row)
    }

    async fn update_row(
        &self,
        table: &str,
        key: &str,
        id: &Value,
        values: &RowValues,
    ) -> Result<RowValues, DatabaseError> {
        let pool = self.pool().await;
        let types = self.column_types(&pool, table).await?;
        let select_list = self.select_list(&pool, table).await?;

        let assignments: Vec<String> = values
            .keys()
            .enumerate()
            .map(|(index, column)| {
                format!(
                    "{} = {}",
                    quote_identifier(column),
                    Self::placeholder(index + 1, column, &types)
                )
            })
            .collect();

        let update_query = format!(
            "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
            quote_identifier(table),
            assignments.join(", "),
            quote_identifier(key),
            Self::placeholder(values.len() + 1, key, &types),
            select_list
        );

        let mut sql_query = sqlx::query(&update_query);
        for value in values.values() {
            sql_query = Self::bind_value(sql_query, value);
        }
        sql_query = Self::bind_value(sql_query, id);

        match sql_query.fetch_optional(&pool).await? {
            Some(row) => Self::row_to_json(&row),
            None => Err(DatabaseError::RowNotFound {
                table: table.to_string(),
                key: key.to_string(),
                id: value_text(id),
            }),
        }
    }

    async fn delete_row(&self, table: &str, key: &str, id: &Value) -> Result<(), DatabaseError> {
        let pool = self.pool().await;
        let types = self.column_types(&pool, table).await?;

        let delete_query = format!(
            "DELETE FROM {} WHERE {} = {}",
            quote_identifier(table),
            quote_identifier(key),
            Self::placeholder(1, key, &types)
        );

        let result = Self::bind_value(sqlx::query(&delete_query), id)
            .execute(&pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::RowNotFound {
                table: table.to_string(),
                key: key.to_string(),
                id: value_text(id),
            });
        }

        Ok(())
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool().await).await?;
        Ok(())
    }

    async fn reconnect(&self, settings: &ConnectionSettings) -> Result<(), DatabaseError> {
        let endpoint = settings.endpoint.trim();
        if endpoint.is_empty() {
            return Err(DatabaseError::Connection("an endpoint is required".to_string()));
        }

        let port = match settings.port.trim() {
            "" => DEFAULT_PORT,
            port => port
                .parse::<u16>()
                .map_err(|_| DatabaseError::Connection(format!("invalid port '{}'", port)))?,
        };

        let mut options = PgConnectOptions::new().host(endpoint).port(port);
        if !settings.username.is_empty() {
            options = options.username(&settings.username);
        }
        if !settings.password.is_empty() {
            options = options.password(&settings.password);
        }
        if !settings.database.is_empty() {
            options = options.database(&settings.database);
        }

        let pool = PgPoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|error| DatabaseError::Connection(error.to_string()))?;

        let previous = std::mem::replace(&mut *self.pool.write().await, pool);
        previous.close().await;
        tracing::info!(endpoint, port, "PostgreSQL connection replaced");

        Ok(())
    }
}
