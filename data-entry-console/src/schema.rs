//! Shared data model for the console backend and client
//!
//! These types describe tables, columns, rows and pages as they travel over
//! the REST surface. Both halves of the crate serialize the same shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A row as it travels over the wire: column name to scalar value
pub type RowValues = Map<String, Value>;

/// Primary-key column assumed when metadata does not name one
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Default page size used by the backend when the request omits one
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Largest page the backend will serve
pub const MAX_PAGE_SIZE: u32 = 100;

/// Information about a table (for listing)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Position-derived identifier, stable for a given schema
    pub id: u32,

    /// Table name
    pub name: String,

    /// Human readable description
    #[serde(default)]
    pub description: Option<String>,
}

/// Information about a single column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,

    /// SQL data type as reported by the database (e.g. "INTEGER", "character varying")
    #[serde(rename = "type")]
    pub data_type: String,

    /// Whether this column is the table's primary key
    #[serde(default)]
    pub primary_key: bool,

    /// Whether the column allows NULL values
    #[serde(default = "default_true")]
    pub nullable: bool,

    /// Whether the database generates this column's value on insert
    #[serde(default)]
    pub auto_increment: bool,
}

impl ColumnInfo {
    /// The field kind used to coerce edited values for this column
    pub fn kind(&self) -> FieldKind {
        FieldKind::from_sql_type(&self.data_type)
    }
}

fn default_true() -> bool {
    true
}

/// Complete metadata for a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    /// Name of the table
    pub name: String,

    /// Human readable description
    #[serde(default)]
    pub description: Option<String>,

    /// Columns in declaration order
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,

    /// Primary-key column name, if the table has a single-column key
    #[serde(default)]
    pub primary_key: Option<String>,

    /// Whether the primary key is generated by the database
    #[serde(default)]
    pub is_auto_increment: Option<bool>,
}

impl TableMetadata {
    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// The column used to address rows, falling back to `id`
    pub fn key_column(&self) -> &str {
        self.primary_key.as_deref().unwrap_or(DEFAULT_PRIMARY_KEY)
    }
}

/// Query parameters for fetching one page of rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageQuery {
    /// One-based page number
    #[serde(default = "default_page")]
    pub page: u32,

    /// Rows per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Column to filter on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_column: Option<String>,

    /// Substring the filter column must contain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_value: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
            filter_column: None,
            filter_value: None,
        }
    }
}

impl PageQuery {
    /// The active filter, present only when both column and value are non-empty
    pub fn filter(&self) -> Option<(&str, &str)> {
        match (self.filter_column.as_deref(), self.filter_value.as_deref()) {
            (Some(column), Some(value)) if !column.is_empty() && !value.is_empty() => {
                Some((column, value))
            }
            _ => None,
        }
    }

    /// Zero-based row offset of the first row on this page
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// Response containing one page of rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    /// The rows on this page
    pub data: Vec<RowValues>,

    /// One-based page number
    pub page: u32,

    /// Rows per page
    pub page_size: u32,

    /// Number of pages for the current filter
    pub total_pages: u32,

    /// Number of rows matching the current filter
    pub total: u64,
}

/// Number of pages needed to show `total` rows, zero for an empty result
pub fn total_pages(total: u64, page_size: u32) -> u32 {
    if total == 0 || page_size == 0 {
        return 0;
    }
    let page_size = u64::from(page_size);
    u32::try_from(total.div_ceil(page_size)).unwrap_or(u32::MAX)
}

/// Query parameter naming the column rows are addressed by
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyQuery {
    /// Primary-key column override
    #[serde(default)]
    pub pk: Option<String>,
}

/// Generic acknowledgement body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationResponse {
    pub success: bool,

    #[serde(default)]
    pub message: String,
}

/// How a column's values are typed when edited as text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Real,
    Boolean,
    Text,
}

impl FieldKind {
    /// Infer the field kind from a SQL type name
    pub fn from_sql_type(sql_type: &str) -> Self {
        let upper = sql_type.trim().to_ascii_uppercase();

        if upper.starts_with("BOOL") {
            return FieldKind::Boolean;
        }

        let integer = (upper.starts_with("INT") && !upper.starts_with("INTERVAL"))
            || ["BIGINT", "SMALLINT", "TINYINT", "MEDIUMINT", "SERIAL"]
                .iter()
                .any(|name| upper.contains(name));
        if integer {
            return FieldKind::Integer;
        }

        if ["REAL", "FLOAT", "DOUBLE", "NUMERIC", "DECIMAL"]
            .iter()
            .any(|name| upper.contains(name))
        {
            return FieldKind::Real;
        }

        FieldKind::Text
    }

    /// Convert a JSON value into this kind
    ///
    /// Empty strings become NULL for non-text kinds. Arrays and objects are
    /// never valid cell values.
    pub fn coerce(self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (_, value @ (Value::Array(_) | Value::Object(_))) => {
                Err(format!("{} is not a scalar value", value))
            }
            (FieldKind::Text, Value::String(text)) => Ok(Value::String(text)),
            (FieldKind::Text, other) => Ok(Value::String(other.to_string())),
            (_, Value::String(text)) if text.trim().is_empty() => Ok(Value::Null),
            (FieldKind::Integer, Value::Number(number)) => {
                if number.is_i64() || number.is_u64() {
                    Ok(Value::Number(number))
                } else {
                    match number.as_f64() {
                        Some(float) if float.fract() == 0.0 => Ok(Value::from(float as i64)),
                        _ => Err(format!("{} is not an integer", number)),
                    }
                }
            }
            (FieldKind::Integer, Value::String(text)) => text
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("'{}' is not an integer", text)),
            (FieldKind::Integer, Value::Bool(flag)) => Ok(Value::from(i64::from(flag))),
            (FieldKind::Real, Value::Number(number)) => Ok(Value::Number(number)),
            (FieldKind::Real, Value::String(text)) => text
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("'{}' is not a number", text)),
            (FieldKind::Real, Value::Bool(flag)) => Ok(Value::from(if flag { 1.0 } else { 0.0 })),
            (FieldKind::Boolean, Value::Bool(flag)) => Ok(Value::Bool(flag)),
            (FieldKind::Boolean, Value::Number(number)) => match number.as_i64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err(format!("{} is not a boolean", number)),
            },
            (FieldKind::Boolean, Value::String(text)) => {
                match text.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Ok(Value::Bool(true)),
                    "false" | "0" | "no" => Ok(Value::Bool(false)),
                    _ => Err(format!("'{}' is not a boolean", text)),
                }
            }
        }
    }
}

/// Render a cell value as plain text (NULL renders empty)
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Whether two key values address the same row
///
/// Keys are compared by their text form so that `57` and `"57"` match.
pub fn key_matches(left: &Value, right: &Value) -> bool {
    !left.is_null() && !right.is_null() && value_text(left) == value_text(right)
}

/// Where a connection setting's effective value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingSource {
    Override,
    Env,
    Default,
}

/// A connection setting together with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingField {
    pub value: String,
    pub source: SettingSource,
}

/// Database connection settings as submitted by the settings form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Server host, ignored by SQLite
    pub endpoint: String,

    /// Server port
    pub port: String,

    /// Database name, or file path for SQLite
    pub database: String,

    /// Login user
    pub username: String,

    /// Login password
    pub password: String,
}

impl ConnectionSettings {
    /// Field names in form order
    pub const FIELDS: [&'static str; 5] = ["endpoint", "port", "database", "username", "password"];

    /// Borrow a field by its wire name
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "endpoint" => Some(&self.endpoint),
            "port" => Some(&self.port),
            "database" => Some(&self.database),
            "username" => Some(&self.username),
            "password" => Some(&self.password),
            _ => None,
        }
    }

    /// Mutably borrow a field by its wire name
    pub fn field_mut(&mut self, name: &str) -> Option<&mut String> {
        match name {
            "endpoint" => Some(&mut self.endpoint),
            "port" => Some(&mut self.port),
            "database" => Some(&mut self.database),
            "username" => Some(&mut self.username),
            "password" => Some(&mut self.password),
            _ => None,
        }
    }
}

/// Settings as reported by `GET /settings/db-credentials`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub endpoint: SettingField,
    pub port: SettingField,
    pub database: SettingField,
    pub username: SettingField,
    pub password: SettingField,
}

impl SettingsResponse {
    /// Borrow a field by its wire name
    pub fn field(&self, name: &str) -> Option<&SettingField> {
        match name {
            "endpoint" => Some(&self.endpoint),
            "port" => Some(&self.port),
            "database" => Some(&self.database),
            "username" => Some(&self.username),
            "password" => Some(&self.password),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_kind_inference() {
        assert_eq!(FieldKind::from_sql_type("INTEGER"), FieldKind::Integer);
        assert_eq!(FieldKind::from_sql_type("bigint"), FieldKind::Integer);
        assert_eq!(FieldKind::from_sql_type("interval"), FieldKind::Text);
        assert_eq!(FieldKind::from_sql_type("double precision"), FieldKind::Real);
        assert_eq!(FieldKind::from_sql_type("NUMERIC(10,2)"), FieldKind::Real);
        assert_eq!(FieldKind::from_sql_type("boolean"), FieldKind::Boolean);
        assert_eq!(FieldKind::from_sql_type("VARCHAR(255)"), FieldKind::Text);
        assert_eq!(FieldKind::from_sql_type("POINT"), FieldKind::Text);
    }

    #[test]
    fn test_coerce_from_text() {
        assert_eq!(FieldKind::Integer.coerce(json!("57")), Ok(json!(57)));
        assert_eq!(FieldKind::Integer.coerce(json!("")), Ok(Value::Null));
        assert!(FieldKind::Integer.coerce(json!("abc")).is_err());
        assert_eq!(FieldKind::Real.coerce(json!("2.5")), Ok(json!(2.5)));
        assert_eq!(FieldKind::Boolean.coerce(json!("Yes")), Ok(json!(true)));
        assert_eq!(FieldKind::Text.coerce(json!(12)), Ok(json!("12")));
        assert_eq!(FieldKind::Text.coerce(json!("")), Ok(json!("")));
        assert!(FieldKind::Text.coerce(json!([1])).is_err());
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(101, 20), 6);
        assert_eq!(total_pages(100, 20), 5);
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(1, 50), 1);
    }

    #[test]
    fn test_page_query_filter_requires_both_parts() {
        let mut query = PageQuery {
            filter_column: Some("status".to_string()),
            ..PageQuery::default()
        };
        assert!(query.filter().is_none());

        query.filter_value = Some("active".to_string());
        assert_eq!(query.filter(), Some(("status", "active")));

        query.page = 3;
        query.page_size = 20;
        assert_eq!(query.offset(), 40);
    }

    #[test]
    fn test_key_matches_by_text() {
        assert!(key_matches(&json!(57), &json!("57")));
        assert!(!key_matches(&json!(57), &json!(58)));
        assert!(!key_matches(&Value::Null, &Value::Null));
    }

    #[test]
    fn test_page_response_uses_camel_case() {
        let page = PageResponse {
            data: vec![],
            page: 1,
            page_size: 20,
            total_pages: 0,
            total: 0,
        };
        let encoded = serde_json::to_value(&page).unwrap();
        assert!(encoded.get("pageSize").is_some());
        assert!(encoded.get("totalPages").is_some());
    }
}
