//! HTTP client for the console backend
//!
//! Every table operation has a debug mirror. With `debug_fallback` enabled
//! the client first calls the unauthenticated mirror and, only if that
//! fails (non-2xx or transport error), acquires a bearer token and calls the
//! authenticated route. With the flag off only the authenticated route is
//! used. Settings calls have no mirror.

use super::config::ClientConfig;
use super::token::{TokenError, TokenProvider};
use crate::schema::{
    value_text, ConnectionSettings, PageQuery, PageResponse, RowValues, SettingsResponse,
    TableInfo, TableMetadata,
};
use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("You don't have access to the table '{0}'")]
    AccessDenied(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        ClientError::Network(error.to_string())
    }
}

/// Table operations the editor and catalog depend on
#[async_trait]
pub trait TableBackend: Send + Sync + 'static {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, ClientError>;

    async fn table_metadata(&self, table: &str) -> Result<TableMetadata, ClientError>;

    async fn fetch_page(&self, table: &str, query: &PageQuery) -> Result<PageResponse, ClientError>;

    /// Insert a row; the response is the stored row or a bare acknowledgement
    async fn insert_row(
        &self,
        table: &str,
        key: &str,
        values: &RowValues,
    ) -> Result<RowValues, ClientError>;

    /// Update the row whose `key` column equals `id`
    async fn update_row(
        &self,
        table: &str,
        key: &str,
        id: &Value,
        values: &RowValues,
    ) -> Result<RowValues, ClientError>;

    async fn delete_row(&self, table: &str, key: &str, id: &Value) -> Result<(), ClientError>;
}

/// Connection settings operations used by the settings form
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    async fn get_settings(&self) -> Result<SettingsResponse, ClientError>;

    async fn save_settings(&self, settings: &ConnectionSettings) -> Result<(), ClientError>;
}

/// A route given as path segments below the base URL
type Segments<'a> = &'a [&'a str];

/// reqwest-backed client for the backend REST surface
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    debug_fallback: bool,
    tokens: Arc<dyn TokenProvider>,
    account: Option<String>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        account: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            debug_fallback: false,
            tokens,
            account,
        }
    }

    pub fn from_config(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self::new(config.base_url.clone(), tokens, config.account.clone())
            .with_debug_fallback(config.debug_fallback)
    }

    /// Try the unauthenticated debug mirrors first
    pub fn with_debug_fallback(mut self, enabled: bool) -> Self {
        self.debug_fallback = enabled;
        self
    }

    fn url(&self, segments: Segments<'_>) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|error| ClientError::Network(format!("invalid base URL: {}", error)))?;

        url.path_segments_mut()
            .map_err(|_| ClientError::Network("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    fn request(
        &self,
        method: &Method,
        segments: Segments<'_>,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::RequestBuilder, ClientError> {
        let mut request = self.http.request(method.clone(), self.url(segments)?);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request)
    }

    /// Run the debug-then-authenticated sequence and return a 2xx response
    async fn send(
        &self,
        method: Method,
        debug: Option<Segments<'_>>,
        authenticated: Segments<'_>,
        query: &[(&str, String)],
        body: Option<&Value>,
        table: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        if let (true, Some(debug_path)) = (self.debug_fallback, debug) {
            match self.request(&method, debug_path, query, body)?.send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(%method, path = %debug_path.join("/"), "Debug endpoint succeeded");
                    return Ok(response);
                }
                Ok(response) => tracing::debug!(
                    %method,
                    status = %response.status(),
                    "Debug endpoint failed, trying authenticated endpoint"
                ),
                Err(error) => tracing::debug!(
                    %method,
                    %error,
                    "Debug endpoint unreachable, trying authenticated endpoint"
                ),
            }
        }

        let token = self.tokens.access_token(self.account.as_deref()).await?;
        let response = self
            .request(&method, authenticated, query, body)?
            .bearer_auth(token)
            .send()
            .await?;

        Self::check_status(response, table).await
    }

    async fn check_status(
        response: reqwest::Response,
        table: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| {
                value
                    .get("error")
                    .or_else(|| value.get("detail"))
                    .map(value_text)
            })
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            });

        tracing::warn!(%status, %message, "Request failed");

        Err(match status {
            StatusCode::FORBIDDEN => ClientError::AccessDenied(table.unwrap_or_default().to_string()),
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized(message),
            _ => ClientError::Http {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        response
            .json::<T>()
            .await
            .map_err(|error| ClientError::Decode(error.to_string()))
    }

    fn page_query(query: &PageQuery) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", query.page.to_string()),
            ("page_size", query.page_size.to_string()),
        ];
        if let Some((column, value)) = query.filter() {
            pairs.push(("filter_column", column.to_string()));
            pairs.push(("filter_value", value.to_string()));
        }
        pairs
    }
}

#[async_trait]
impl TableBackend for ApiClient {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, ClientError> {
        let response = self
            .send(
                Method::GET,
                Some(&["debug", "test-tables"][..]),
                &["tables", ""],
                &[],
                None,
                None,
            )
            .await?;
        Self::decode(response).await
    }

    async fn table_metadata(&self, table: &str) -> Result<TableMetadata, ClientError> {
        let response = self
            .send(
                Method::GET,
                Some(&["debug", "test-table-metadata", table][..]),
                &["tables", "metadata", table],
                &[],
                None,
                Some(table),
            )
            .await?;
        Self::decode(response).await
    }

    async fn fetch_page(&self, table: &str, query: &PageQuery) -> Result<PageResponse, ClientError> {
        let response = self
            .send(
                Method::GET,
                Some(&["debug", "test-table-data", table][..]),
                &["data", table],
                &Self::page_query(query),
                None,
                Some(table),
            )
            .await?;
        Self::decode(response).await
    }

    async fn insert_row(
        &self,
        table: &str,
        key: &str,
        values: &RowValues,
    ) -> Result<RowValues, ClientError> {
        let body = Value::Object(values.clone());
        let response = self
            .send(
                Method::POST,
                Some(&["debug", "test-table-data", table][..]),
                &["data", table],
                &[("pk", key.to_string())],
                Some(&body),
                Some(table),
            )
            .await?;
        Self::decode(response).await
    }

    async fn update_row(
        &self,
        table: &str,
        key: &str,
        id: &Value,
        values: &RowValues,
    ) -> Result<RowValues, ClientError> {
        let id = value_text(id);
        let body = Value::Object(values.clone());
        let response = self
            .send(
                Method::PATCH,
                Some(&["debug", "test-table-data", table, id.as_str()][..]),
                &["data", table, id.as_str()],
                &[("pk", key.to_string())],
                Some(&body),
                Some(table),
            )
            .await?;
        Self::decode(response).await
    }

    async fn delete_row(&self, table: &str, key: &str, id: &Value) -> Result<(), ClientError> {
        let id = value_text(id);
        self.send(
            Method::DELETE,
            Some(&["debug", "test-table-data", table, id.as_str()][..]),
            &["data", table, id.as_str()],
            &[("pk", key.to_string())],
            None,
            Some(table),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsBackend for ApiClient {
    async fn get_settings(&self) -> Result<SettingsResponse, ClientError> {
        let response = self
            .send(
                Method::GET,
                None,
                &["settings", "db-credentials"],
                &[],
                None,
                None,
            )
            .await?;
        Self::decode(response).await
    }

    async fn save_settings(&self, settings: &ConnectionSettings) -> Result<(), ClientError> {
        let body =
            serde_json::to_value(settings).map_err(|error| ClientError::Decode(error.to_string()))?;
        self.send(
            Method::POST,
            None,
            &["settings", "db-credentials"],
            &[],
            Some(&body),
            None,
        )
        .await?;
        Ok(())
    }
}
