//! DataEntryLayer - Axum integration layer for the console backend
//!
//! Builds the router serving the table CRUD surface: authenticated routes
//! behind bearer verification, optional unauthenticated debug mirrors and a
//! health probe.

use crate::api::{
    db_info_handler, delete_row_handler, get_page_handler, get_settings_handler, health_handler,
    insert_row_handler, list_tables_handler, save_settings_handler, table_metadata_handler,
    update_row_handler, AppState, SettingsStore,
};
use crate::auth::{require_bearer, AccessPolicy, AuthConfig, JwtVerifier};
use crate::database::traits::DatabaseProvider;
use crate::schema::ConnectionSettings;
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[cfg(feature = "sqlite")]
use crate::database::sqlite::SqliteProvider;

#[cfg(feature = "postgres")]
use crate::database::postgres::PostgresProvider;

/// Router layer for the data-entry backend
///
/// # Example
///
/// ```rust,no_run
/// use axum::Router;
/// use data_entry_console::DataEntryLayer;
/// use sqlx::SqlitePool;
///
/// # async fn example() {
/// let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
/// let console = DataEntryLayer::sqlite("/api", pool).with_debug_endpoints(true);
/// let app = Router::new().merge(console.into_router());
/// # }
/// ```
pub struct DataEntryLayer<DB: DatabaseProvider> {
    base_path: String,
    database: Arc<DB>,
    auth: AuthConfig,
    policy: AccessPolicy,
    settings: SettingsStore,
    debug_endpoints: bool,
}

impl<DB: DatabaseProvider> DataEntryLayer<DB> {
    /// Create a new layer at the given base path
    ///
    /// # Arguments
    ///
    /// * `base_path` - The URL path the routes are mounted under ("" or "/" for the root)
    /// * `database` - The database provider implementation
    pub fn new(base_path: impl Into<String>, database: DB) -> Self {
        Self {
            base_path: base_path.into(),
            database: Arc::new(database),
            auth: AuthConfig::default(),
            policy: AccessPolicy::default(),
            settings: SettingsStore::from_env(ConnectionSettings::default()),
            debug_endpoints: false,
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_access_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: SettingsStore) -> Self {
        self.settings = settings;
        self
    }

    /// Mount the unauthenticated `/debug/*` mirrors
    pub fn with_debug_endpoints(mut self, enabled: bool) -> Self {
        self.debug_endpoints = enabled;
        self
    }

    /// Convert into an Axum Router that can be merged
    ///
    /// The returned router includes:
    /// - Bearer-protected table, data and settings routes
    /// - Debug mirrors under `/debug` when enabled
    /// - A `/health` probe
    /// - Permissive CORS middleware
    pub fn into_router(self) -> Router {
        let state = AppState {
            database: self.database,
            policy: Arc::new(self.policy),
            settings: Arc::new(self.settings),
        };
        let verifier = Arc::new(JwtVerifier::new(&self.auth));

        let protected = Router::new()
            .route("/tables", get(list_tables_handler::<DB>))
            .route("/tables/", get(list_tables_handler::<DB>))
            .route("/tables/metadata/{table}", get(table_metadata_handler::<DB>))
            .route(
                "/data/{table}",
                get(get_page_handler::<DB>).post(insert_row_handler::<DB>),
            )
            .route(
                "/data/{table}/{row_id}",
                axum::routing::patch(update_row_handler::<DB>).delete(delete_row_handler::<DB>),
            )
            .route(
                "/settings/db-credentials",
                get(get_settings_handler::<DB>).post(save_settings_handler::<DB>),
            )
            .route_layer(middleware::from_fn_with_state(verifier, require_bearer))
            .with_state(state.clone());

        let mut router = Router::new()
            .route("/health", get(health_handler::<DB>))
            .with_state(state.clone())
            .merge(protected);

        if self.debug_endpoints {
            tracing::warn!("Debug endpoints enabled, table data is reachable without a token");

            let debug = Router::new()
                .route("/db-info", get(db_info_handler::<DB>))
                .route("/test-tables", get(list_tables_handler::<DB>))
                .route("/test-table-metadata/{table}", get(table_metadata_handler::<DB>))
                .route(
                    "/test-table-data/{table}",
                    get(get_page_handler::<DB>).post(insert_row_handler::<DB>),
                )
                .route(
                    "/test-table-data/{table}/{row_id}",
                    axum::routing::patch(update_row_handler::<DB>)
                        .delete(delete_row_handler::<DB>),
                )
                .with_state(state);

            router = router.nest("/debug", debug);
        }

        let base_path = self.base_path.trim_end_matches('/');
        let router = if base_path.is_empty() {
            router
        } else {
            Router::new().nest(base_path, router)
        };

        router.layer(CorsLayer::permissive())
    }
}

#[cfg(feature = "sqlite")]
impl DataEntryLayer<SqliteProvider> {
    /// Create a new layer for SQLite
    ///
    /// # Arguments
    ///
    /// * `base_path` - The URL path where the routes will be mounted
    /// * `pool` - The SQLite connection pool
    pub fn sqlite(base_path: impl Into<String>, pool: sqlx::SqlitePool) -> Self {
        Self::new(base_path, SqliteProvider::new(pool))
    }
}

#[cfg(feature = "postgres")]
impl DataEntryLayer<PostgresProvider> {
    /// Create a new layer for PostgreSQL
    ///
    /// # Arguments
    ///
    /// * `base_path` - The URL path where the routes will be mounted
    /// * `pool` - The PostgreSQL connection pool
    pub fn postgres(base_path: impl Into<String>, pool: sqlx::PgPool) -> Self {
        Self::new(base_path, PostgresProvider::new(pool))
    }
}
