//! Console client
//!
//! The client side of the console: an HTTP client for the backend REST
//! surface, bearer token acquisition, and the table list, table editor and
//! settings form state that a presentation layer drives.

pub mod api;
pub mod catalog;
pub mod config;
pub mod editor;
pub mod preferences;
pub mod row;
pub mod settings;
pub mod token;

pub use api::{ApiClient, ClientError, SettingsBackend, TableBackend};
pub use catalog::TableCatalog;
pub use config::{ClientConfig, OAuthConfig};
pub use editor::{EditorError, Filter, Notice, NoticeLevel, Pagination, TableEditor, ViewStatus};
pub use preferences::{PreferencesError, ViewMode, ViewPreferences};
pub use row::RowEntry;
pub use settings::{SettingsError, SettingsForm};
pub use token::{
    AuthorizationPrompt, OAuthTokenProvider, StaticTokenProvider, TokenError, TokenProvider,
};
