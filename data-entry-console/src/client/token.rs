//! Bearer token acquisition
//!
//! A [`TokenProvider`] returns an access token for the signed-in account.
//! Callers go through [`TokenProvider::access_token`], which tries the
//! silent path and only falls back to the interactive path when the silent
//! attempt reports that user interaction is required.

use super::config::OAuthConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Tokens closer than this to expiry are refreshed
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("No active account! Verify a user has been signed in.")]
    NoAccount,

    #[error("Interaction required: {0}")]
    InteractionRequired(String),

    #[error("Token request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse token response: {0}")]
    ParseFailed(String),
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a token without user interaction
    async fn acquire_silent(&self, account: &str) -> Result<String, TokenError>;

    /// Return a token, involving the user if needed
    async fn acquire_interactive(&self, account: &str) -> Result<String, TokenError>;

    /// Silent acquisition with an interactive fallback on
    /// [`TokenError::InteractionRequired`]
    async fn access_token(&self, account: Option<&str>) -> Result<String, TokenError> {
        let account = account.ok_or(TokenError::NoAccount)?;

        match self.acquire_silent(account).await {
            Err(TokenError::InteractionRequired(reason)) => {
                tracing::debug!(%reason, "Silent token acquisition needs interaction");
                self.acquire_interactive(account).await
            }
            other => other,
        }
    }
}

/// A fixed token taken from configuration
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn acquire_silent(&self, _account: &str) -> Result<String, TokenError> {
        Ok(self.token.clone())
    }

    async fn acquire_interactive(&self, _account: &str) -> Result<String, TokenError> {
        Ok(self.token.clone())
    }
}

/// Obtains an authorization code from the user
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    /// Send the user to `authorize_url` and return the code they come back with
    async fn authorization_code(&self, authorize_url: &str) -> Result<String, TokenError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug)]
struct CachedToken {
    account: String,
    access_token: String,
    expires_at: Option<Instant>,
    refresh_token: Option<String>,
}

impl CachedToken {
    fn is_fresh(&self, account: &str) -> bool {
        self.account == account
            && self
                .expires_at
                .map_or(true, |expires_at| Instant::now() + EXPIRY_MARGIN < expires_at)
    }
}

/// OAuth 2.0 token provider with a refresh-token silent path and an
/// authorization-code interactive path
pub struct OAuthTokenProvider {
    client: reqwest::Client,
    config: OAuthConfig,
    prompt: Arc<dyn AuthorizationPrompt>,
    cache: Mutex<Option<CachedToken>>,
}

impl OAuthTokenProvider {
    pub fn new(config: OAuthConfig, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            prompt,
            cache: Mutex::new(None),
        }
    }

    /// Authorization endpoint URL for an interactive sign-in
    pub fn authorize_url(&self, account: &str, state: &str) -> Result<String, TokenError> {
        let scopes = self.config.scopes.join(" ");
        let url = reqwest::Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", scopes.as_str()),
                ("login_hint", account),
                ("state", state),
            ],
        )
        .map_err(|error| TokenError::RequestFailed(error.to_string()))?;

        Ok(url.to_string())
    }

    /// Post a grant to the token endpoint and cache the result
    async fn request_token(
        &self,
        account: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<String, TokenError> {
        params.push(("client_id", self.config.client_id.clone()));
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.clone()));
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|error| TokenError::RequestFailed(error.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::InteractionRequired(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }
        if !status.is_success() {
            return Err(TokenError::RequestFailed(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|error| TokenError::ParseFailed(error.to_string()))?;

        let mut cache = self.cache.lock().await;
        let previous_refresh = cache
            .as_ref()
            .filter(|cached| cached.account == account)
            .and_then(|cached| cached.refresh_token.clone());

        *cache = Some(CachedToken {
            account: account.to_string(),
            access_token: token.access_token.clone(),
            expires_at: token
                .expires_in
                .map(|seconds| Instant::now() + Duration::from_secs(seconds)),
            refresh_token: token.refresh_token.or(previous_refresh),
        });

        Ok(token.access_token)
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn acquire_silent(&self, account: &str) -> Result<String, TokenError> {
        let refresh_token = {
            let cache = self.cache.lock().await;
            match cache.as_ref() {
                Some(cached) if cached.is_fresh(account) => {
                    return Ok(cached.access_token.clone());
                }
                Some(cached) if cached.account == account => cached.refresh_token.clone(),
                _ => None,
            }
        };

        let refresh_token = refresh_token
            .or_else(|| self.config.refresh_token.clone())
            .ok_or_else(|| TokenError::InteractionRequired("no refresh token".to_string()))?;

        tracing::debug!(account, "Refreshing access token");
        self.request_token(
            account,
            vec![
                ("grant_type", "refresh_token".to_string()),
                ("refresh_token", refresh_token),
                ("scope", self.config.scopes.join(" ")),
            ],
        )
        .await
    }

    async fn acquire_interactive(&self, account: &str) -> Result<String, TokenError> {
        let state = uuid::Uuid::new_v4().to_string();
        let authorize_url = self.authorize_url(account, &state)?;
        let code = self.prompt.authorization_code(&authorize_url).await?;

        tracing::debug!(account, "Exchanging authorization code");
        let token = self
            .request_token(
                account,
                vec![
                    ("grant_type", "authorization_code".to_string()),
                    ("code", code.trim().to_string()),
                    ("redirect_uri", self.config.redirect_uri.clone()),
                ],
            )
            .await;

        match token {
            // A rejected code is final; asking again would loop
            Err(TokenError::InteractionRequired(reason)) => Err(TokenError::RequestFailed(reason)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse, routing::post, Form, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCode {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AuthorizationPrompt for FixedCode {
        async fn authorization_code(&self, authorize_url: &str) -> Result<String, TokenError> {
            assert!(authorize_url.contains("response_type=code"));
            assert!(authorize_url.contains("login_hint=ada%40example.com"));
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("good-code".to_string())
        }
    }

    async fn token_endpoint(Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
        match (
            form.get("grant_type").map(String::as_str),
            form.get("refresh_token").map(String::as_str),
            form.get("code").map(String::as_str),
        ) {
            (Some("refresh_token"), Some("valid-refresh"), _) => (
                StatusCode::OK,
                Json(json!({"access_token": "refreshed", "expires_in": 3600})),
            ),
            (Some("authorization_code"), _, Some("good-code")) => (
                StatusCode::OK,
                Json(json!({
                    "access_token": "interactive",
                    "expires_in": 3600,
                    "refresh_token": "valid-refresh"
                })),
            ),
            _ => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid_grant"})),
            ),
        }
    }

    async fn serve_token_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let app = Router::new().route("/token", post(token_endpoint));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/token", address)
    }

    fn oauth_config(token_url: String, refresh_token: Option<&str>) -> OAuthConfig {
        OAuthConfig {
            client_id: "console".to_string(),
            client_secret: None,
            authorize_url: "http://idp.local/authorize".to_string(),
            token_url,
            redirect_uri: "http://localhost:3000".to_string(),
            scopes: vec!["openid".to_string()],
            refresh_token: refresh_token.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_no_account_is_rejected() {
        let provider = StaticTokenProvider::new("fixed");
        assert!(matches!(
            provider.access_token(None).await,
            Err(TokenError::NoAccount)
        ));
        assert_eq!(provider.access_token(Some("ada")).await.unwrap(), "fixed");
    }

    #[tokio::test]
    async fn test_silent_refresh_is_cached() {
        let token_url = serve_token_endpoint().await;
        let prompt = Arc::new(FixedCode {
            calls: AtomicUsize::new(0),
        });
        let provider =
            OAuthTokenProvider::new(oauth_config(token_url, Some("valid-refresh")), prompt.clone());

        let token = provider.access_token(Some("ada@example.com")).await.unwrap();
        assert_eq!(token, "refreshed");
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 0);

        // Served from the cache
        let token = provider.acquire_silent("ada@example.com").await.unwrap();
        assert_eq!(token, "refreshed");
    }

    #[tokio::test]
    async fn test_interactive_fallback_on_rejected_refresh() {
        let token_url = serve_token_endpoint().await;
        let prompt = Arc::new(FixedCode {
            calls: AtomicUsize::new(0),
        });
        let provider =
            OAuthTokenProvider::new(oauth_config(token_url, Some("stale-refresh")), prompt.clone());

        let token = provider.access_token(Some("ada@example.com")).await.unwrap();
        assert_eq!(token, "interactive");
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
    }
}
