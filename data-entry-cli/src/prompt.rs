//! Terminal interaction

use async_trait::async_trait;
use data_entry_console::client::{AuthorizationPrompt, TokenError, TokenProvider};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Read one trimmed line from stdin after printing `question` to stderr
pub async fn ask(question: &str) -> std::io::Result<String> {
    eprint!("{}", question);
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim().to_string())
}

pub async fn confirm(question: &str) -> std::io::Result<bool> {
    let answer = ask(&format!("{} [y/N] ", question)).await?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Sends the user to the identity provider and reads back the code
pub struct TerminalPrompt;

#[async_trait]
impl AuthorizationPrompt for TerminalPrompt {
    async fn authorization_code(&self, authorize_url: &str) -> Result<String, TokenError> {
        eprintln!("Sign in by opening this URL in a browser:\n\n  {}\n", authorize_url);
        let code = ask("Paste the authorization code: ")
            .await
            .map_err(|error| TokenError::RequestFailed(error.to_string()))?;

        if code.is_empty() {
            return Err(TokenError::RequestFailed("no authorization code entered".to_string()));
        }
        Ok(code)
    }
}

/// Used when neither a token nor an identity provider is configured
pub struct SignedOut;

#[async_trait]
impl TokenProvider for SignedOut {
    async fn acquire_silent(&self, _account: &str) -> Result<String, TokenError> {
        Err(TokenError::InteractionRequired(
            "no token or OAuth settings configured".to_string(),
        ))
    }

    async fn acquire_interactive(&self, _account: &str) -> Result<String, TokenError> {
        Err(TokenError::RequestFailed(
            "configure `token` or `[oauth]` to sign in".to_string(),
        ))
    }
}
