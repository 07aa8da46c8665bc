//! Bearer-token verification and table access policy
//!
//! Authenticated routes sit behind [`require_bearer`], which verifies the
//! `Authorization: Bearer <jwt>` header and stores the resulting
//! [`Principal`] in the request extensions. Handlers consult the
//! [`AccessPolicy`] with that principal before touching a table.

use crate::api::ApiError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

/// An authenticated caller, identified by the user name claim of its token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
}

/// Token verification settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Expected `aud` claim; audience is not checked when unset
    #[serde(default)]
    pub audience: Option<String>,

    /// HS256 shared secret; signatures are not checked when unset
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    preferred_username: Option<String>,

    #[serde(default)]
    email: Option<String>,
}

/// Verifies JWT bearer tokens
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);

        let key = match &config.secret {
            Some(secret) => DecodingKey::from_secret(secret.as_bytes()),
            None => {
                tracing::warn!("No token secret configured, bearer signatures are not verified");
                validation.insecure_disable_signature_validation();
                DecodingKey::from_secret(&[])
            }
        };

        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self { key, validation }
    }

    /// Decode a token and extract the caller's identity
    pub fn verify(&self, token: &str) -> Result<Principal, ApiError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|error| {
            tracing::debug!(%error, "Rejected bearer token");
            ApiError::Unauthorized("Could not validate credentials".to_string())
        })?;

        data.claims
            .preferred_username
            .or(data.claims.email)
            .map(|username| Principal { username })
            .ok_or_else(|| ApiError::Unauthorized("Token carries no user name claim".to_string()))
    }
}

/// Which tables each principal may read and edit
#[derive(Debug, Clone, Deserialize)]
pub struct AccessPolicy {
    /// Grant every table to principals without an explicit grant list
    #[serde(default = "default_unrestricted")]
    pub unrestricted: bool,

    /// User name to accessible table names
    #[serde(default)]
    pub grants: HashMap<String, Vec<String>>,
}

fn default_unrestricted() -> bool {
    true
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            unrestricted: default_unrestricted(),
            grants: HashMap::new(),
        }
    }
}

impl AccessPolicy {
    /// Whether `principal` may access `table`
    pub fn allows(&self, principal: &Principal, table: &str) -> bool {
        let grants = self
            .grants
            .iter()
            .find(|(username, _)| username.eq_ignore_ascii_case(&principal.username));

        match grants {
            Some((_, tables)) => tables.iter().any(|granted| granted == table),
            None => self.unrestricted,
        }
    }
}

/// Middleware that rejects requests without a valid bearer token
pub async fn require_bearer(
    State(verifier): State<Arc<JwtVerifier>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let principal = verifier.verify(token.trim())?;
    tracing::debug!(username = %principal.username, "Authenticated request");

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// The caller of a request, absent on unauthenticated debug routes
#[derive(Debug, Clone)]
pub struct Caller(pub Option<Principal>);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller(parts.extensions.get::<Principal>().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub(crate) fn token(secret: &str, claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn expiry() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() + 3600
    }

    #[test]
    fn test_verify_with_secret_and_audience() {
        let verifier = JwtVerifier::new(&AuthConfig {
            audience: Some("console".to_string()),
            secret: Some("secret".to_string()),
        });

        let valid = token(
            "secret",
            json!({"preferred_username": "ada@example.com", "aud": "console", "exp": expiry()}),
        );
        assert_eq!(verifier.verify(&valid).unwrap().username, "ada@example.com");

        let wrong_secret = token(
            "other",
            json!({"preferred_username": "ada@example.com", "aud": "console", "exp": expiry()}),
        );
        assert!(matches!(verifier.verify(&wrong_secret), Err(ApiError::Unauthorized(_))));

        let wrong_audience = token(
            "secret",
            json!({"preferred_username": "ada@example.com", "aud": "other", "exp": expiry()}),
        );
        assert!(verifier.verify(&wrong_audience).is_err());
    }

    #[test]
    fn test_unverified_mode_falls_back_to_email_claim() {
        let verifier = JwtVerifier::new(&AuthConfig::default());
        let unsigned = token("anything", json!({"email": "bob@example.com", "exp": expiry()}));
        assert_eq!(verifier.verify(&unsigned).unwrap().username, "bob@example.com");

        let anonymous = token("anything", json!({"exp": expiry()}));
        assert!(verifier.verify(&anonymous).is_err());
    }

    #[test]
    fn test_access_policy() {
        let mut grants = HashMap::new();
        grants.insert("ada@example.com".to_string(), vec!["orders".to_string()]);
        let policy = AccessPolicy {
            unrestricted: false,
            grants,
        };

        let ada = Principal {
            username: "Ada@Example.com".to_string(),
        };
        let bob = Principal {
            username: "bob@example.com".to_string(),
        };

        assert!(policy.allows(&ada, "orders"));
        assert!(!policy.allows(&ada, "customers"));
        assert!(!policy.allows(&bob, "orders"));

        let open = AccessPolicy::default();
        assert!(open.allows(&bob, "orders"));
    }
}
