//! Access Gate: authenticates the calling system, not the Google account.
//!
//! Accepted credentials, checked in order:
//! 1. `X-Api-Key: <shared secret>`
//! 2. `Authorization: Bearer <shared secret>`
//! 3. `Authorization: Bearer <jwt>`, HS256, signed with the shared secret, unexpired
//!
//! A present but wrong `X-Api-Key` is rejected outright; it does not fall back
//! to the bearer header.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::errors::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Lifetime of tokens minted by [`AccessGate::issue_token`].
pub const TOKEN_LIFETIME_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    ApiKey,
    BearerKey,
}

/// Who is calling. Inserted into request extensions by [`require_auth`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CallerIdentity {
    SharedKey {
        authenticated: bool,
        method: AuthMethod,
    },
    /// Claims of a verified signed token.
    Token(Map<String, Value>),
}

impl CallerIdentity {
    fn shared_key(method: AuthMethod) -> Self {
        CallerIdentity::SharedKey {
            authenticated: true,
            method,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("shared secret not configured")]
    NotConfigured,
}

#[derive(Clone)]
pub struct AccessGate {
    inner: Arc<GateKeys>,
}

struct GateKeys {
    secret: Vec<u8>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl AccessGate {
    pub fn new(shared_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.validate_aud = false;

        Self {
            inner: Arc::new(GateKeys {
                secret: shared_secret.as_bytes().to_vec(),
                encoding: EncodingKey::from_secret(shared_secret.as_bytes()),
                decoding: DecodingKey::from_secret(shared_secret.as_bytes()),
                validation,
            }),
        }
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<CallerIdentity, AuthError> {
        if let Some(key) = header_value(headers, API_KEY_HEADER) {
            if self.matches_secret(key) {
                return Ok(CallerIdentity::shared_key(AuthMethod::ApiKey));
            }
            tracing::warn!("access gate: invalid x-api-key (provided: '{}')", mask(key));
            return Err(AuthError::InvalidApiKey);
        }

        let bearer = header_value(headers, "authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::Missing)?;

        if self.matches_secret(bearer) {
            return Ok(CallerIdentity::shared_key(AuthMethod::BearerKey));
        }

        let claims = self.verify_token(bearer).map_err(|e| {
            tracing::warn!("access gate: bearer token rejected: {}", e);
            e
        })?;
        Ok(CallerIdentity::Token(claims))
    }

    /// Sign `claims` as an HS256 token valid for [`TOKEN_LIFETIME_SECS`].
    pub fn issue_token(&self, mut claims: Map<String, Value>) -> Result<String, AuthError> {
        self.require_secret()?;
        let now = Utc::now().timestamp();
        claims.insert("iat".into(), Value::from(now));
        claims.insert("exp".into(), Value::from(now + TOKEN_LIFETIME_SECS));

        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.inner.encoding,
        )?;
        Ok(token)
    }

    /// Verify an HS256 token: signature, `exp` and `nbf` with no leeway.
    pub fn verify_token(&self, token: &str) -> Result<Map<String, Value>, AuthError> {
        self.require_secret()?;
        let data = jsonwebtoken::decode::<Map<String, Value>>(
            token,
            &self.inner.decoding,
            &self.inner.validation,
        )?;
        Ok(data.claims)
    }

    // An empty HMAC key would let anyone mint tokens
    fn require_secret(&self) -> Result<(), AuthError> {
        if self.inner.secret.is_empty() {
            return Err(AuthError::NotConfigured);
        }
        Ok(())
    }

    fn matches_secret(&self, provided: &str) -> bool {
        !self.inner.secret.is_empty() && bool::from(provided.as_bytes().ct_eq(&self.inner.secret))
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

// SECURITY: never log the full provided key
fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}…{}", head, tail)
    } else {
        "****".to_string()
    }
}

/// Middleware: rejects the request with 401 unless the [`AccessGate`] accepts it.
pub async fn require_auth(
    State(gate): State<AccessGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = gate
        .authenticate(req.headers())
        .map_err(|_| ApiError::Unauthorized)?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
