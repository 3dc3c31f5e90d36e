use std::time::Duration;

use serde::Deserialize;

use crate::google::oauth::OAuthCredentials;
use crate::google::retry::{RetryPolicy, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Shared secret: compared against raw API keys and used to sign tokens.
    pub shared_secret: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_redirect_uri: String,
    /// Set via CONNECTOR_RETRY_ATTEMPTS. Default: 3.
    pub retry_attempts: u32,
    /// Set via CONNECTOR_RETRY_INITIAL_DELAY_MS. Default: 1000.
    pub retry_initial_delay_ms: u64,
}

impl Config {
    /// `None` until all three Google OAuth settings are present.
    pub fn oauth_credentials(&self) -> Option<OAuthCredentials> {
        OAuthCredentials::from_parts(
            &self.google_client_id,
            &self.google_client_secret,
            &self.google_redirect_uri,
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_initial_delay_ms),
        )
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a config from any key lookup. `load` passes the process environment.
pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    // Support both naming conventions for the shared secret
    let shared_secret = lookup("TRAFFIC_DOCTOR_API_KEY")
        .filter(|v| !v.is_empty())
        .or_else(|| lookup("JWT_SHARED_SECRET"))
        .unwrap_or_default();

    if shared_secret.trim().is_empty() {
        anyhow::bail!(
            "no shared secret configured. \
             Set TRAFFIC_DOCTOR_API_KEY (or JWT_SHARED_SECRET) before starting the connector."
        );
    }

    Ok(Config {
        port: lookup("CONNECTOR_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000),
        database_url: lookup("DATABASE_URL")
            .unwrap_or_else(|| "postgres://localhost/connector".into()),
        shared_secret,
        google_client_id: lookup("GOOGLE_CLIENT_ID").unwrap_or_default(),
        google_client_secret: lookup("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
        google_redirect_uri: lookup("GOOGLE_REDIRECT_URI").unwrap_or_default(),
        retry_attempts: lookup("CONNECTOR_RETRY_ATTEMPTS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS),
        retry_initial_delay_ms: lookup("CONNECTOR_RETRY_INITIAL_DELAY_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_INITIAL_DELAY_MS),
    })
}
