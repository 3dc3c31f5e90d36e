use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::RefreshError;
use crate::models::TokenSet;

/// Google's OAuth 2.0 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// OAuth client registration used for refresh grants.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl OAuthCredentials {
    /// Returns `None` unless all three values are present.
    pub fn from_parts(client_id: &str, client_secret: &str, redirect_uri: &str) -> Option<Self> {
        if client_id.is_empty() || client_secret.is_empty() || redirect_uri.is_empty() {
            return None;
        }
        Some(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
        })
    }
}

/// Result of a refresh grant. Any field may be missing from an upstream answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Absolute expiry, epoch milliseconds.
    pub expiry_date: Option<i64>,
}

impl RefreshedTokens {
    /// Accept only a complete triple. A partial answer is a failed refresh.
    pub fn into_token_set(self) -> Result<TokenSet, RefreshError> {
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(RefreshError::Incomplete("access token"))?;
        let refresh_token = self
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(RefreshError::Incomplete("refresh token"))?;
        let expiry_date = self.expiry_date.ok_or(RefreshError::Incomplete("expiry"))?;

        Ok(TokenSet {
            access_token,
            refresh_token,
            expiry_date,
        })
    }
}

/// Mints new access tokens from a refresh token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError>;
}

/// Refresh grants against Google's token endpoint.
pub struct GoogleTokenRefresher {
    credentials: Option<OAuthCredentials>,
    token_url: String,
    http: reqwest::Client,
}

impl GoogleTokenRefresher {
    pub fn new(credentials: Option<OAuthCredentials>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            credentials,
            token_url: GOOGLE_TOKEN_URL.to_string(),
            http,
        })
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }
}

#[async_trait]
impl TokenRefresher for GoogleTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError> {
        let credentials = self.credentials.as_ref().ok_or(RefreshError::NotConfigured)?;

        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        debug!(token_url = %self.token_url, "requesting refresh grant");
        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RefreshError::Transport(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| RefreshError::Transport(format!("invalid token response: {}", e)))?;

        info!("refreshed Google access token");
        Ok(token_response.into_refreshed(refresh_token, Utc::now().timestamp_millis()))
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    /// Google only returns a refresh token when it rotates it; otherwise the one
    /// we presented stays valid and is carried forward.
    fn into_refreshed(self, presented_refresh_token: &str, now_ms: i64) -> RefreshedTokens {
        RefreshedTokens {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| Some(presented_refresh_token.to_string())),
            expiry_date: self.expires_in.map(|secs| now_ms + secs * 1000),
        }
    }
}
