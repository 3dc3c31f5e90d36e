use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::google::normalize::normalize;

/// A failed call against a Google API, in the shapes the upstream produces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamFailure {
    /// The API answered with a non-success HTTP status.
    /// `detail` is the `error.message` field of Google's error body, when present.
    #[error("Google API responded with HTTP {status}")]
    Http { status: u16, detail: Option<String> },

    /// Client-side failure identified by a code rather than a response status.
    #[error("Google API client error ({code}): {message}")]
    SdkCode { code: String, message: String },

    #[error("{raw}")]
    Unknown { raw: String },
}

impl UpstreamFailure {
    pub fn http(status: u16) -> Self {
        Self::Http {
            status,
            detail: None,
        }
    }

    /// HTTP status of the failed response, if the upstream answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Rate limiting (429) and server-side errors (5xx) are worth another attempt.
    /// Numeric client codes count as statuses here.
    pub fn is_transient(&self) -> bool {
        let status = match self {
            Self::Http { status, .. } => Some(*status),
            Self::SdkCode { code, .. } => code.parse::<u16>().ok(),
            Self::Unknown { .. } => None,
        };
        matches!(status, Some(429) | Some(500..=599))
    }

    /// Richest message available: Google's own error text, else our description.
    pub fn message(&self) -> String {
        match self {
            Self::Http {
                detail: Some(detail),
                ..
            } => detail.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for UpstreamFailure {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            Self::http(status.as_u16())
        } else if e.is_timeout() {
            Self::SdkCode {
                code: "timeout".into(),
                message: e.to_string(),
            }
        } else if e.is_connect() {
            Self::SdkCode {
                code: "connect".into(),
                message: e.to_string(),
            }
        } else {
            Self::Unknown { raw: e.to_string() }
        }
    }
}

/// Why a token refresh did not produce a usable credential.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Google OAuth credentials not configured")]
    NotConfigured,

    #[error("token endpoint rejected the refresh grant ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("token refresh request failed: {0}")]
    Transport(String),

    #[error("refresh response is missing {0}")]
    Incomplete(&'static str),

    #[error("failed to persist refreshed tokens: {0}")]
    Persist(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("No Google connection found for this website")]
    NotConnected { website_id: String },

    #[error("Failed to refresh access token")]
    TokenRefreshFailed {
        #[source]
        source: RefreshError,
    },

    #[error(transparent)]
    Upstream(#[from] UpstreamFailure),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// The error vocabulary callers of the connector see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotConnected,
    TokenRefreshFailed,
    RateLimited,
    InsufficientScope,
    InvalidProperty,
    GoogleApiError,
    Unauthorized,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotConnected => "NOT_CONNECTED",
            Self::TokenRefreshFailed => "TOKEN_REFRESH_FAILED",
            Self::RateLimited => "RATE_LIMITED",
            Self::InsufficientScope => "INSUFFICIENT_SCOPE",
            Self::InvalidProperty => "INVALID_PROPERTY",
            Self::GoogleApiError => "GOOGLE_API_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotConnected => StatusCode::NOT_FOUND,
            Self::TokenRefreshFailed => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InsufficientScope => StatusCode::FORBIDDEN,
            Self::InvalidProperty => StatusCode::BAD_REQUEST,
            Self::GoogleApiError => StatusCode::BAD_GATEWAY,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedError {
    pub code: ErrorCode,
    pub message: String,
}

/// Errors rendered by the HTTP surface.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let normalized = match &self {
            ApiError::Unauthorized => NormalizedError {
                code: ErrorCode::Unauthorized,
                message: "Invalid API key".to_string(),
            },
            ApiError::Connector(e) => {
                match e {
                    ConnectorError::Store(inner) => tracing::error!("Store error: {:#}", inner),
                    ConnectorError::TokenRefreshFailed { source } => {
                        tracing::warn!("Token refresh failed: {}", source)
                    }
                    _ => {}
                }
                normalize(e)
            }
        };

        let status = normalized.code.status();
        let body = Json(json!({
            "ok": false,
            "error": normalized,
        }));

        let mut response = (status, body).into_response();

        if normalized.code == ErrorCode::RateLimited {
            response
                .headers_mut()
                .insert("retry-after", axum::http::HeaderValue::from_static("60"));
        }

        response
    }
}
