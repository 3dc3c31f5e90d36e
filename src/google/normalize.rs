//! Maps any connector failure onto the public error vocabulary.
//!
//! First match wins:
//!
//! | failure                       | code                   |
//! |-------------------------------|------------------------|
//! | no connection for the website | `NOT_CONNECTED`        |
//! | refresh grant failed          | `TOKEN_REFRESH_FAILED` |
//! | HTTP 429                      | `RATE_LIMITED`         |
//! | HTTP 403                      | `INSUFFICIENT_SCOPE`   |
//! | HTTP 400                      | `INVALID_PROPERTY`     |
//! | anything else                 | `GOOGLE_API_ERROR`     |
//!
//! These codes are part of the API contract. Do not renumber or merge them.

use crate::errors::{ConnectorError, ErrorCode, NormalizedError, UpstreamFailure};

const FALLBACK_MESSAGE: &str = "An error occurred with the Google API";

pub fn normalize(error: &ConnectorError) -> NormalizedError {
    match error {
        ConnectorError::NotConnected { .. } => NormalizedError {
            code: ErrorCode::NotConnected,
            message: error.to_string(),
        },
        ConnectorError::TokenRefreshFailed { .. } => NormalizedError {
            code: ErrorCode::TokenRefreshFailed,
            message: error.to_string(),
        },
        ConnectorError::Upstream(failure) => normalize_upstream(failure),
        ConnectorError::Store(_) => NormalizedError {
            code: ErrorCode::GoogleApiError,
            message: FALLBACK_MESSAGE.to_string(),
        },
    }
}

pub fn normalize_upstream(failure: &UpstreamFailure) -> NormalizedError {
    match failure.status() {
        Some(429) => NormalizedError {
            code: ErrorCode::RateLimited,
            message: "Google API rate limit exceeded. Please try again later.".to_string(),
        },
        Some(403) => NormalizedError {
            code: ErrorCode::InsufficientScope,
            message: "Insufficient permissions. Please reconnect your Google account.".to_string(),
        },
        Some(400) => NormalizedError {
            code: ErrorCode::InvalidProperty,
            message: "Invalid property ID or property not found.".to_string(),
        },
        _ => {
            let message = failure.message();
            NormalizedError {
                code: ErrorCode::GoogleApiError,
                message: if message.is_empty() {
                    FALLBACK_MESSAGE.to_string()
                } else {
                    message
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RefreshError;

    fn upstream(status: u16) -> ConnectorError {
        ConnectorError::Upstream(UpstreamFailure::http(status))
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(normalize(&upstream(429)).code, ErrorCode::RateLimited);
        assert_eq!(normalize(&upstream(403)).code, ErrorCode::InsufficientScope);
        assert_eq!(normalize(&upstream(400)).code, ErrorCode::InvalidProperty);
        assert_eq!(normalize(&upstream(500)).code, ErrorCode::GoogleApiError);
        assert_eq!(normalize(&upstream(404)).code, ErrorCode::GoogleApiError);
    }

    #[test]
    fn test_not_connected_passes_through() {
        let err = ConnectorError::NotConnected {
            website_id: "site-1".into(),
        };
        let normalized = normalize(&err);
        assert_eq!(normalized.code, ErrorCode::NotConnected);
        assert_eq!(normalized.message, "No Google connection found for this website");
    }

    #[test]
    fn test_refresh_failure_keeps_its_code() {
        let err = ConnectorError::TokenRefreshFailed {
            source: RefreshError::Rejected {
                status: 400,
                body: "invalid_grant".into(),
            },
        };
        let normalized = normalize(&err);
        assert_eq!(normalized.code, ErrorCode::TokenRefreshFailed);
        // Grant details are logged, not returned
        assert!(!normalized.message.contains("invalid_grant"));
    }

    #[test]
    fn test_catch_all_uses_google_message() {
        let err = ConnectorError::Upstream(UpstreamFailure::Http {
            status: 404,
            detail: Some("Requested entity was not found.".into()),
        });
        assert_eq!(normalize(&err).message, "Requested entity was not found.");

        let err = ConnectorError::Upstream(UpstreamFailure::Unknown {
            raw: "error decoding response body".into(),
        });
        let normalized = normalize(&err);
        assert_eq!(normalized.code, ErrorCode::GoogleApiError);
        assert_eq!(normalized.message, "error decoding response body");

        let err = ConnectorError::Upstream(UpstreamFailure::Unknown { raw: String::new() });
        assert_eq!(normalize(&err).message, FALLBACK_MESSAGE);
    }

    #[test]
    fn test_sdk_codes_fall_through_to_catch_all() {
        let err = ConnectorError::Upstream(UpstreamFailure::SdkCode {
            code: "429".into(),
            message: "quota".into(),
        });
        assert_eq!(normalize(&err).code, ErrorCode::GoogleApiError);
    }

    #[test]
    fn test_store_failures_do_not_leak_details() {
        let err = ConnectorError::Store(anyhow::anyhow!("connection refused (os error 111)"));
        let normalized = normalize(&err);
        assert_eq!(normalized.code, ErrorCode::GoogleApiError);
        assert_eq!(normalized.message, FALLBACK_MESSAGE);
    }
}
