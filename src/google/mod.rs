//! Google credential lifecycle and resilient API access.
//!
//! Request path:
//! 1. [`resolver::CredentialResolver`] loads the website's stored credential and
//!    refreshes it when it is inside the freshness buffer
//! 2. [`retry::ResilientInvoker`] runs the call on the returned
//!    [`client::AuthenticatedClient`], retrying 429/5xx with exponential backoff
//! 3. [`normalize::normalize`] turns whatever failed into the stable error vocabulary

pub mod client;
pub mod normalize;
pub mod oauth;
pub mod resolver;
pub mod retry;

pub use client::{AuthenticatedClient, GoogleEndpoints};
pub use oauth::{GoogleTokenRefresher, OAuthCredentials, RefreshedTokens, TokenRefresher};
pub use resolver::{Clock, CredentialResolver, SystemClock};
pub use retry::{ResilientInvoker, RetryPolicy, Sleeper, TokioSleeper};

/// Scopes requested when a website is connected.
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/webmasters.readonly",
    "https://www.googleapis.com/auth/analytics.readonly",
    "openid",
    "email",
];
