//! Google Connector library crate for the service binary and integration tests.
//!
//! Links website identities to Google OAuth credentials and makes resilient
//! Search Console / Analytics calls on their behalf.

pub mod api;
pub mod config;
pub mod errors;
pub mod google;
pub mod middleware;
pub mod models;
pub mod store;
