use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored OAuth credential for one website. Exactly one row per `website_id`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Connection {
    pub website_id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute access-token expiry, epoch milliseconds.
    pub expiry_date: i64,
    pub scopes: Vec<String>,
    pub sc_property: Option<String>,
    pub ga4_property_id: Option<String>,
    pub google_user_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    pub fn tokens(&self) -> TokenSet {
        TokenSet {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expiry_date: self.expiry_date,
        }
    }

    pub fn linked_property(&self, kind: PropertyKind) -> Option<&str> {
        match kind {
            PropertyKind::SearchConsole => self.sc_property.as_deref(),
            PropertyKind::Analytics => self.ga4_property_id.as_deref(),
        }
    }
}

/// Input for `upsert_connection`, produced by the initial token exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConnection {
    pub website_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expiry_date: i64,
    pub scopes: Vec<String>,
    pub sc_property: Option<String>,
    pub ga4_property_id: Option<String>,
    pub google_user_email: String,
}

/// The token triple. Always written as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    pub expiry_date: i64,
}

/// External resources a website can be linked to after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropertyKind {
    SearchConsole,
    Analytics,
}

impl PropertyKind {
    /// Column in `google_connections` holding this property.
    pub fn column(&self) -> &'static str {
        match self {
            PropertyKind::SearchConsole => "sc_property",
            PropertyKind::Analytics => "ga4_property_id",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::SearchConsole => "search-console",
            PropertyKind::Analytics => "analytics",
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "search-console" | "sc" | "gsc" => Ok(PropertyKind::SearchConsole),
            "analytics" | "ga4" => Ok(PropertyKind::Analytics),
            other => Err(format!(
                "unknown property kind '{}' (expected search-console or analytics)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_kind_parse() {
        assert_eq!("search-console".parse::<PropertyKind>(), Ok(PropertyKind::SearchConsole));
        assert_eq!("GA4".parse::<PropertyKind>(), Ok(PropertyKind::Analytics));
        assert!("adwords".parse::<PropertyKind>().is_err());
    }

    #[test]
    fn test_property_kind_columns() {
        assert_eq!(PropertyKind::SearchConsole.column(), "sc_property");
        assert_eq!(PropertyKind::Analytics.column(), "ga4_property_id");
    }
}
