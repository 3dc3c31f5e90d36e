use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::ConnectionStore;
use crate::models::{Connection, NewConnection, PropertyKind, TokenSet};

/// In-process store for local runs and tests. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    rows: DashMap<String, Connection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn get_connection(&self, website_id: &str) -> anyhow::Result<Option<Connection>> {
        Ok(self.rows.get(website_id).map(|r| r.clone()))
    }

    async fn upsert_connection(&self, conn: &NewConnection) -> anyhow::Result<Connection> {
        let now = Utc::now();
        let row = self
            .rows
            .entry(conn.website_id.clone())
            .and_modify(|existing| {
                existing.access_token = conn.access_token.clone();
                existing.refresh_token = conn.refresh_token.clone();
                existing.expiry_date = conn.expiry_date;
                existing.scopes = conn.scopes.clone();
                existing.google_user_email = conn.google_user_email.clone();
                existing.updated_at = now;
            })
            .or_insert_with(|| Connection {
                website_id: conn.website_id.clone(),
                access_token: conn.access_token.clone(),
                refresh_token: conn.refresh_token.clone(),
                expiry_date: conn.expiry_date,
                scopes: conn.scopes.clone(),
                sc_property: conn.sc_property.clone(),
                ga4_property_id: conn.ga4_property_id.clone(),
                google_user_email: conn.google_user_email.clone(),
                created_at: now,
                updated_at: now,
            })
            .clone();

        Ok(row)
    }

    async fn update_connection_tokens(
        &self,
        website_id: &str,
        tokens: &TokenSet,
    ) -> anyhow::Result<()> {
        if let Some(mut row) = self.rows.get_mut(website_id) {
            row.access_token = tokens.access_token.clone();
            row.refresh_token = tokens.refresh_token.clone();
            row.expiry_date = tokens.expiry_date;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_linked_property(
        &self,
        website_id: &str,
        kind: PropertyKind,
        property_id: &str,
    ) -> anyhow::Result<()> {
        if let Some(mut row) = self.rows.get_mut(website_id) {
            match kind {
                PropertyKind::SearchConsole => row.sc_property = Some(property_id.to_string()),
                PropertyKind::Analytics => row.ga4_property_id = Some(property_id.to_string()),
            }
            row.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_conn(website_id: &str, access: &str) -> NewConnection {
        NewConnection {
            website_id: website_id.to_string(),
            access_token: access.to_string(),
            refresh_token: "1//refresh".to_string(),
            expiry_date: 1_700_000_000_000,
            scopes: vec!["email".to_string()],
            sc_property: None,
            ga4_property_id: None,
            google_user_email: "owner@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_without_duplicating() {
        let store = MemoryStore::new();
        store.upsert_connection(&new_conn("site-1", "ya29.first")).await.unwrap();
        store
            .update_linked_property("site-1", PropertyKind::SearchConsole, "sc-domain:example.com")
            .await
            .unwrap();

        let row = store.upsert_connection(&new_conn("site-1", "ya29.second")).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(row.access_token, "ya29.second");
        // Linked properties are not part of the credential overwrite
        assert_eq!(row.sc_property.as_deref(), Some("sc-domain:example.com"));
    }

    #[tokio::test]
    async fn test_update_tokens_writes_whole_triple() {
        let store = MemoryStore::new();
        store.upsert_connection(&new_conn("site-1", "ya29.old")).await.unwrap();

        let tokens = TokenSet {
            access_token: "ya29.new".to_string(),
            refresh_token: "1//rotated".to_string(),
            expiry_date: 1_800_000_000_000,
        };
        store.update_connection_tokens("site-1", &tokens).await.unwrap();

        let row = store.get_connection("site-1").await.unwrap().unwrap();
        assert_eq!(row.tokens(), tokens);
    }

    #[tokio::test]
    async fn test_update_unknown_website_is_noop() {
        let store = MemoryStore::new();
        store
            .update_linked_property("missing", PropertyKind::Analytics, "properties/1")
            .await
            .unwrap();
        assert!(store.is_empty());
    }
}
