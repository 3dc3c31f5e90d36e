use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::client::{AuthenticatedClient, GoogleEndpoints};
use super::oauth::TokenRefresher;
use crate::errors::{ConnectorError, RefreshError};
use crate::models::Connection;
use crate::store::ConnectionStore;

/// Tokens expiring within this window are treated as already expired.
pub const FRESHNESS_BUFFER_MS: i64 = 5 * 60 * 1000;

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

pub fn is_fresh(expiry_date: i64, now_ms: i64) -> bool {
    expiry_date > now_ms + FRESHNESS_BUFFER_MS
}

/// Turns a website id into a usable Google credential, refreshing it when stale.
pub struct CredentialResolver {
    store: Arc<dyn ConnectionStore>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    endpoints: GoogleEndpoints,
    http: reqwest::Client,
    /// One refresh at a time per website within this process.
    refresh_guards: DashMap<String, Arc<Mutex<()>>>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn ConnectionStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresher,
            clock: Arc::new(SystemClock),
            endpoints: GoogleEndpoints::default(),
            http: reqwest::Client::new(),
            refresh_guards: DashMap::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub async fn resolve(&self, website_id: &str) -> Result<AuthenticatedClient, ConnectorError> {
        let conn = self.load(website_id).await?;
        if is_fresh(conn.expiry_date, self.clock.now_millis()) {
            return Ok(self.handle(conn));
        }

        let guard = self
            .refresh_guards
            .entry(website_id.to_string())
            .or_default()
            .clone();

        let result = {
            let _refreshing = guard.lock().await;
            self.refresh_if_stale(website_id).await
        };

        // Last holder out drops the entry; the map only holds websites mid-refresh
        self.refresh_guards
            .remove_if(website_id, |_, g| Arc::strong_count(g) == 2);

        result.map(|conn| self.handle(conn))
    }

    /// Runs under the website's refresh guard.
    async fn refresh_if_stale(&self, website_id: &str) -> Result<Connection, ConnectorError> {
        // A concurrent request may have refreshed while we waited
        let conn = self.load(website_id).await?;
        if is_fresh(conn.expiry_date, self.clock.now_millis()) {
            debug!(website_id = %website_id, "token refreshed by a concurrent request");
            return Ok(conn);
        }

        self.refresh(conn).await
    }

    async fn load(&self, website_id: &str) -> Result<Connection, ConnectorError> {
        self.store
            .get_connection(website_id)
            .await?
            .ok_or_else(|| ConnectorError::NotConnected {
                website_id: website_id.to_string(),
            })
    }

    /// Exactly one refresh grant; the new triple is stored before it is used.
    async fn refresh(&self, mut conn: Connection) -> Result<Connection, ConnectorError> {
        info!(
            website_id = %conn.website_id,
            expiry_date = conn.expiry_date,
            "access token stale, refreshing"
        );

        let tokens = self
            .refresher
            .refresh(&conn.refresh_token)
            .await
            .and_then(|refreshed| refreshed.into_token_set())
            .map_err(|source| {
                warn!(website_id = %conn.website_id, "token refresh failed: {}", source);
                ConnectorError::TokenRefreshFailed { source }
            })?;

        self.store
            .update_connection_tokens(&conn.website_id, &tokens)
            .await
            .map_err(|e| ConnectorError::TokenRefreshFailed {
                source: RefreshError::Persist(e),
            })?;

        conn.access_token = tokens.access_token;
        conn.refresh_token = tokens.refresh_token;
        conn.expiry_date = tokens.expiry_date;
        Ok(conn)
    }

    fn handle(&self, conn: Connection) -> AuthenticatedClient {
        AuthenticatedClient::new(
            &conn.website_id,
            conn.tokens(),
            conn.scopes,
            self.endpoints.clone(),
            self.http.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::oauth::RefreshedTokens;
    use crate::models::NewConnection;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;

    const NOW: i64 = 1_700_000_000_000;

    struct FixedClock;

    impl Clock for FixedClock {
        fn now_millis(&self) -> i64 {
            NOW
        }
    }

    struct StaticRefresher(Option<RefreshedTokens>);

    #[async_trait]
    impl TokenRefresher for StaticRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedTokens, RefreshError> {
            self.0
                .clone()
                .ok_or_else(|| RefreshError::Transport("connection reset".into()))
        }
    }

    async fn stale_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_connection(&NewConnection {
                website_id: "site-1".into(),
                access_token: "ya29.old".into(),
                refresh_token: "1//old".into(),
                expiry_date: NOW - 1,
                scopes: vec![],
                sc_property: None,
                ga4_property_id: None,
                google_user_email: "owner@example.com".into(),
            })
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_freshness_buffer_boundary() {
        let now = 1_700_000_000_000;
        assert!(is_fresh(now + FRESHNESS_BUFFER_MS + 1, now));
        assert!(!is_fresh(now + FRESHNESS_BUFFER_MS, now));
        assert!(!is_fresh(now + 60_000, now));
        assert!(!is_fresh(now - 1, now));
    }

    #[tokio::test]
    async fn test_refresh_guard_released_after_refresh() {
        let refreshed = RefreshedTokens {
            access_token: Some("ya29.new".into()),
            refresh_token: Some("1//new".into()),
            expiry_date: Some(NOW + 3_600_000),
        };
        let resolver = CredentialResolver::new(
            stale_store().await,
            Arc::new(StaticRefresher(Some(refreshed))),
        )
        .with_clock(Arc::new(FixedClock));

        let client = resolver.resolve("site-1").await.unwrap();
        assert_eq!(client.access_token(), "ya29.new");
        assert!(resolver.refresh_guards.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_guard_released_after_failure() {
        let resolver =
            CredentialResolver::new(stale_store().await, Arc::new(StaticRefresher(None)))
                .with_clock(Arc::new(FixedClock));

        assert!(matches!(
            resolver.resolve("site-1").await,
            Err(ConnectorError::TokenRefreshFailed { .. })
        ));
        assert!(resolver.refresh_guards.is_empty());
    }
}
