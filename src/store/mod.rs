pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::models::{Connection, NewConnection, PropertyKind, TokenSet};

/// Persistence for per-website Google credentials.
/// Implementations: PgStore (PostgreSQL), MemoryStore (in-process).
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn get_connection(&self, website_id: &str) -> anyhow::Result<Option<Connection>>;

    /// Insert, or replace the credential fields of an existing row.
    /// Linked properties survive a replace.
    async fn upsert_connection(&self, conn: &NewConnection) -> anyhow::Result<Connection>;

    /// Single-row write of the whole token triple.
    async fn update_connection_tokens(
        &self,
        website_id: &str,
        tokens: &TokenSet,
    ) -> anyhow::Result<()>;

    async fn update_linked_property(
        &self,
        website_id: &str,
        kind: PropertyKind,
        property_id: &str,
    ) -> anyhow::Result<()>;
}
