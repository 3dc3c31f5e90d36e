use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use super::ConnectionStore;
use crate::models::{Connection, NewConnection, PropertyKind, TokenSet};

const CONNECTION_COLUMNS: &str = "website_id, access_token, refresh_token, expiry_date, scopes, sc_property, ga4_property_id, google_user_email, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("failed to connect to PostgreSQL")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ConnectionStore for PgStore {
    async fn get_connection(&self, website_id: &str) -> anyhow::Result<Option<Connection>> {
        let row = sqlx::query_as::<_, Connection>(&format!(
            "SELECT {} FROM google_connections WHERE website_id = $1 LIMIT 1",
            CONNECTION_COLUMNS
        ))
        .bind(website_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn upsert_connection(&self, conn: &NewConnection) -> anyhow::Result<Connection> {
        let row = sqlx::query_as::<_, Connection>(&format!(
            r#"INSERT INTO google_connections (website_id, access_token, refresh_token, expiry_date, scopes, sc_property, ga4_property_id, google_user_email)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               ON CONFLICT (website_id) DO UPDATE SET
                   access_token = EXCLUDED.access_token,
                   refresh_token = EXCLUDED.refresh_token,
                   expiry_date = EXCLUDED.expiry_date,
                   scopes = EXCLUDED.scopes,
                   google_user_email = EXCLUDED.google_user_email,
                   updated_at = NOW()
               RETURNING {}"#,
            CONNECTION_COLUMNS
        ))
        .bind(&conn.website_id)
        .bind(&conn.access_token)
        .bind(&conn.refresh_token)
        .bind(conn.expiry_date)
        .bind(&conn.scopes)
        .bind(&conn.sc_property)
        .bind(&conn.ga4_property_id)
        .bind(&conn.google_user_email)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update_connection_tokens(
        &self,
        website_id: &str,
        tokens: &TokenSet,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE google_connections SET access_token = $2, refresh_token = $3, expiry_date = $4, updated_at = NOW() WHERE website_id = $1",
        )
        .bind(website_id)
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.expiry_date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_linked_property(
        &self,
        website_id: &str,
        kind: PropertyKind,
        property_id: &str,
    ) -> anyhow::Result<()> {
        // Column name comes from a closed enum, never from input.
        sqlx::query(&format!(
            "UPDATE google_connections SET {} = $2, updated_at = NOW() WHERE website_id = $1",
            kind.column()
        ))
        .bind(website_id)
        .bind(property_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
