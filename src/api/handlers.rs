use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use super::AppState;
use crate::errors::{ApiError, ConnectorError};
use crate::google::resolver::is_fresh;
use crate::middleware::auth::CallerIdentity;
use crate::models::Connection;

// ── Response DTOs ────────────────────────────────────────────

/// Connection metadata safe to hand to callers. Never carries tokens.
#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    pub website_id: String,
    pub connected: bool,
    pub google_user_email: String,
    pub scopes: Vec<String>,
    pub sc_property: Option<String>,
    pub ga4_property_id: Option<String>,
    pub expiry_date: i64,
    pub token_fresh: bool,
}

impl ConnectionStatus {
    pub fn from_connection(conn: Connection, now_ms: i64) -> Self {
        Self {
            token_fresh: is_fresh(conn.expiry_date, now_ms),
            website_id: conn.website_id,
            connected: true,
            google_user_email: conn.google_user_email,
            scopes: conn.scopes,
            sc_property: conn.sc_property,
            ga4_property_id: conn.ga4_property_id,
            expiry_date: conn.expiry_date,
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────

pub async fn get_connection(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let conn = state
        .store
        .get_connection(&website_id)
        .await
        .map_err(ConnectorError::Store)?
        .ok_or(ConnectorError::NotConnected {
            website_id: website_id.clone(),
        })?;

    let status = ConnectionStatus::from_connection(conn, chrono::Utc::now().timestamp_millis());
    Ok(Json(json!({ "ok": true, "connection": status })))
}

/// Resolve credentials (refreshing if needed) and list Search Console sites
/// to prove the connection works end to end.
pub async fn check_connection(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<Value>, ApiError> {
    tracing::debug!(website_id = %website_id, caller = ?caller, "checking Google connection");

    let client = state.resolver.resolve(&website_id).await?;
    let sites = state
        .invoker
        .invoke(|| client.list_sites())
        .await
        .map_err(ConnectorError::from)?;

    Ok(Json(json!({
        "ok": true,
        "website_id": website_id,
        "expiry_date": client.expiry_date(),
        "sites": sites,
    })))
}
