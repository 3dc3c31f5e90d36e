use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::google::{CredentialResolver, ResilientInvoker};
use crate::middleware::auth::{require_auth, AccessGate};
use crate::store::ConnectionStore;

pub mod handlers;

/// Shared state passed to handlers and middleware.
pub struct AppState {
    pub store: Arc<dyn ConnectionStore>,
    pub resolver: CredentialResolver,
    pub invoker: ResilientInvoker,
    pub gate: AccessGate,
}

/// Build the connection API router.
/// All routes are relative; the caller mounts this under `/api/v1`.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/connections/:website_id", get(handlers::get_connection))
        .route(
            "/connections/:website_id/check",
            post(handlers::check_connection),
        )
        .layer(middleware::from_fn_with_state(
            state.gate.clone(),
            require_auth,
        ))
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
        .with_state(state)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}
