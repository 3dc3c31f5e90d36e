use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderValue;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use connector::api::{self, AppState};
use connector::config::{self, Config};
use connector::google::{CredentialResolver, GoogleTokenRefresher, ResilientInvoker};
use connector::middleware::auth::AccessGate;
use connector::store::memory::MemoryStore;
use connector::store::postgres::PgStore;
use connector::store::ConnectionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // OTLP export is opt-in: only when OTEL_EXPORTER_OTLP_ENDPOINT is set.
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "google-connector"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "connector=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port, memory }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port, memory).await
        }
        Some(cli::Commands::Connection { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            handle_connection_command(command, &db).await
        }
        Some(cli::Commands::Token { command }) => {
            handle_token_command(command, &AccessGate::new(&cfg.shared_secret))
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port, false).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: Config, port: u16, memory: bool) -> anyhow::Result<()> {
    let store: Arc<dyn ConnectionStore> = if memory {
        tracing::warn!("Using in-memory connection store; connections are lost on restart");
        Arc::new(MemoryStore::new())
    } else {
        tracing::info!("Connecting to database...");
        let db = PgStore::connect(&cfg.database_url).await?;

        tracing::info!("Running migrations...");
        db.migrate().await?;
        Arc::new(db)
    };

    let oauth = cfg.oauth_credentials();
    if oauth.is_none() {
        tracing::warn!(
            "GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET / GOOGLE_REDIRECT_URI not set; stale tokens cannot be refreshed"
        );
    }
    let refresher = Arc::new(GoogleTokenRefresher::new(oauth)?);

    let state = Arc::new(AppState {
        store: store.clone(),
        resolver: CredentialResolver::new(store, refresher),
        invoker: ResilientInvoker::new(cfg.retry_policy()),
        gate: AccessGate::new(&cfg.shared_secret),
    });

    let app = axum::Router::new()
        // Health endpoints (no auth)
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .nest("/api/v1", api::api_router(state))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(security_headers_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Google connector listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Middleware: responses carry credentials metadata, keep them out of caches.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.remove("server");

    resp
}

async fn handle_connection_command(
    cmd: cli::ConnectionCommands,
    store: &dyn ConnectionStore,
) -> anyhow::Result<()> {
    match cmd {
        cli::ConnectionCommands::Show { website_id } => {
            match store.get_connection(&website_id).await? {
                Some(conn) => {
                    let status = api::handlers::ConnectionStatus::from_connection(
                        conn,
                        chrono::Utc::now().timestamp_millis(),
                    );
                    println!("{}", serde_json::to_string_pretty(&status)?);
                }
                None => println!("No Google connection for website '{}'.", website_id),
            }
        }
        cli::ConnectionCommands::LinkProperty {
            website_id,
            kind,
            property_id,
        } => {
            if store.get_connection(&website_id).await?.is_none() {
                anyhow::bail!("No Google connection for website '{}'", website_id);
            }
            store
                .update_linked_property(&website_id, kind, &property_id)
                .await?;
            println!(
                "Linked property:\n  Website:  {}\n  Kind:     {}\n  Property: {}",
                website_id, kind, property_id
            );
        }
    }
    Ok(())
}

fn handle_token_command(cmd: cli::TokenCommands, gate: &AccessGate) -> anyhow::Result<()> {
    match cmd {
        cli::TokenCommands::Issue { claims } => {
            let claims = claims
                .into_iter()
                .map(|(k, v)| (k, serde_json::Value::String(v)))
                .collect();
            let token = gate.issue_token(claims).context("failed to sign token")?;
            println!("{}", token);
        }
        cli::TokenCommands::Verify { token } => {
            let claims = gate.verify_token(&token).context("token rejected")?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
    }
    Ok(())
}
