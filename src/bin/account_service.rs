//! account_service - store-side account backend
//!
//! Serves balance reads, deposits and withdrawals against one account store.
//! Two instances run side by side: one on the document store (primary) and
//! one on the relational store (fallback).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderName;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use account_gateway::api::{self, AccountServiceState};
use account_gateway::audit::TransactionAuditLog;
use account_gateway::db;
use account_gateway::engine::{AccountMutationEngine, PgAccountStore};
use account_gateway::gateway::CORRELATION_ID_HEADER;
use account_gateway::telemetry::{init_tracing, shutdown_signal};
use account_gateway::{expose_internal_errors, AccountServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing("account_gateway=debug,account_service=debug,audit=info,tower_http=debug");

    let config = AccountServiceConfig::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    expose_internal_errors(config.is_development());

    tracing::info!(store = %config.store_kind, "Starting account service");
    tracing::info!("Connecting to database...");

    let pool = db::connect(&config.database_url, config.database_max_connections).await?;

    if !db::check_schema(&pool, config.store_kind).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let audit = match &config.audit_log_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Writing audit trail");
            TransactionAuditLog::to_file(path)
        }
        None => TransactionAuditLog::tracing_only(),
    };

    let engine = AccountMutationEngine::new(
        Arc::new(PgAccountStore::new(pool.clone())),
        Arc::new(audit),
        config.store_kind,
    );

    let state = AccountServiceState {
        engine: Arc::new(engine),
    };

    let correlation_header = HeaderName::from_static(CORRELATION_ID_HEADER);
    let app = api::account_service_app(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(correlation_header.clone(), MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(correlation_header)),
    );

    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}
