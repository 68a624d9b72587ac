//! account_gateway - Dual-target account gateway
//!
//! Authenticates callers, resolves their per-store identities and forwards
//! balance, deposit and withdrawal requests to a primary backend with a
//! single failover to the fallback backend. Successful mutations are
//! published to the sync service so the other store can reconcile.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderName;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use account_gateway::api::{self, GatewayState};
use account_gateway::auth::JwtVerifier;
use account_gateway::db;
use account_gateway::domain::StoreKind;
use account_gateway::gateway::{
    DualTargetDispatcher, ReconciliationPublisher, CORRELATION_ID_HEADER,
};
use account_gateway::identity::{IdentityResolver, PgIdentityStore};
use account_gateway::telemetry::{init_tracing, shutdown_signal};
use account_gateway::{expose_internal_errors, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing("account_gateway=debug,tower_http=debug");

    // Load configuration
    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    expose_internal_errors(config.is_development());

    tracing::info!(environment = ?config.environment, "Starting account gateway");
    tracing::info!("Connecting to identity stores...");

    // A store that is down at startup is tolerated; the resolver degrades per request
    let relational_pool = db::connect_lazy(
        &config.relational_database_url,
        config.database_max_connections,
    )?;
    let document_pool =
        db::connect_lazy(&config.document_database_url, config.database_max_connections)?;

    for (kind, pool) in [
        (StoreKind::Relational, &relational_pool),
        (StoreKind::Document, &document_pool),
    ] {
        match db::verify_connection(pool).await {
            Ok(()) => tracing::info!(store = %kind, "Identity store reachable"),
            Err(e) => {
                tracing::warn!(store = %kind, error = %e, "Identity store unreachable at startup")
            }
        }
    }

    let resolver = IdentityResolver::new(
        Arc::new(PgIdentityStore::new(relational_pool.clone(), StoreKind::Relational)),
        Arc::new(PgIdentityStore::new(document_pool.clone(), StoreKind::Document)),
    );

    let publisher = ReconciliationPublisher::new(
        config.sync_service_url.clone(),
        config.reconciliation_timeout,
        config.default_currency,
    )?;

    let dispatcher = DualTargetDispatcher::new(
        config.targets.clone(),
        config.backend_timeout,
        config.max_buffered_body_bytes,
        Some(publisher),
    )?;

    let state = GatewayState {
        verifier: Arc::new(JwtVerifier::new(&config.jwt)),
        resolver: Arc::new(resolver),
        dispatcher: Arc::new(dispatcher),
    };

    let correlation_header = HeaderName::from_static(CORRELATION_ID_HEADER);
    let app = api::gateway_app(state, config.max_request_body_bytes).layer(
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

    // Cleanup
    tracing::info!("Server shutting down...");
    relational_pool.close().await;
    document_pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}
