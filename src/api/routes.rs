//! Gateway Routes
//!
//! Authenticated account endpoints, each forwarded through the dual-target
//! dispatcher. The backend's answer is returned as-is.

use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::{HeaderMap, Method, Uri},
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::domain::{IdentityRecord, Operation, OperationContext};
use crate::error::AppError;
use crate::gateway::{DualTargetDispatcher, ForwardRequest, ProxiedResponse};
use crate::identity::IdentityResolver;

/// Shared gateway state
#[derive(Clone)]
pub struct GatewayState {
    pub verifier: Arc<dyn TokenVerifier>,
    pub resolver: Arc<IdentityResolver>,
    pub dispatcher: Arc<DualTargetDispatcher>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the gateway router (authentication is layered on by the caller)
pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/accounts/balance", get(balance))
        .route("/accounts/balance/:account_id", get(balance))
        .route("/accounts/deposit", post(deposit))
        .route("/accounts/deposit/:account_id", post(deposit))
        .route("/accounts/withdraw", post(withdraw))
        .route("/accounts/withdraw/:account_id", post(withdraw))
}

/// Incoming request parts handed to the dispatcher
struct Forwarded {
    identity: IdentityRecord,
    context: OperationContext,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

async fn balance(
    State(state): State<GatewayState>,
    Extension(identity): Extension<IdentityRecord>,
    Extension(context): Extension<OperationContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ProxiedResponse, AppError> {
    let forwarded = Forwarded {
        identity,
        context,
        method,
        uri,
        headers,
        body,
    };
    proxy(state, Operation::BalanceRead, forwarded).await
}

async fn deposit(
    State(state): State<GatewayState>,
    Extension(identity): Extension<IdentityRecord>,
    Extension(context): Extension<OperationContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ProxiedResponse, AppError> {
    let forwarded = Forwarded {
        identity,
        context,
        method,
        uri,
        headers,
        body,
    };
    proxy(state, Operation::Deposit, forwarded).await
}

async fn withdraw(
    State(state): State<GatewayState>,
    Extension(identity): Extension<IdentityRecord>,
    Extension(context): Extension<OperationContext>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ProxiedResponse, AppError> {
    let forwarded = Forwarded {
        identity,
        context,
        method,
        uri,
        headers,
        body,
    };
    proxy(state, Operation::Withdrawal, forwarded).await
}

async fn proxy(
    state: GatewayState,
    operation: Operation,
    forwarded: Forwarded,
) -> Result<ProxiedResponse, AppError> {
    let Forwarded {
        identity,
        context,
        method,
        uri,
        headers,
        body,
    } = forwarded;

    let request = ForwardRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
        context,
    };

    // Runs detached: a client disconnect must not cancel the backend call or the publish
    let dispatcher = state.dispatcher.clone();
    let task = tokio::spawn(async move {
        dispatcher
            .dispatch(operation, &identity, request)
            .await
            .map(|outcome| (outcome, identity))
    });

    let (outcome, identity) = task
        .await
        .map_err(|e| AppError::Internal(format!("Dispatch task failed: {}", e)))??;

    tracing::info!(
        operation = %operation,
        subject = %identity.subject(),
        served_by = %outcome.served_by,
        status = %outcome.response.status,
        reconciling = outcome.reconciliation.is_some(),
        "Request dispatched"
    );

    Ok(outcome.response)
}
