//! API Middleware
//!
//! Bearer authentication with identity resolution (gateway), caller context
//! extraction (account service) and request logging.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

use crate::auth::{bearer_token, AuthError};
use crate::domain::OperationContext;
use crate::error::AppError;
use crate::gateway::{CORRELATION_ID_HEADER, USER_ID_HEADER};

use super::routes::GatewayState;

// =========================================================================
// Bearer authentication
// =========================================================================

/// Verify the bearer token, resolve the caller's identity and attach it,
/// together with an operation context, to the request.
pub async fn auth_middleware(
    State(state): State<GatewayState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let headers = request.headers();

    let token = bearer_token(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    )
    .map_err(unauthenticated)?;
    let fingerprint = token_fingerprint(token);

    let claims = state.verifier.verify(token).await.map_err(|e| {
        tracing::warn!(token = %fingerprint, error = %e, "Token verification failed");
        unauthenticated(e)
    })?;

    let identity = state.resolver.resolve(&claims.subject, &claims).await?;

    // The client's own X-Forwarded-For is never trusted here
    let peer_ip = remote_addr(&request).map(|addr| addr.ip());
    let context = request_context(headers, peer_ip);

    tracing::debug!(
        token = %fingerprint,
        subject = %identity.subject(),
        correlation_id = ?context.correlation_id,
        "Request authenticated"
    );

    request.extensions_mut().insert(identity);
    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

fn unauthenticated(err: AuthError) -> AppError {
    AppError::Unauthenticated(err.to_string())
}

/// Short, non-reversible token tag for logs
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

// =========================================================================
// Account service caller context
// =========================================================================

/// Attach an operation context built from `X-User-ID`, the correlation id
/// and the client address. Validation of the user id is left to the engine
/// so that rejections are audited.
///
/// The account service sits behind the gateway, which sets
/// `X-Forwarded-For` to the peer it observed.
pub async fn context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let ip = client_ip(request.headers(), remote_addr(&request));
    let mut context = request_context(request.headers(), ip);

    if let Some(user_id) = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        context = context.with_user(user_id);
    }

    request.extensions_mut().insert(context);
    next.run(request).await
}

fn remote_addr(request: &Request<Body>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Correlation id (propagated or fresh) and client IP
pub fn request_context(headers: &HeaderMap, ip: Option<IpAddr>) -> OperationContext {
    let correlation_id = headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .unwrap_or_else(Uuid::new_v4);

    let context = OperationContext::new().with_correlation_id(correlation_id);

    match ip {
        Some(ip) => context.with_client_ip(ip),
        None => context,
    }
}

/// First `X-Forwarded-For` hop, else the socket peer
pub fn client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|chain| chain.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .or_else(|| remote.map(|addr| addr.ip()))
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request logging
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    let headers = mask_headers_for_logging(request.headers());

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
