//! Dual-Target Dispatcher
//!
//! Forwards one operation to its primary backend and, on a transport failure
//! only, once to its fallback backend under the caller's relational-store id.
//! Whatever status a backend answers with is passed through untouched.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::domain::{IdentityRecord, Operation, OperationContext};
use crate::error::AppError;

use super::reconciliation::ReconciliationPublisher;
use super::targets::{ServiceTargets, Target};

/// Header carrying the caller's id in the serving store's namespace
pub const USER_ID_HEADER: &str = "x-user-id";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Connection-scoped headers that never cross a proxy hop
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Progress through the primary/fallback pair for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverState {
    NotAttempted,
    PrimaryFailed,
    FallbackAttempted,
}

/// Inbound request as forwarded to a backend
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub context: OperationContext,
}

/// Backend response body: fully buffered, or streamed when over the cap
pub enum ProxiedBody {
    Buffered(Bytes),
    Streamed(Body),
}

impl fmt::Debug for ProxiedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxiedBody::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            ProxiedBody::Streamed(_) => f.write_str("Streamed"),
        }
    }
}

/// Backend response as returned to the caller
#[derive(Debug)]
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ProxiedBody,
}

impl ProxiedResponse {
    pub fn buffered_body(&self) -> Option<&Bytes> {
        match &self.body {
            ProxiedBody::Buffered(bytes) => Some(bytes),
            ProxiedBody::Streamed(_) => None,
        }
    }
}

impl IntoResponse for ProxiedResponse {
    fn into_response(self) -> Response {
        let body = match self.body {
            ProxiedBody::Buffered(bytes) => Body::from(bytes),
            ProxiedBody::Streamed(body) => body,
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Result of a dispatch
#[derive(Debug)]
pub struct DispatchOutcome {
    pub response: ProxiedResponse,
    pub served_by: Target,
    /// Detached reconciliation task, if one was started
    pub reconciliation: Option<JoinHandle<()>>,
}

pub struct DualTargetDispatcher {
    client: Client,
    targets: ServiceTargets,
    publisher: Option<ReconciliationPublisher>,
    max_buffered: usize,
}

impl DualTargetDispatcher {
    pub fn new(
        targets: ServiceTargets,
        backend_timeout: Duration,
        max_buffered: usize,
        publisher: Option<ReconciliationPublisher>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(backend_timeout).build()?;

        Ok(Self {
            client,
            targets,
            publisher,
            max_buffered,
        })
    }

    /// Forward `request` for `operation` on behalf of `identity`
    pub async fn dispatch(
        &self,
        operation: Operation,
        identity: &IdentityRecord,
        request: ForwardRequest,
    ) -> Result<DispatchOutcome, AppError> {
        let (served_by, response) = self
            .forward(operation, identity, &request, FailoverState::NotAttempted)
            .await?;

        let (response, buffered) = self.collect(response, served_by).await?;

        let reconciliation = match (&self.publisher, buffered) {
            (Some(publisher), Some(body))
                if operation.is_mutating() && response.status.is_success() =>
            {
                publisher.publish(operation, identity, served_by, &request.body, &body)
            }
            (Some(_), None) if operation.is_mutating() && response.status.is_success() => {
                tracing::warn!(
                    operation = %operation,
                    subject = %identity.subject(),
                    "Response exceeded the buffering cap; not reconciled"
                );
                None
            }
            _ => None,
        };

        Ok(DispatchOutcome {
            response,
            served_by,
            reconciliation,
        })
    }

    /// Walk the failover states until a backend answers or both have failed
    async fn forward(
        &self,
        operation: Operation,
        identity: &IdentityRecord,
        request: &ForwardRequest,
        mut state: FailoverState,
    ) -> Result<(Target, reqwest::Response), AppError> {
        let mut last_error = String::new();

        loop {
            match state {
                FailoverState::NotAttempted => {
                    let Some(document_id) = identity.document_store_id() else {
                        tracing::info!(
                            operation = %operation,
                            subject = %identity.subject(),
                            "No document-store id; going straight to fallback"
                        );
                        last_error = "no document-store id".to_string();
                        state = FailoverState::PrimaryFailed;
                        continue;
                    };

                    match self.send(operation, Target::Primary, document_id, request).await {
                        Ok(response) => return Ok((Target::Primary, response)),
                        Err(e) => {
                            tracing::warn!(
                                operation = %operation,
                                subject = %identity.subject(),
                                error = %e,
                                "Primary backend unreachable, failing over"
                            );
                            last_error = e.to_string();
                            state = FailoverState::PrimaryFailed;
                        }
                    }
                }
                FailoverState::PrimaryFailed => {
                    let Some(relational_id) = identity.relational_store_id() else {
                        tracing::error!(
                            operation = %operation,
                            subject = %identity.subject(),
                            "Primary failed and identity has no relational-store id"
                        );
                        return Err(AppError::ServiceUnavailable(
                            "Primary backend unavailable and no fallback identity".to_string(),
                        ));
                    };

                    state = FailoverState::FallbackAttempted;
                    match self.send(operation, Target::Fallback, relational_id, request).await {
                        Ok(response) => return Ok((Target::Fallback, response)),
                        Err(e) => {
                            tracing::error!(
                                operation = %operation,
                                subject = %identity.subject(),
                                primary_error = %last_error,
                                error = %e,
                                "Fallback backend unreachable"
                            );
                            last_error = e.to_string();
                        }
                    }
                }
                FailoverState::FallbackAttempted => {
                    return Err(AppError::BadGateway(format!(
                        "Both backends failed for {}: {}",
                        operation, last_error
                    )));
                }
            }
        }
    }

    async fn send(
        &self,
        operation: Operation,
        target: Target,
        user_id: &str,
        request: &ForwardRequest,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let endpoint = self.targets.for_operation(operation).endpoint(target);
        let url = endpoint.url_for(&request.path, request.query.as_deref());
        let headers = outbound_headers(&request.headers, user_id, &request.context);

        tracing::debug!(
            operation = %operation,
            target = %target,
            url = %url,
            "Forwarding request"
        );

        self.client
            .request(request.method.clone(), url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
    }

    /// Read the backend body, buffering up to the cap.
    ///
    /// Returns the buffered bytes alongside the response when the whole body
    /// fit under the cap.
    async fn collect(
        &self,
        mut response: reqwest::Response,
        served_by: Target,
    ) -> Result<(ProxiedResponse, Option<Bytes>), AppError> {
        let status = response.status();
        let headers = inbound_headers(response.headers());

        let declared_too_large = response
            .content_length()
            .map(|len| len > self.max_buffered as u64)
            .unwrap_or(false);

        if declared_too_large {
            let body = Body::from_stream(response.bytes_stream());
            return Ok((streamed(status, headers, body), None));
        }

        let mut buffer: Vec<u8> = Vec::new();
        loop {
            let chunk = response.chunk().await.map_err(|e| {
                tracing::error!(served_by = %served_by, error = %e, "Backend body read failed");
                AppError::BadGateway(format!(
                    "Failed to read {} backend response: {}",
                    served_by, e
                ))
            })?;

            let Some(chunk) = chunk else {
                break;
            };
            buffer.extend_from_slice(&chunk);

            if buffer.len() > self.max_buffered {
                let head = Bytes::from(buffer);
                let rest = futures::stream::iter([Ok::<Bytes, reqwest::Error>(head)])
                    .chain(response.bytes_stream());
                return Ok((streamed(status, headers, Body::from_stream(rest)), None));
            }
        }

        let body = Bytes::from(buffer);
        Ok((
            ProxiedResponse {
                status,
                headers,
                body: ProxiedBody::Buffered(body.clone()),
            },
            Some(body),
        ))
    }
}

fn streamed(status: StatusCode, headers: HeaderMap, body: Body) -> ProxiedResponse {
    ProxiedResponse {
        status,
        headers,
        body: ProxiedBody::Streamed(body),
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Headers sent to a backend.
///
/// Replies must stay plain JSON for reconciliation, so the client's
/// `Accept-Encoding` is not forwarded. `X-Forwarded-For` carries only the
/// peer address this gateway observed.
fn outbound_headers(inbound: &HeaderMap, user_id: &str, context: &OperationContext) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in inbound {
        if is_hop_by_hop(name)
            || *name == header::HOST
            || *name == header::CONTENT_LENGTH
            || *name == header::ACCEPT_ENCODING
            || name.as_str() == USER_ID_HEADER
            || name.as_str() == FORWARDED_FOR_HEADER
            || name.as_str() == CORRELATION_ID_HEADER
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Ok(value) = HeaderValue::from_str(user_id) {
        headers.insert(HeaderName::from_static(USER_ID_HEADER), value);
    }

    if let Some(correlation_id) = context.correlation_id {
        if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
            headers.insert(HeaderName::from_static(CORRELATION_ID_HEADER), value);
        }
    }

    if let Some(ip) = context.client_ip {
        if let Ok(value) = HeaderValue::from_str(&ip.to_string()) {
            headers.insert(HeaderName::from_static(FORWARDED_FOR_HEADER), value);
        }
    }

    headers
}

/// Headers returned to the caller
fn inbound_headers(backend: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in backend {
        if is_hop_by_hop(name) || *name == header::CONTENT_LENGTH {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_outbound_headers_rekey_user_and_strip_hop_by_hop() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("gateway"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        inbound.insert(USER_ID_HEADER, HeaderValue::from_static("spoofed"));
        inbound.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static("1.1.1.1"));
        inbound.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, br"));

        let correlation_id = Uuid::new_v4();
        let context = OperationContext::new()
            .with_correlation_id(correlation_id)
            .with_client_ip("10.0.0.5".parse().unwrap());

        let out = outbound_headers(&inbound, "42", &context);

        assert_eq!(out.get(USER_ID_HEADER).unwrap(), "42");
        assert_eq!(out.get_all(USER_ID_HEADER).iter().count(), 1);
        assert!(out.get(header::HOST).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert!(out.get(header::CONTENT_LENGTH).is_none());
        assert_eq!(out.get(header::AUTHORIZATION).unwrap(), "Bearer t");
        assert!(out.get(header::ACCEPT_ENCODING).is_none());
        assert_eq!(out.get(FORWARDED_FOR_HEADER).unwrap(), "10.0.0.5");
        assert_eq!(out.get_all(FORWARDED_FOR_HEADER).iter().count(), 1);
        assert_eq!(
            out.get(CORRELATION_ID_HEADER).unwrap().to_str().unwrap(),
            correlation_id.to_string()
        );
    }

    #[test]
    fn test_client_forwarded_for_is_dropped_without_observed_ip() {
        let mut inbound = HeaderMap::new();
        inbound.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static("6.6.6.6"));

        let out = outbound_headers(&inbound, "42", &OperationContext::new());
        assert!(out.get(FORWARDED_FOR_HEADER).is_none());
    }

    #[test]
    fn test_inbound_headers_drop_transfer_encoding() {
        let mut backend = HeaderMap::new();
        backend.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        backend.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let headers = inbound_headers(&backend);
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
    }
}
