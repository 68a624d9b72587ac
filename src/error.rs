//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::DomainError;
use crate::store::StoreError;

/// Internal fault messages are only shown in development
static EXPOSE_INTERNAL_ERRORS: AtomicBool = AtomicBool::new(false);

/// Message returned in place of internal fault details
const GENERIC_INTERNAL_MESSAGE: &str = "An unexpected error occurred. Please try again later.";

/// Set once at startup from the configured environment
pub fn expose_internal_errors(expose: bool) {
    EXPOSE_INTERNAL_ERRORS.store(expose, Ordering::Relaxed);
}

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Transport failures towards backends or stores
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    // Server errors (5xx)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub error_code: &'static str,
    pub message: String,
}

impl AppError {
    /// HTTP status and stable error code
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),

            AppError::Domain(domain_err) => match domain_err {
                DomainError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),
                DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
                DomainError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "account_not_found"),
                DomainError::NotAccountOwner { .. } => (StatusCode::FORBIDDEN, "forbidden"),
                DomainError::AccountInactive { .. } => (StatusCode::FORBIDDEN, "account_inactive"),
                DomainError::InsufficientFunds { .. } => {
                    (StatusCode::BAD_REQUEST, "insufficient_funds")
                }
            },

            AppError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            AppError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "bad_gateway"),

            AppError::Store(StoreError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            AppError::Store(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "system_error")
            }
        }
    }

    /// True for faults whose details must not leak outside development
    fn is_internal(&self) -> bool {
        matches!(self, AppError::Store(_) | AppError::Internal(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.classify();

        let message = if self.is_internal() {
            tracing::error!(error = ?self, "Internal error");
            if EXPOSE_INTERNAL_ERRORS.load(Ordering::Relaxed) {
                self.to_string()
            } else {
                GENERIC_INTERNAL_MESSAGE.to_string()
            }
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            status: "error",
            error_code,
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_taxonomy() {
        assert_eq!(
            AppError::Unauthenticated("x".into()).classify().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Domain(DomainError::insufficient_funds(dec!(75), dec!(50))).classify(),
            (StatusCode::BAD_REQUEST, "insufficient_funds")
        );
        assert_eq!(
            AppError::Domain(DomainError::AccountNotFound("7".into())).classify().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::ServiceUnavailable("down".into()).classify().0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AppError::BadGateway("down".into()).classify().0, StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::Store(StoreError::Unavailable("pool".into())).classify().0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Internal("boom".into()).classify(),
            (StatusCode::INTERNAL_SERVER_ERROR, "system_error")
        );
    }

    #[test]
    fn test_internal_is_redacted_by_default() {
        let response = AppError::Internal("connection string leaked".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(AppError::Internal(String::new()).is_internal());
        assert!(!AppError::Forbidden(String::new()).is_internal());
    }

    #[test]
    fn test_store_faults_are_system_errors() {
        let err = AppError::from(StoreError::from(sqlx::Error::RowNotFound));
        assert_eq!(err.classify(), (StatusCode::INTERNAL_SERVER_ERROR, "system_error"));
        assert!(err.is_internal());

        let err = AppError::from(StoreError::from(sqlx::Error::PoolTimedOut));
        assert_eq!(err.classify().0, StatusCode::SERVICE_UNAVAILABLE);
    }
}
