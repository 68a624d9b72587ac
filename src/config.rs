//! Configuration module
//!
//! Loads configuration from environment variables. Every required value is
//! checked at startup; a missing or malformed value aborts the process.

use reqwest::Url;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::{Currency, Operation, StoreKind};
use crate::gateway::targets::{OperationTargets, PathRewrite, ServiceTargets, TargetEndpoint};

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Other,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Self::Development,
            "production" | "prod" => Self::Production,
            _ => Self::Other,
        }
    }
}

/// Token issuer parameters
#[derive(Debug, Clone)]
pub struct JwtSettings {
    /// HS256 shared secret
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    /// Prefix for namespaced profile claims (e.g. `https://claims.example.com/`)
    pub claim_namespace: Option<String>,
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production); production unless set
    pub environment: Environment,

    /// Relational identity store connection URL
    pub relational_database_url: String,

    /// Document identity store connection URL
    pub document_database_url: String,

    /// Maximum connections per store pool
    pub database_max_connections: u32,

    pub jwt: JwtSettings,

    /// Primary/fallback routing table
    pub targets: ServiceTargets,

    /// Base URL of the reconciliation service
    pub sync_service_url: Url,

    /// Timeout for each backend attempt
    pub backend_timeout: Duration,

    /// Timeout for the fire-and-forget reconciliation call
    pub reconciliation_timeout: Duration,

    /// Largest backend response buffered for reconciliation
    pub max_buffered_body_bytes: usize,

    /// Largest inbound request body accepted
    pub max_request_body_bytes: usize,

    /// Currency used in events when neither response nor request names one
    pub default_currency: Currency,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(&lookup, "PORT", 3000)?;
        let environment =
            Environment::parse(&lookup("ENVIRONMENT").unwrap_or_else(|| "production".to_string()));

        let relational_database_url = required(&lookup, "RELATIONAL_DATABASE_URL")?;
        let document_database_url = required(&lookup, "DOCUMENT_DATABASE_URL")?;
        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;

        let jwt = JwtSettings {
            secret: required(&lookup, "JWT_SECRET")?,
            issuer: required(&lookup, "JWT_ISSUER")?,
            audience: required(&lookup, "JWT_AUDIENCE")?,
            claim_namespace: lookup("JWT_CLAIM_NAMESPACE").filter(|v| !v.trim().is_empty()),
        };

        let targets = ServiceTargets {
            balance: operation_targets(&lookup, Operation::BalanceRead)?,
            deposit: operation_targets(&lookup, Operation::Deposit)?,
            withdrawal: operation_targets(&lookup, Operation::Withdrawal)?,
        };

        let sync_service_url = required_url(&lookup, "SYNC_SERVICE_URL")?;

        let backend_timeout =
            Duration::from_millis(parse_or(&lookup, "BACKEND_TIMEOUT_MS", 10_000)?);
        let reconciliation_timeout =
            Duration::from_millis(parse_or(&lookup, "RECONCILIATION_TIMEOUT_MS", 5_000)?);

        let max_buffered_body_bytes = parse_or(&lookup, "MAX_BUFFERED_BODY_BYTES", 1024 * 1024)?;
        let max_request_body_bytes = parse_or(&lookup, "MAX_REQUEST_BODY_BYTES", 64 * 1024)?;

        let default_currency = match lookup("DEFAULT_CURRENCY") {
            Some(code) => code
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DEFAULT_CURRENCY".to_string()))?,
            None => Currency::default(),
        };

        Ok(Self {
            host,
            port,
            environment,
            relational_database_url,
            document_database_url,
            database_max_connections,
            jwt,
            targets,
            sync_service_url,
            backend_timeout,
            reconciliation_timeout,
            max_buffered_body_bytes,
            max_request_body_bytes,
            default_currency,
        })
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

/// Account service (backend) configuration
#[derive(Debug, Clone)]
pub struct AccountServiceConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,

    /// Which store this instance serves; decides the owner id format
    pub store_kind: StoreKind,

    /// Account store connection URL
    pub database_url: String,

    pub database_max_connections: u32,

    /// Append-only audit trail; `None` keeps audit records in the tracing output only
    pub audit_log_path: Option<PathBuf>,
}

impl AccountServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(&lookup, "PORT", 3001)?;
        let environment =
            Environment::parse(&lookup("ENVIRONMENT").unwrap_or_else(|| "production".to_string()));

        let store_kind = required(&lookup, "ACCOUNT_STORE_KIND")?
            .parse()
            .map_err(|_| ConfigError::InvalidValue("ACCOUNT_STORE_KIND".to_string()))?;

        let database_url = required(&lookup, "ACCOUNT_STORE_URL")?;
        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;
        let audit_log_path = lookup("AUDIT_LOG_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            host,
            port,
            environment,
            store_kind,
            database_url,
            database_max_connections,
            audit_log_path,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn required_url<F>(lookup: &F, key: &str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = required(lookup, key)?;
    let url = Url::parse(raw.trim()).map_err(|_| ConfigError::InvalidValue(key.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue(key.to_string()));
    }

    Ok(url)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn operation_targets<F>(lookup: &F, operation: Operation) -> Result<OperationTargets, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = operation.route_name().to_ascii_uppercase();

    let endpoint = |role: &str| -> Result<TargetEndpoint, ConfigError> {
        let url_key = format!("{}_{}_URL", prefix, role);
        let rewrite_key = format!("{}_{}_REWRITE", prefix, role);

        let base_url = required_url(lookup, &url_key)?;
        let rewrite = match lookup(&rewrite_key) {
            Some(rule) => PathRewrite::parse(&rule)
                .map_err(|_| ConfigError::InvalidValue(rewrite_key.clone()))?,
            None => PathRewrite::default_for(operation),
        };

        Ok(TargetEndpoint::new(base_url, rewrite))
    };

    Ok(OperationTargets {
        primary: endpoint("PRIMARY")?,
        fallback: endpoint("FALLBACK")?,
    })
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}
