//! account_gateway Library
//!
//! Dual-target account gateway (identity resolution, failover dispatch,
//! cross-store reconciliation) and the store-side account service it fronts.

pub mod api;
pub mod audit;
pub mod auth;
pub mod domain;
pub mod engine;
pub mod gateway;
pub mod identity;
pub mod store;

pub mod config;
pub mod db;
mod error;
pub mod telemetry;

pub use config::{AccountServiceConfig, Config};
pub use error::{expose_internal_errors, AppError, ErrorResponse};
pub use domain::{Amount, AmountError, Balance, DomainError, IdentityRecord, OperationContext};
