//! Transaction Audit Log
//!
//! Every balance read, credit and debit, successful or not, leaves one record
//! in an append-only JSON-lines trail and in the `audit` tracing target.
//! Writing the trail is best-effort: a failed write is reported once as a
//! warning and never fails the operation being audited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::{Amount, Currency, DomainError, Operation, OperationContext};

// =========================================================================
// Audit record
// =========================================================================

/// Outcome of an audited operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    ValidationError,
    AccountNotFound,
    Forbidden,
    AccountInactive,
    InsufficientFunds,
    SystemError,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "SUCCESS",
            AuditOutcome::ValidationError => "VALIDATION_ERROR",
            AuditOutcome::AccountNotFound => "ACCOUNT_NOT_FOUND",
            AuditOutcome::Forbidden => "FORBIDDEN",
            AuditOutcome::AccountInactive => "ACCOUNT_INACTIVE",
            AuditOutcome::InsufficientFunds => "INSUFFICIENT_FUNDS",
            AuditOutcome::SystemError => "SYSTEM_ERROR",
        }
    }
}

impl From<&DomainError> for AuditOutcome {
    fn from(err: &DomainError) -> Self {
        match err {
            DomainError::InvalidAmount(_) | DomainError::Validation(_) => Self::ValidationError,
            DomainError::AccountNotFound(_) => Self::AccountNotFound,
            DomainError::NotAccountOwner { .. } => Self::Forbidden,
            DomainError::AccountInactive { .. } => Self::AccountInactive,
            DomainError::InsufficientFunds { .. } => Self::InsufficientFunds,
        }
    }
}

/// One line of the audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub operation: Operation,
    pub account_id: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<Currency>,
    pub status: AuditOutcome,
    pub client_ip: String,
    pub message: String,
}

/// Builder for audit records, filled in as an operation progresses
#[derive(Debug, Clone)]
pub struct AuditRecordBuilder {
    operation: Operation,
    user_id: String,
    client_ip: String,
    account_id: Option<String>,
    amount: Option<String>,
    currency: Option<Currency>,
}

impl AuditRecordBuilder {
    pub fn new(operation: Operation, user_id: &str, context: &OperationContext) -> Self {
        Self {
            operation,
            user_id: if user_id.is_empty() { "N/A".to_string() } else { user_id.to_string() },
            client_ip: context.client_ip_label(),
            account_id: None,
            amount: None,
            currency: None,
        }
    }

    pub fn account_id(mut self, account_id: &str) -> Self {
        self.account_id = Some(account_id.to_string());
        self
    }

    pub fn currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }

    pub fn amount(mut self, amount: &Amount) -> Self {
        self.amount = Some(amount.to_string());
        self
    }

    /// Record the raw amount as received when it failed validation
    pub fn raw_amount(mut self, raw: impl Into<String>) -> Self {
        self.amount = Some(raw.into());
        self
    }

    pub fn finish(&self, status: AuditOutcome, message: impl Into<String>) -> AuditRecord {
        AuditRecord {
            timestamp: Utc::now(),
            user_id: self.user_id.clone(),
            operation: self.operation,
            account_id: self.account_id.clone(),
            amount: self.amount.clone(),
            currency: self.currency,
            status,
            client_ip: self.client_ip.clone(),
            message: message.into(),
        }
    }
}

// =========================================================================
// Audit log sink
// =========================================================================

/// Append-only audit trail
#[derive(Debug)]
pub struct TransactionAuditLog {
    path: Option<PathBuf>,
    // Serializes appends so concurrent records never interleave
    write_lock: Mutex<()>,
}

impl TransactionAuditLog {
    /// Audit trail written to `path`
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            write_lock: Mutex::new(()),
        }
    }

    /// Audit records only go to the tracing output
    pub fn tracing_only() -> Self {
        Self {
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record an entry. Never fails.
    pub async fn log(&self, record: AuditRecord) {
        tracing::info!(
            target: "audit",
            user_id = %record.user_id,
            operation = %record.operation,
            account_id = ?record.account_id,
            amount = ?record.amount,
            status = record.status.as_str(),
            client_ip = %record.client_ip,
            "{}",
            record.message
        );

        if let Err(e) = self.append(&record).await {
            tracing::warn!(
                target: "audit",
                error = %e,
                operation = %record.operation,
                "Failed to write audit record"
            );
        }
    }

    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

/// Audit log error types
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
