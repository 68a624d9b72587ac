//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;

use super::account::AccountStatus;

/// Business rule violations raised by the account mutation engine.
///
/// These are generated close to the store and travel unmodified to the
/// caller, through the gateway if one sits in front.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Amount missing, non-numeric, zero or negative
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Malformed input other than the amount (user id, body)
    #[error("Validation error: {0}")]
    Validation(String),

    /// No account matches the resolved owner or account id
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Account exists but belongs to another owner
    #[error("Account {account_id} does not belong to user {owner_id}")]
    NotAccountOwner { account_id: String, owner_id: String },

    /// Account status forbids the operation
    #[error("Account {account_number} is not active (status: {status})")]
    AccountInactive {
        account_number: String,
        status: AccountStatus,
    },

    /// Debit larger than the available balance
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            requested,
            available,
        }
    }
}
