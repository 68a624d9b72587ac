//! Operations routed through the gateway

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction type as carried by reconciliation events and audit records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    BalanceRead,
    Deposit,
    Withdrawal,
}

impl Operation {
    pub const ALL: [Operation; 3] = [
        Operation::BalanceRead,
        Operation::Deposit,
        Operation::Withdrawal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::BalanceRead => "BALANCE_READ",
            Operation::Deposit => "DEPOSIT",
            Operation::Withdrawal => "WITHDRAWAL",
        }
    }

    /// Short name used for routes and configuration keys
    pub fn route_name(&self) -> &'static str {
        match self {
            Operation::BalanceRead => "balance",
            Operation::Deposit => "deposit",
            Operation::Withdrawal => "withdraw",
        }
    }

    /// Only state-changing operations are reconciled
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Operation::BalanceRead)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_names() {
        assert_eq!(serde_json::to_value(Operation::BalanceRead).unwrap(), "BALANCE_READ");
        assert_eq!(serde_json::to_value(Operation::Withdrawal).unwrap(), "WITHDRAWAL");
    }

    #[test]
    fn test_mutating() {
        assert!(!Operation::BalanceRead.is_mutating());
        assert!(Operation::Deposit.is_mutating());
        assert!(Operation::Withdrawal.is_mutating());
    }
}
