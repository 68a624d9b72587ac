//! Account model
//!
//! Accounts as held by either backing store, plus the closed enumerations
//! both stores share.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::amount::Balance;
use super::identity::StoreKind;

/// Error raised when a stored enumeration value is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Account product type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Savings,
    Checking,
    CreditLine,
    Loan,
}

string_enum!(AccountType, "account type", {
    Savings => "savings",
    Checking => "checking",
    CreditLine => "credit_line",
    Loan => "loan",
});

/// Supported ISO currency codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "COP")]
    Cop,
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "EUR")]
    Eur,
}

string_enum!(Currency, "currency", {
    Cop => "COP",
    Usd => "USD",
    Eur => "EUR",
});

impl Default for Currency {
    fn default() -> Self {
        Self::Cop
    }
}

/// Account lifecycle status
///
/// `pending_activation -> active -> {inactive, blocked, dormant, closed}`.
/// Transitions happen outside this crate; the engine only reads the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    PendingActivation,
    Active,
    Inactive,
    Blocked,
    Dormant,
    Closed,
}

string_enum!(AccountStatus, "account status", {
    PendingActivation => "pending_activation",
    Active => "active",
    Inactive => "inactive",
    Blocked => "blocked",
    Dormant => "dormant",
    Closed => "closed",
});

impl AccountStatus {
    /// Only active accounts accept credits and debits
    pub fn can_transact(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Balance inquiries are also allowed while the account awaits activation
    pub fn can_read_balance(&self) -> bool {
        matches!(self, Self::Active | Self::PendingActivation)
    }
}

/// An account row from one store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub owner_id: String,
    pub account_number: String,
    pub account_type: AccountType,
    pub balance: Balance,
    pub currency: Currency,
    pub status: AccountStatus,
}

/// Invalid owner identifier for a given store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {store} user id: '{value}'")]
pub struct InvalidOwnerId {
    pub store: StoreKind,
    pub value: String,
}

/// Validated identifier of an account owner within a single store.
///
/// Document-store ids are 24 hex characters; relational-store ids are
/// positive 64-bit integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerId {
    store: StoreKind,
    value: String,
}

impl OwnerId {
    pub fn parse(store: StoreKind, raw: &str) -> Result<Self, InvalidOwnerId> {
        let value = raw.trim();
        let valid = match store {
            StoreKind::Document => {
                value.len() == 24 && value.chars().all(|c| c.is_ascii_hexdigit())
            }
            StoreKind::Relational => value.parse::<i64>().map(|n| n > 0).unwrap_or(false),
        };

        if !valid {
            return Err(InvalidOwnerId {
                store,
                value: raw.to_string(),
            });
        }

        Ok(Self {
            store,
            value: value.to_string(),
        })
    }

    pub fn store(&self) -> StoreKind {
        self.store
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Reference to the account an operation targets: always the caller, and
/// optionally an explicit account id taken from the route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRef {
    pub owner: OwnerId,
    pub account_id: Option<String>,
}

impl AccountRef {
    pub fn owned_by(owner: OwnerId) -> Self {
        Self {
            owner,
            account_id: None,
        }
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rules() {
        assert!(AccountStatus::Active.can_transact());
        assert!(!AccountStatus::PendingActivation.can_transact());
        assert!(AccountStatus::PendingActivation.can_read_balance());
        assert!(!AccountStatus::Blocked.can_read_balance());
        assert!(!AccountStatus::Closed.can_read_balance());
    }

    #[test]
    fn test_enum_round_trip_through_text() {
        assert_eq!("credit_line".parse::<AccountType>().unwrap(), AccountType::CreditLine);
        assert_eq!("USD".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!(AccountStatus::PendingActivation.as_str(), "pending_activation");

        let err = "frozen".parse::<AccountStatus>().unwrap_err();
        assert_eq!(err.value, "frozen");
    }

    #[test]
    fn test_owner_id_formats() {
        assert!(OwnerId::parse(StoreKind::Document, "64b7f0c2a1b2c3d4e5f60718").is_ok());
        assert!(OwnerId::parse(StoreKind::Document, "42").is_err());
        assert!(OwnerId::parse(StoreKind::Relational, "42").is_ok());
        assert!(OwnerId::parse(StoreKind::Relational, "0").is_err());
        assert!(OwnerId::parse(StoreKind::Relational, "64b7f0c2a1b2c3d4e5f60718").is_err());
    }
}
