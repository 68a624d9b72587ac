//! Domain module
//!
//! Core domain types and business rules shared by the gateway and the
//! account service.

pub mod account;
pub mod amount;
pub mod context;
pub mod error;
pub mod identity;
pub mod operation;

pub use account::{
    Account, AccountRef, AccountStatus, AccountType, Currency, InvalidOwnerId, OwnerId,
    UnknownVariant,
};
pub use amount::{round_money, Amount, AmountError, Balance};
pub use context::OperationContext;
pub use error::DomainError;
pub use identity::{IdentityError, IdentityRecord, IdentityStatus, StoreKind};
pub use operation::Operation;
