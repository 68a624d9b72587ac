//! Account Mutation Engine module
//!
//! Store-side balance reads, credits and debits behind a Unit of Work seam.

mod memory;
mod postgres;
mod service;
mod unit_of_work;

pub use memory::MemoryAccountStore;
pub use postgres::PgAccountStore;
pub use service::{
    AccountMutationEngine, AccountTarget, BalanceView, EngineError, TransactionReceipt,
};
pub use unit_of_work::{AccountStore, RowLock, UnitOfWork};
