//! Unit of Work
//!
//! Minimal transaction capability the mutation engine needs from an account
//! store: begin, read (optionally locking the row), write the balance, then
//! commit or roll back. Any store with row-level atomicity can implement it.

use async_trait::async_trait;

use crate::domain::{Account, Balance, OwnerId};
use crate::store::StoreError;

/// Row locking mode for reads inside a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    /// Plain read
    None,
    /// Hold the row until commit/rollback; concurrent writers serialize
    ForUpdate,
}

/// An account store able to open units of work
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

/// A scoped boundary: either every write in it applies or none does.
///
/// Dropping a unit of work without committing discards its writes.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_by_id(&mut self, account_id: &str, lock: RowLock)
        -> Result<Option<Account>, StoreError>;

    /// The owner's account; when an owner holds several, the oldest one
    async fn find_by_owner(&mut self, owner: &OwnerId, lock: RowLock)
        -> Result<Option<Account>, StoreError>;

    async fn update_balance(
        &mut self,
        account_id: &str,
        balance: Balance,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
