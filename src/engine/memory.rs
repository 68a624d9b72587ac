//! In-memory account store
//!
//! Backs the engine and HTTP tests.
//! A unit of work holds the whole map's lock from `begin` until commit or
//! rollback, which gives the same serialization a `FOR UPDATE` row lock does.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::{Account, Balance, OwnerId};
use crate::store::StoreError;

use super::unit_of_work::{AccountStore, RowLock, UnitOfWork};

#[derive(Debug, Clone, Default)]
pub struct MemoryAccountStore {
    accounts: Arc<Mutex<HashMap<String, Account>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, account: Account) {
        self.accounts
            .lock()
            .await
            .insert(account.account_id.clone(), account);
    }

    pub async fn get(&self, account_id: &str) -> Option<Account> {
        self.accounts.lock().await.get(account_id).cloned()
    }

    /// Simulate the store going down (or coming back)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }

        let guard = self.accounts.clone().lock_owned().await;
        Ok(Box::new(MemoryUnitOfWork {
            accounts: guard,
            staged: HashMap::new(),
        }))
    }
}

struct MemoryUnitOfWork {
    accounts: OwnedMutexGuard<HashMap<String, Account>>,
    staged: HashMap<String, Balance>,
}

impl MemoryUnitOfWork {
    fn view(&self, account: &Account) -> Account {
        let mut account = account.clone();
        if let Some(balance) = self.staged.get(&account.account_id) {
            account.balance = *balance;
        }
        account
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn find_by_id(
        &mut self,
        account_id: &str,
        _lock: RowLock,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(account_id).map(|a| self.view(a)))
    }

    async fn find_by_owner(
        &mut self,
        owner: &OwnerId,
        _lock: RowLock,
    ) -> Result<Option<Account>, StoreError> {
        // Lowest account number stands in for creation order
        Ok(self
            .accounts
            .values()
            .filter(|a| a.owner_id == owner.as_str())
            .min_by(|a, b| a.account_number.cmp(&b.account_number))
            .map(|a| self.view(a)))
    }

    async fn update_balance(
        &mut self,
        account_id: &str,
        balance: Balance,
    ) -> Result<(), StoreError> {
        if !self.accounts.contains_key(account_id) {
            return Err(StoreError::Corrupt(format!(
                "account {} disappeared during update",
                account_id
            )));
        }
        self.staged.insert(account_id.to_string(), balance);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let staged = std::mem::take(&mut self.staged);
        for (account_id, balance) in staged {
            if let Some(account) = self.accounts.get_mut(&account_id) {
                account.balance = balance;
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
