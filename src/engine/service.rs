//! Account Mutation Engine
//!
//! Balance reads, credits and debits against one store. Each mutation runs in
//! a single unit of work with the account row locked, so concurrent debits of
//! the same account serialize and the balance can never go negative.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditOutcome, AuditRecordBuilder, TransactionAuditLog};
use crate::domain::{
    Account, AccountRef, AccountStatus, AccountType, Amount, Balance, Currency, DomainError,
    Operation, OperationContext, OwnerId, StoreKind,
};
use crate::error::AppError;
use crate::store::StoreError;

use super::unit_of_work::{AccountStore, RowLock, UnitOfWork};

/// Caller and optional explicit account, as received by the account service
#[derive(Debug, Clone, Copy)]
pub struct AccountTarget<'a> {
    pub user_id: &'a str,
    pub account_id: Option<&'a str>,
}

impl<'a> AccountTarget<'a> {
    pub fn new(user_id: &'a str, account_id: Option<&'a str>) -> Self {
        Self { user_id, account_id }
    }
}

/// Balance inquiry result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub account_id: String,
    pub account_number: String,
    pub account_type: AccountType,
    pub balance: String,
    pub currency: Currency,
    pub status: AccountStatus,
}

impl From<&Account> for BalanceView {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.account_id.clone(),
            account_number: account.account_number.clone(),
            account_type: account.account_type,
            balance: account.balance.to_string(),
            currency: account.currency,
            status: account.status,
        }
    }
}

/// Result of a successful credit or debit
#[derive(Debug, Clone)]
pub struct TransactionReceipt {
    pub operation: Operation,
    pub transaction_id: String,
    pub account_id: String,
    pub account_number: String,
    pub amount: Amount,
    pub new_balance: Balance,
    pub currency: Currency,
    pub timestamp: DateTime<Utc>,
}

impl TransactionReceipt {
    pub fn message(&self) -> &'static str {
        match self.operation {
            Operation::Withdrawal => "Withdrawal successful",
            _ => "Deposit successful",
        }
    }

    /// Wire form of the receipt (camelCase, money as two-decimal strings)
    pub fn to_json(&self) -> Value {
        let mut data = serde_json::json!({
            "message": self.message(),
            "accountId": self.account_id,
            "accountNumber": self.account_number,
            "newBalance": self.new_balance.to_string(),
            "currency": self.currency,
            "transactionId": self.transaction_id,
            "transactionTimestamp": self.timestamp,
        });

        let amount_field = match self.operation {
            Operation::Withdrawal => "amountWithdrawn",
            _ => "amountDeposited",
        };
        data[amount_field] = Value::String(self.amount.to_string());
        data
    }
}

/// Engine failures: business rule violations or store faults
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Domain(e) => AppError::Domain(e),
            EngineError::Store(e) => AppError::Store(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Credit,
    Debit,
}

impl Direction {
    fn operation(&self) -> Operation {
        match self {
            Direction::Credit => Operation::Deposit,
            Direction::Debit => Operation::Withdrawal,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Direction::Credit => "dep",
            Direction::Debit => "wdr",
        }
    }
}

/// Account mutation engine bound to one store
pub struct AccountMutationEngine {
    store: Arc<dyn AccountStore>,
    audit: Arc<TransactionAuditLog>,
    store_kind: StoreKind,
}

impl AccountMutationEngine {
    pub fn new(
        store: Arc<dyn AccountStore>,
        audit: Arc<TransactionAuditLog>,
        store_kind: StoreKind,
    ) -> Self {
        Self {
            store,
            audit,
            store_kind,
        }
    }

    pub fn store_kind(&self) -> StoreKind {
        self.store_kind
    }

    /// Read the balance of the caller's account
    pub async fn read_balance(
        &self,
        target: AccountTarget<'_>,
        context: &OperationContext,
    ) -> Result<BalanceView, EngineError> {
        let mut audit = AuditRecordBuilder::new(Operation::BalanceRead, target.user_id, context);
        if let Some(account_id) = target.account_id {
            audit = audit.account_id(account_id);
        }

        let account_ref = match self.account_ref(&target) {
            Ok(account_ref) => account_ref,
            Err(e) => return Err(self.reject(&audit, e).await),
        };

        let mut uow = match self.store.begin().await {
            Ok(uow) => uow,
            Err(e) => return Err(self.fail(&audit, e).await),
        };

        let located = locate(uow.as_mut(), &account_ref, RowLock::None).await;
        if let Err(e) = uow.rollback().await {
            tracing::warn!(error = %e, "Failed to close read-only unit of work");
        }

        let account = match located {
            Ok(account) => account,
            Err(EngineError::Domain(e)) => return Err(self.reject(&audit, e).await),
            Err(EngineError::Store(e)) => return Err(self.fail(&audit, e).await),
        };

        audit = audit.account_id(&account.account_id).currency(account.currency);

        if !account.status.can_read_balance() {
            let err = DomainError::AccountInactive {
                account_number: account.account_number.clone(),
                status: account.status,
            };
            return Err(self.reject(&audit, err).await);
        }

        self.audit
            .log(audit.finish(
                AuditOutcome::Success,
                format!(
                    "Balance of account {} read by user {}",
                    account.account_number, account_ref.owner
                ),
            ))
            .await;

        Ok(BalanceView::from(&account))
    }

    /// Add `amount` to the caller's account
    pub async fn credit(
        &self,
        target: AccountTarget<'_>,
        amount: &Value,
        context: &OperationContext,
    ) -> Result<TransactionReceipt, EngineError> {
        self.mutate(Direction::Credit, target, amount, context).await
    }

    /// Subtract `amount` from the caller's account
    pub async fn debit(
        &self,
        target: AccountTarget<'_>,
        amount: &Value,
        context: &OperationContext,
    ) -> Result<TransactionReceipt, EngineError> {
        self.mutate(Direction::Debit, target, amount, context).await
    }

    async fn mutate(
        &self,
        direction: Direction,
        target: AccountTarget<'_>,
        raw_amount: &Value,
        context: &OperationContext,
    ) -> Result<TransactionReceipt, EngineError> {
        let mut audit = AuditRecordBuilder::new(direction.operation(), target.user_id, context);
        if let Some(account_id) = target.account_id {
            audit = audit.account_id(account_id);
        }

        let account_ref = match self.account_ref(&target) {
            Ok(account_ref) => account_ref,
            Err(e) => return Err(self.reject(&audit, e).await),
        };

        let amount = match Amount::from_json(raw_amount) {
            Ok(amount) => amount,
            Err(e) => {
                let audit = audit.raw_amount(raw_amount.to_string());
                return Err(self.reject(&audit, DomainError::InvalidAmount(e.to_string())).await);
            }
        };
        audit = audit.amount(&amount);

        let mut uow = match self.store.begin().await {
            Ok(uow) => uow,
            Err(e) => return Err(self.fail(&audit, e).await),
        };

        let applied = self
            .apply(uow.as_mut(), direction, &account_ref, &amount)
            .await;

        let (account, receipt) = match applied {
            Ok(done) => done,
            Err(err) => {
                if let Err(e) = uow.rollback().await {
                    tracing::warn!(error = %e, "Rollback failed");
                }
                return Err(match err {
                    AppliedError::Domain(e, account) => {
                        let audit = note_account(audit, account.as_ref());
                        self.reject(&audit, e).await
                    }
                    AppliedError::Store(e, account) => {
                        let audit = note_account(audit, account.as_ref());
                        self.fail(&audit, e).await
                    }
                });
            }
        };

        audit = note_account(audit, Some(&account));

        if let Err(e) = uow.commit().await {
            return Err(self.fail(&audit, e).await);
        }

        self.audit
            .log(audit.finish(
                AuditOutcome::Success,
                format!(
                    "{} of {} {} on account {} by user {} succeeded. New balance: {}",
                    direction.operation(),
                    amount,
                    receipt.currency,
                    account.account_number,
                    account_ref.owner,
                    receipt.new_balance
                ),
            ))
            .await;

        tracing::info!(
            operation = %direction.operation(),
            account_id = %receipt.account_id,
            transaction_id = %receipt.transaction_id,
            "Balance updated"
        );

        Ok(receipt)
    }

    /// Locked read, rule checks, write. Runs inside `uow`.
    async fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        direction: Direction,
        account_ref: &AccountRef,
        amount: &Amount,
    ) -> Result<(Account, TransactionReceipt), AppliedError> {
        let account = locate(uow, account_ref, RowLock::ForUpdate)
            .await
            .map_err(|e| AppliedError::from_engine(e, None))?;

        if !account.status.can_transact() {
            let err = DomainError::AccountInactive {
                account_number: account.account_number.clone(),
                status: account.status,
            };
            return Err(AppliedError::Domain(err, Some(account)));
        }

        let new_balance = match direction {
            Direction::Credit => account.balance.credit(amount),
            Direction::Debit => {
                let insufficient =
                    || DomainError::insufficient_funds(amount.value(), account.balance.value());
                if !account.balance.is_sufficient_for(amount) {
                    return Err(AppliedError::Domain(insufficient(), Some(account.clone())));
                }
                match account.balance.debit(amount) {
                    Ok(balance) => balance,
                    Err(_) => {
                        return Err(AppliedError::Domain(insufficient(), Some(account.clone())))
                    }
                }
            }
        };

        if let Err(e) = uow.update_balance(&account.account_id, new_balance).await {
            return Err(AppliedError::Store(e, Some(account)));
        }

        let timestamp = Utc::now();
        let receipt = TransactionReceipt {
            operation: direction.operation(),
            transaction_id: self.transaction_id(direction),
            account_id: account.account_id.clone(),
            account_number: account.account_number.clone(),
            amount: *amount,
            new_balance,
            currency: account.currency,
            timestamp,
        };

        Ok((account, receipt))
    }

    fn account_ref(&self, target: &AccountTarget<'_>) -> Result<AccountRef, DomainError> {
        if target.user_id.trim().is_empty() {
            return Err(DomainError::Validation("User ID is required".to_string()));
        }

        let owner = OwnerId::parse(self.store_kind, target.user_id)
            .map_err(|e| DomainError::Validation(e.to_string()))?;

        let account_ref = AccountRef::owned_by(owner);
        Ok(match target.account_id {
            Some(account_id) if !account_id.trim().is_empty() => {
                account_ref.with_account_id(account_id.trim())
            }
            _ => account_ref,
        })
    }

    fn transaction_id(&self, direction: Direction) -> String {
        let prefix = match self.store_kind {
            StoreKind::Document => "doc",
            StoreKind::Relational => "pg",
        };
        format!("{}_txn_{}_{}", prefix, direction.tag(), Uuid::new_v4().simple())
    }

    async fn reject(&self, audit: &AuditRecordBuilder, err: DomainError) -> EngineError {
        self.audit
            .log(audit.finish(AuditOutcome::from(&err), err.to_string()))
            .await;
        EngineError::Domain(err)
    }

    async fn fail(&self, audit: &AuditRecordBuilder, err: StoreError) -> EngineError {
        tracing::error!(error = %err, store = %self.store_kind, "Account store failure");
        self.audit
            .log(audit.finish(AuditOutcome::SystemError, err.to_string()))
            .await;
        EngineError::Store(err)
    }
}

/// Failure inside a unit of work, with the account if it had been loaded
enum AppliedError {
    Domain(DomainError, Option<Account>),
    Store(StoreError, Option<Account>),
}

impl AppliedError {
    fn from_engine(err: EngineError, account: Option<Account>) -> Self {
        match err {
            EngineError::Domain(e) => AppliedError::Domain(e, account),
            EngineError::Store(e) => AppliedError::Store(e, account),
        }
    }
}

fn note_account(audit: AuditRecordBuilder, account: Option<&Account>) -> AuditRecordBuilder {
    match account {
        Some(account) => audit.account_id(&account.account_id).currency(account.currency),
        None => audit,
    }
}

/// Find the referenced account and check ownership
async fn locate(
    uow: &mut dyn UnitOfWork,
    account_ref: &AccountRef,
    lock: RowLock,
) -> Result<Account, EngineError> {
    let owner = &account_ref.owner;

    match &account_ref.account_id {
        Some(account_id) => {
            let account = uow
                .find_by_id(account_id, lock)
                .await?
                .ok_or_else(|| DomainError::AccountNotFound(account_id.clone()))?;

            if account.owner_id != owner.as_str() {
                return Err(DomainError::NotAccountOwner {
                    account_id: account_id.clone(),
                    owner_id: owner.to_string(),
                }
                .into());
            }
            Ok(account)
        }
        None => Ok(uow
            .find_by_owner(owner, lock)
            .await?
            .ok_or_else(|| {
                DomainError::AccountNotFound(format!("no account for user {}", owner))
            })?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryAccountStore;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn account(balance: rust_decimal::Decimal, status: AccountStatus) -> Account {
        Account {
            account_id: "7".to_string(),
            owner_id: "42".to_string(),
            account_number: "ACC-0007".to_string(),
            account_type: AccountType::Savings,
            balance: Balance::new(balance).unwrap(),
            currency: Currency::Usd,
            status,
        }
    }

    async fn engine_with(account: Account) -> (AccountMutationEngine, MemoryAccountStore) {
        let store = MemoryAccountStore::new();
        store.insert(account).await;
        let engine = AccountMutationEngine::new(
            Arc::new(store.clone()),
            Arc::new(TransactionAuditLog::tracing_only()),
            StoreKind::Relational,
        );
        (engine, store)
    }

    #[tokio::test]
    async fn test_receipt_wire_form() {
        let (engine, _) = engine_with(account(dec!(100), AccountStatus::Active)).await;
        let receipt = engine
            .credit(AccountTarget::new("42", None), &json!(50.75), &OperationContext::new())
            .await
            .unwrap();

        let data = receipt.to_json();
        assert_eq!(data["newBalance"], "150.75");
        assert_eq!(data["amountDeposited"], "50.75");
        assert_eq!(data["currency"], "USD");
        assert!(data["transactionId"].as_str().unwrap().starts_with("pg_txn_dep_"));
        assert!(data.get("amountWithdrawn").is_none());
    }

    #[tokio::test]
    async fn test_pending_account_can_read_but_not_transact() {
        let (engine, _) = engine_with(account(dec!(10), AccountStatus::PendingActivation)).await;
        let ctx = OperationContext::new();

        let view = engine
            .read_balance(AccountTarget::new("42", Some("7")), &ctx)
            .await
            .unwrap();
        assert_eq!(view.balance, "10.00");

        let err = engine
            .debit(AccountTarget::new("42", None), &json!(1), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(DomainError::AccountInactive { .. })
        ));
    }

    #[tokio::test]
    async fn test_owner_id_must_match_store_format() {
        let (engine, _) = engine_with(account(dec!(10), AccountStatus::Active)).await;
        let err = engine
            .read_balance(
                AccountTarget::new("65a1b2c3d4e5f6a7b8c9d0e1", None),
                &OperationContext::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_store_outage_is_a_store_error() {
        let (engine, store) = engine_with(account(dec!(10), AccountStatus::Active)).await;
        store.set_unavailable(true);
        let err = engine
            .credit(AccountTarget::new("42", None), &json!("5"), &OperationContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::Unavailable(_))));
    }
}
