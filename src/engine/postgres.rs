//! PostgreSQL account store
//!
//! Works against either store's `accounts` table. Ids are compared as text so
//! the same queries serve the document schema (hex string ids) and the
//! relational schema (BIGINT ids).

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{Account, Balance, OwnerId};
use crate::store::StoreError;

use super::unit_of_work::{AccountStore, RowLock, UnitOfWork};

const SELECT_ACCOUNT: &str = r#"
    SELECT CAST(id AS TEXT), CAST(user_id AS TEXT), account_number,
           account_type, balance, currency, status
    FROM accounts
"#;

type AccountRow = (String, String, String, String, Decimal, String, String);

fn lock_clause(lock: RowLock) -> &'static str {
    match lock {
        RowLock::None => "",
        RowLock::ForUpdate => " FOR UPDATE",
    }
}

fn into_account(row: AccountRow) -> Result<Account, StoreError> {
    let (account_id, owner_id, account_number, account_type, balance, currency, status) = row;

    Ok(Account {
        account_id,
        owner_id,
        account_number,
        account_type: account_type.parse()?,
        balance: Balance::from_stored(balance),
        currency: currency.parse()?,
        status: status.parse()?,
    })
}

/// Account store backed by a Postgres pool
#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// One database transaction
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn find_by_id(
        &mut self,
        account_id: &str,
        lock: RowLock,
    ) -> Result<Option<Account>, StoreError> {
        let query = format!(
            "{} WHERE CAST(id AS TEXT) = $1{}",
            SELECT_ACCOUNT,
            lock_clause(lock)
        );

        let row: Option<AccountRow> = sqlx::query_as(&query)
            .bind(account_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(into_account).transpose()
    }

    async fn find_by_owner(
        &mut self,
        owner: &OwnerId,
        lock: RowLock,
    ) -> Result<Option<Account>, StoreError> {
        let query = format!(
            "{} WHERE CAST(user_id AS TEXT) = $1 ORDER BY created_at ASC LIMIT 1{}",
            SELECT_ACCOUNT,
            lock_clause(lock)
        );

        let row: Option<AccountRow> = sqlx::query_as(&query)
            .bind(owner.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(into_account).transpose()
    }

    async fn update_balance(
        &mut self,
        account_id: &str,
        balance: Balance,
    ) -> Result<(), StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $2, updated_at = NOW()
            WHERE CAST(id AS TEXT) = $1
            "#,
        )
        .bind(account_id)
        .bind(balance.value())
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::Corrupt(format!(
                "account {} disappeared during update",
                account_id
            )));
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
