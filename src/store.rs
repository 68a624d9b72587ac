//! Store errors
//!
//! Error type shared by every store driver (identity and account stores).
//! The split that matters to callers is "unreachable" versus everything else:
//! the identity resolver degrades on the former and fails on the latter.

use crate::domain::UnknownVariant;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached (pool exhausted, connection refused, I/O)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store answered but the query failed
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A stored row could not be mapped onto the domain model
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            other => StoreError::Database(other),
        }
    }
}

impl From<UnknownVariant> for StoreError {
    fn from(err: UnknownVariant) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_unavailable() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(!StoreError::from(sqlx::Error::RowNotFound).is_unavailable());
    }
}
