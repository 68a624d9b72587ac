//! Identity stores
//!
//! Read-only lookups of a subject in each backing store. The relational
//! flavour reads `users` keyed by `auth0_id`; the document flavour reads the
//! `user_documents` JSONB table keyed by `doc->>'auth0Id'`.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::StoreKind;
use crate::store::StoreError;

/// What one store knows about a subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreProfile {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<StoreProfile>, StoreError>;
}

/// Identity lookups against a Postgres-backed store
#[derive(Debug, Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
    kind: StoreKind,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool, kind: StoreKind) -> Self {
        Self { pool, kind }
    }

    fn query(&self) -> &'static str {
        match self.kind {
            StoreKind::Relational => {
                r#"
                SELECT CAST(id AS TEXT), email, first_name, last_name
                FROM users
                WHERE auth0_id = $1
                "#
            }
            StoreKind::Document => {
                r#"
                SELECT CAST(id AS TEXT), doc->>'email', doc->>'firstName', doc->>'lastName'
                FROM user_documents
                WHERE doc->>'auth0Id' = $1
                "#
            }
        }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<StoreProfile>, StoreError> {
        let row: Option<(String, Option<String>, Option<String>, Option<String>)> =
            sqlx::query_as(self.query())
                .bind(subject)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, email, first_name, last_name)| {
            let name = [first_name, last_name]
                .into_iter()
                .flatten()
                .filter(|n| !n.trim().is_empty())
                .collect::<Vec<_>>()
                .join(" ");

            StoreProfile {
                id,
                email,
                display_name: if name.is_empty() { None } else { Some(name) },
            }
        }))
    }
}

/// In-memory identity store that can be switched offline
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityStore {
    profiles: Arc<RwLock<HashMap<String, StoreProfile>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, subject: impl Into<String>, profile: StoreProfile) {
        self.profiles.write().await.insert(subject.into(), profile);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_subject(&self, subject: &str) -> Result<Option<StoreProfile>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory identity store offline".to_string()));
        }
        Ok(self.profiles.read().await.get(subject).cloned())
    }
}
