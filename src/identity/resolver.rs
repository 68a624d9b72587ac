//! Identity Resolver
//!
//! Maps a verified subject onto its per-store ids. Never writes: a subject
//! unknown to both stores is refused rather than provisioned.

use std::sync::Arc;

use crate::auth::TokenClaims;
use crate::domain::{IdentityError, IdentityRecord, StoreKind};
use crate::error::AppError;

use super::store::IdentityStore;

pub struct IdentityResolver {
    relational: Arc<dyn IdentityStore>,
    document: Arc<dyn IdentityStore>,
}

impl IdentityResolver {
    pub fn new(relational: Arc<dyn IdentityStore>, document: Arc<dyn IdentityStore>) -> Self {
        Self {
            relational,
            document,
        }
    }

    /// Resolve `subject` against both stores, relational first.
    ///
    /// One unreachable store degrades to the other; both unreachable is a 503.
    pub async fn resolve(
        &self,
        subject: &str,
        claims: &TokenClaims,
    ) -> Result<IdentityRecord, AppError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(AppError::Unauthenticated("Token has no subject".to_string()));
        }

        let mut builder = IdentityRecord::builder(subject);
        let mut reachable = 0usize;

        let stores = [
            (StoreKind::Relational, &self.relational),
            (StoreKind::Document, &self.document),
        ];

        for (kind, store) in stores {
            match store.find_by_subject(subject).await {
                Ok(Some(profile)) => {
                    reachable += 1;
                    builder = builder
                        .store_id(kind, profile.id)
                        .map_err(|e| AppError::Internal(e.to_string()))?
                        .email(profile.email)
                        .display_name(profile.display_name);
                }
                Ok(None) => {
                    reachable += 1;
                    tracing::debug!(
                        subject = %subject,
                        store = %kind,
                        "Subject not present in store"
                    );
                }
                Err(e) if e.is_unavailable() => {
                    tracing::warn!(
                        subject = %subject,
                        store = %kind,
                        error = %e,
                        "Identity store unreachable, continuing with the other store"
                    );
                }
                Err(e) => return Err(AppError::Store(e)),
            }
        }

        if reachable == 0 {
            return Err(AppError::ServiceUnavailable(
                "No identity store is reachable".to_string(),
            ));
        }

        let record = builder
            .email(claims.email.clone())
            .display_name(claims.display_name())
            .build()
            .map_err(|e| match e {
                IdentityError::EmptySubject => AppError::Unauthenticated(e.to_string()),
                IdentityError::NoStoreId(_) => {
                    AppError::Forbidden("User is not provisioned in any account store".to_string())
                }
                IdentityError::Reassignment { .. } => AppError::Internal(e.to_string()),
            })?;

        tracing::debug!(
            subject = %record.subject(),
            status = ?record.status(),
            sources = ?record.sources_found(),
            "Identity resolved"
        );

        Ok(record)
    }
}
