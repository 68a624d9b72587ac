//! Identity Record
//!
//! Unified view of one external principal across both account stores.
//! Records are assembled once per request by the identity resolver and are
//! immutable afterwards; handlers receive them by value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The two independently maintained account stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Document,
    Relational,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Document => "document",
            StoreKind::Relational => "relational",
        }
    }

    /// The store on the other side of a reconciliation
    pub fn other(&self) -> StoreKind {
        match self {
            StoreKind::Document => StoreKind::Relational,
            StoreKind::Relational => StoreKind::Document,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" => Ok(StoreKind::Document),
            "relational" => Ok(StoreKind::Relational),
            other => Err(format!("unknown store kind '{}'", other)),
        }
    }
}

/// Identity status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    /// Known to only one store so far
    Pending,
    /// Known to both stores
    Active,
}

/// Errors raised while assembling an identity record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("Subject must not be empty")]
    EmptySubject,

    #[error("{store} id already set to '{existing}', refusing to reassign to '{attempted}'")]
    Reassignment {
        store: StoreKind,
        existing: String,
        attempted: String,
    },

    #[error("Identity '{0}' has no id in any store")]
    NoStoreId(String),
}

/// Immutable identity record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    subject: String,
    document_store_id: Option<String>,
    relational_store_id: Option<String>,
    sources_found: BTreeSet<StoreKind>,
    status: IdentityStatus,
    email: Option<String>,
    display_name: Option<String>,
}

impl IdentityRecord {
    /// Start assembling a record for `subject`
    pub fn builder(subject: impl Into<String>) -> IdentityRecordBuilder {
        IdentityRecordBuilder {
            subject: subject.into(),
            document_store_id: None,
            relational_store_id: None,
            email: None,
            display_name: None,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn document_store_id(&self) -> Option<&str> {
        self.document_store_id.as_deref()
    }

    pub fn relational_store_id(&self) -> Option<&str> {
        self.relational_store_id.as_deref()
    }

    /// Identifier of this identity within `store`
    pub fn store_id(&self, store: StoreKind) -> Option<&str> {
        match store {
            StoreKind::Document => self.document_store_id(),
            StoreKind::Relational => self.relational_store_id(),
        }
    }

    pub fn sources_found(&self) -> &BTreeSet<StoreKind> {
        &self.sources_found
    }

    pub fn status(&self) -> IdentityStatus {
        self.status
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}

/// Builder enforcing the set-once rule for store ids
#[derive(Debug, Clone)]
pub struct IdentityRecordBuilder {
    subject: String,
    document_store_id: Option<String>,
    relational_store_id: Option<String>,
    email: Option<String>,
    display_name: Option<String>,
}

impl IdentityRecordBuilder {
    /// Record the id found in `store`. Setting the same value twice is a no-op;
    /// a different value is rejected.
    pub fn store_id(
        mut self,
        store: StoreKind,
        id: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let id = id.into();
        let slot = match store {
            StoreKind::Document => &mut self.document_store_id,
            StoreKind::Relational => &mut self.relational_store_id,
        };

        if let Some(existing) = slot.as_ref() {
            if *existing != id {
                return Err(IdentityError::Reassignment {
                    store,
                    existing: existing.clone(),
                    attempted: id,
                });
            }
        } else {
            *slot = Some(id);
        }

        Ok(self)
    }

    /// First non-empty email wins
    pub fn email(mut self, email: Option<String>) -> Self {
        if self.email.is_none() {
            self.email = email.filter(|e| !e.trim().is_empty());
        }
        self
    }

    /// First non-empty display name wins
    pub fn display_name(mut self, name: Option<String>) -> Self {
        if self.display_name.is_none() {
            self.display_name = name.filter(|n| !n.trim().is_empty());
        }
        self
    }

    /// Finish the record. Fails unless at least one store id is present.
    pub fn build(self) -> Result<IdentityRecord, IdentityError> {
        if self.subject.trim().is_empty() {
            return Err(IdentityError::EmptySubject);
        }

        let mut sources_found = BTreeSet::new();
        if self.document_store_id.is_some() {
            sources_found.insert(StoreKind::Document);
        }
        if self.relational_store_id.is_some() {
            sources_found.insert(StoreKind::Relational);
        }

        let status = match sources_found.len() {
            0 => return Err(IdentityError::NoStoreId(self.subject)),
            1 => IdentityStatus::Pending,
            _ => IdentityStatus::Active,
        };

        Ok(IdentityRecord {
            subject: self.subject,
            document_store_id: self.document_store_id,
            relational_store_id: self.relational_store_id,
            sources_found,
            status,
            email: self.email,
            display_name: self.display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_both_ids_is_active() {
        let record = IdentityRecord::builder("auth0|abc")
            .store_id(StoreKind::Relational, "7")
            .unwrap()
            .store_id(StoreKind::Document, "64b7f0c2a1b2c3d4e5f60718")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(record.status(), IdentityStatus::Active);
        assert_eq!(record.store_id(StoreKind::Relational), Some("7"));
        assert_eq!(record.sources_found().len(), 2);
    }

    #[test]
    fn test_single_store_is_pending() {
        let record = IdentityRecord::builder("auth0|abc")
            .store_id(StoreKind::Relational, "7")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(record.status(), IdentityStatus::Pending);
        assert!(record.document_store_id().is_none());
    }

    #[test]
    fn test_no_ids_rejected() {
        let result = IdentityRecord::builder("auth0|abc").build();
        assert!(matches!(result, Err(IdentityError::NoStoreId(_))));
    }

    #[test]
    fn test_reassignment_rejected() {
        let result = IdentityRecord::builder("auth0|abc")
            .store_id(StoreKind::Relational, "7")
            .unwrap()
            .store_id(StoreKind::Relational, "8");

        assert!(matches!(result, Err(IdentityError::Reassignment { .. })));
    }

    #[test]
    fn test_first_email_wins() {
        let record = IdentityRecord::builder("auth0|abc")
            .store_id(StoreKind::Document, "64b7f0c2a1b2c3d4e5f60718")
            .unwrap()
            .email(Some("store@example.com".to_string()))
            .email(Some("token@example.com".to_string()))
            .build()
            .unwrap();

        assert_eq!(record.email(), Some("store@example.com"));
    }

    #[test]
    fn test_store_kind_other() {
        assert_eq!(StoreKind::Document.other(), StoreKind::Relational);
        assert_eq!("Relational".parse::<StoreKind>().unwrap(), StoreKind::Relational);
    }
}
