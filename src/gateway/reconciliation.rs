//! Reconciliation Publisher
//!
//! After a successful mutating dispatch, tells the sync service which store
//! already applied the change so the other store can catch up. Publishing is
//! fire-and-forget: one detached POST, failures are logged and dropped.

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::domain::{round_money, Currency, IdentityRecord, Operation, StoreKind};

use super::targets::Target;

/// Payload posted to the sync service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub source_identity_system_id: String,
    pub subject: String,
    pub source_account_number: Option<String>,
    pub transaction_type: Operation,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: Currency,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_balance_source_system: Decimal,
    pub source_transaction_id: Option<String>,
    pub source_timestamp: DateTime<Utc>,
}

/// Why a response was not turned into an event
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("operation {0} is read-only")]
    ReadOnly(Operation),

    #[error("identity has no {0} id")]
    MissingIdentity(StoreKind),

    #[error("no amount in response or request")]
    MissingAmount,

    #[error("no newBalance in response")]
    MissingNewBalance,

    #[error("newBalance is not a decimal: {0}")]
    InvalidNewBalance(String),
}

/// Sync endpoint path segment for the store that served
pub fn sync_direction(served_by: Target) -> &'static str {
    match served_by.store() {
        StoreKind::Document => "document-to-relational",
        StoreKind::Relational => "relational-to-document",
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationPublisher {
    client: Client,
    sync_base: Url,
    default_currency: Currency,
}

impl ReconciliationPublisher {
    pub fn new(
        sync_base: Url,
        timeout: Duration,
        default_currency: Currency,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            sync_base,
            default_currency,
        })
    }

    /// `{SYNC_SERVICE_URL}/sync/{direction}`
    pub fn sync_url(&self, served_by: Target) -> Url {
        let mut url = self.sync_base.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/sync/{}", base_path, sync_direction(served_by)));
        url
    }

    /// Assemble the event from the exchange. Pure; no I/O.
    pub fn build_event(
        &self,
        operation: Operation,
        identity: &IdentityRecord,
        served_by: Target,
        request_body: &[u8],
        response_body: &[u8],
    ) -> Result<TransactionEvent, SkipReason> {
        if !operation.is_mutating() {
            return Err(SkipReason::ReadOnly(operation));
        }

        let store = served_by.store();
        let source_id = identity
            .store_id(store)
            .ok_or(SkipReason::MissingIdentity(store))?;

        let request: Value = serde_json::from_slice(request_body).unwrap_or(Value::Null);
        let response: Value = serde_json::from_slice(response_body).unwrap_or(Value::Null);
        let data = response.get("data").unwrap_or(&Value::Null);

        let amount = ["amountDeposited", "amountWithdrawn", "amount"]
            .iter()
            .find_map(|key| data.get(*key).and_then(decimal_from))
            .or_else(|| request.get("amount").and_then(decimal_from))
            .ok_or(SkipReason::MissingAmount)?;

        let new_balance = match data.get("newBalance") {
            None | Some(Value::Null) => return Err(SkipReason::MissingNewBalance),
            Some(raw) => decimal_from(raw)
                .ok_or_else(|| SkipReason::InvalidNewBalance(raw.to_string()))?,
        };

        let currency = [data.get("currency"), request.get("currency")]
            .into_iter()
            .flatten()
            .find_map(|v| v.as_str().and_then(|s| Currency::from_str(s).ok()))
            .unwrap_or(self.default_currency);

        let source_timestamp = data
            .get("transactionTimestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(TransactionEvent {
            source_identity_system_id: source_id.to_string(),
            subject: identity.subject().to_string(),
            source_account_number: string_field(data, "accountNumber"),
            transaction_type: operation,
            amount: round_money(amount),
            currency,
            new_balance_source_system: round_money(new_balance),
            source_transaction_id: string_field(data, "transactionId"),
            source_timestamp,
        })
    }

    /// Build and send the event on a detached task.
    ///
    /// Returns the task handle, or `None` when there is nothing to publish.
    pub fn publish(
        &self,
        operation: Operation,
        identity: &IdentityRecord,
        served_by: Target,
        request_body: &Bytes,
        response_body: &Bytes,
    ) -> Option<JoinHandle<()>> {
        let built = self.build_event(operation, identity, served_by, request_body, response_body);
        let event = match built {
            Ok(event) => event,
            Err(SkipReason::ReadOnly(_)) => return None,
            Err(reason) => {
                tracing::warn!(
                    operation = %operation,
                    subject = %identity.subject(),
                    served_by = %served_by,
                    reason = %reason,
                    "Reconciliation event dropped"
                );
                return None;
            }
        };

        let client = self.client.clone();
        let url = self.sync_url(served_by);

        Some(tokio::spawn(async move {
            match client.post(url.clone()).json(&event).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::info!(
                        url = %url,
                        transaction_type = %event.transaction_type,
                        source_id = %event.source_identity_system_id,
                        "Reconciliation event published"
                    );
                }
                Ok(response) => {
                    tracing::error!(
                        url = %url,
                        status = %response.status(),
                        source_id = %event.source_identity_system_id,
                        "Sync service rejected reconciliation event"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        url = %url,
                        error = %e,
                        source_id = %event.source_identity_system_id,
                        "Failed to publish reconciliation event"
                    );
                }
            }
        }))
    }
}

fn decimal_from(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    const SUBJECT: &str = "auth0|abc";
    const DOC_ID: &str = "65a1b2c3d4e5f6a7b8c9d0e1";

    fn publisher() -> ReconciliationPublisher {
        ReconciliationPublisher::new(
            Url::parse("http://sync.local/base/").unwrap(),
            Duration::from_secs(5),
            Currency::Cop,
        )
        .unwrap()
    }

    fn identity() -> IdentityRecord {
        IdentityRecord::builder(SUBJECT)
            .store_id(StoreKind::Document, DOC_ID)
            .unwrap()
            .store_id(StoreKind::Relational, "42")
            .unwrap()
            .build()
            .unwrap()
    }

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_deposit_event_from_response() {
        let response = body(json!({
            "status": "success",
            "data": {
                "accountNumber": "ACC-1",
                "newBalance": "150.75",
                "amountDeposited": "50.75",
                "currency": "USD",
                "transactionId": "doc_txn_dep_1",
                "transactionTimestamp": "2024-05-01T10:00:00Z"
            }
        }));

        let event = publisher()
            .build_event(Operation::Deposit, &identity(), Target::Primary, b"{}", &response)
            .unwrap();

        assert_eq!(event.source_identity_system_id, DOC_ID);
        assert_eq!(event.amount, dec!(50.75));
        assert_eq!(event.new_balance_source_system, dec!(150.75));
        assert_eq!(event.currency, Currency::Usd);
        assert_eq!(event.source_transaction_id.as_deref(), Some("doc_txn_dep_1"));
        assert_eq!(event.source_timestamp.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_fallback_uses_relational_id_and_request_amount() {
        let response = body(json!({ "data": { "newBalance": 20 } }));
        let request = body(json!({ "amount": 5 }));

        let event = publisher()
            .build_event(Operation::Withdrawal, &identity(), Target::Fallback, &request, &response)
            .unwrap();

        assert_eq!(event.source_identity_system_id, "42");
        assert_eq!(event.amount, dec!(5));
        assert_eq!(event.currency, Currency::Cop);
    }

    #[test]
    fn test_skip_reasons() {
        let p = publisher();
        let id = identity();

        assert_eq!(
            p.build_event(Operation::BalanceRead, &id, Target::Primary, b"", b"").unwrap_err(),
            SkipReason::ReadOnly(Operation::BalanceRead)
        );
        assert_eq!(
            p.build_event(
                Operation::Deposit,
                &id,
                Target::Primary,
                b"",
                &body(json!({"data": {"newBalance": "1"}}))
            )
            .unwrap_err(),
            SkipReason::MissingAmount
        );
        assert_eq!(
            p.build_event(
                Operation::Deposit,
                &id,
                Target::Primary,
                &body(json!({"amount": 1})),
                b"{}"
            )
            .unwrap_err(),
            SkipReason::MissingNewBalance
        );
        assert!(matches!(
            p.build_event(
                Operation::Deposit,
                &id,
                Target::Primary,
                &body(json!({"amount": 1})),
                &body(json!({"data": {"newBalance": "NaN"}}))
            ),
            Err(SkipReason::InvalidNewBalance(_))
        ));
    }

    #[test]
    fn test_missing_identity_for_serving_store() {
        let relational_only = IdentityRecord::builder(SUBJECT)
            .store_id(StoreKind::Relational, "42")
            .unwrap()
            .build()
            .unwrap();

        let response = body(json!({ "data": { "newBalance": "1", "amountDeposited": "1" } }));
        assert_eq!(
            publisher()
                .build_event(Operation::Deposit, &relational_only, Target::Primary, b"", &response)
                .unwrap_err(),
            SkipReason::MissingIdentity(StoreKind::Document)
        );
    }

    #[test]
    fn test_sync_url() {
        let p = publisher();
        assert_eq!(
            p.sync_url(Target::Primary).as_str(),
            "http://sync.local/base/sync/document-to-relational"
        );
        assert_eq!(
            p.sync_url(Target::Fallback).path(),
            "/base/sync/relational-to-document"
        );
    }

    #[test]
    fn test_event_wire_format() {
        let event = publisher()
            .build_event(
                Operation::Deposit,
                &identity(),
                Target::Primary,
                b"",
                &body(json!({ "data": { "newBalance": "150.75", "amountDeposited": "50.75" } })),
            )
            .unwrap();

        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["transaction_type"], "DEPOSIT");
        assert_eq!(wire["amount"], json!(50.75));
        assert_eq!(wire["new_balance_source_system"], json!(150.75));
    }
}
