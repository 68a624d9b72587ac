//! Common test utilities
#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::Response;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Url;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use account_gateway::audit::TransactionAuditLog;
use account_gateway::config::JwtSettings;
use account_gateway::domain::{
    Account, AccountStatus, AccountType, Balance, Currency, IdentityRecord, StoreKind,
};
use account_gateway::engine::{AccountMutationEngine, MemoryAccountStore};
use account_gateway::gateway::{DualTargetDispatcher, ReconciliationPublisher, ServiceTargets};

pub const SUBJECT: &str = "auth0|65a1b2c3";
pub const DOC_USER_ID: &str = "65a1b2c3d4e5f6a7b8c9d0e1";
pub const REL_USER_ID: &str = "42";

pub const JWT_SECRET: &str = "integration-test-secret";
pub const JWT_ISSUER: &str = "https://issuer.test/";
pub const JWT_AUDIENCE: &str = "accounts-api";

pub fn jwt_settings() -> JwtSettings {
    JwtSettings {
        secret: JWT_SECRET.to_string(),
        issuer: JWT_ISSUER.to_string(),
        audience: JWT_AUDIENCE.to_string(),
        claim_namespace: Some("https://claims.bankapp.com".to_string()),
    }
}

/// Signed HS256 token for `subject`, valid for ten minutes
pub fn token_for(subject: &str) -> String {
    let claims = json!({
        "sub": subject,
        "iss": JWT_ISSUER,
        "aud": JWT_AUDIENCE,
        "exp": chrono::Utc::now().timestamp() + 600,
        "email": "ana@example.com",
        "given_name": "Ana",
    });

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn identity(document_id: Option<&str>, relational_id: Option<&str>) -> IdentityRecord {
    let mut builder = IdentityRecord::builder(SUBJECT);
    if let Some(id) = document_id {
        builder = builder.store_id(StoreKind::Document, id).unwrap();
    }
    if let Some(id) = relational_id {
        builder = builder.store_id(StoreKind::Relational, id).unwrap();
    }
    builder.build().unwrap()
}

pub fn account(id: &str, owner: &str, balance: Decimal, status: AccountStatus) -> Account {
    Account {
        account_id: id.to_string(),
        owner_id: owner.to_string(),
        account_number: format!("ACC-{}", id),
        account_type: AccountType::Savings,
        balance: Balance::new(balance).unwrap(),
        currency: Currency::Usd,
        status,
    }
}

/// Engine over an in-memory store seeded with `accounts`
pub async fn memory_engine(
    kind: StoreKind,
    accounts: Vec<Account>,
    audit: TransactionAuditLog,
) -> (Arc<AccountMutationEngine>, MemoryAccountStore) {
    let store = MemoryAccountStore::new();
    for account in accounts {
        store.insert(account).await;
    }
    let engine = AccountMutationEngine::new(Arc::new(store.clone()), Arc::new(audit), kind);
    (Arc::new(engine), store)
}

/// URL of a local port nothing listens on
pub fn closed_port_url() -> Url {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap()
}

pub fn url(raw: &str) -> Url {
    Url::parse(raw).unwrap()
}

pub fn dispatcher(
    primary: Url,
    fallback: Url,
    sync: Option<Url>,
    max_buffered: usize,
) -> DualTargetDispatcher {
    let publisher = sync.map(|sync| {
        ReconciliationPublisher::new(sync, Duration::from_secs(2), Currency::Cop).unwrap()
    });

    DualTargetDispatcher::new(
        ServiceTargets::uniform(primary, fallback),
        Duration::from_secs(2),
        max_buffered,
        publisher,
    )
    .unwrap()
}

/// Backend-style deposit receipt
pub fn deposit_receipt(new_balance: &str, amount: &str) -> Value {
    json!({
        "status": "success",
        "message": "Deposit successful",
        "data": {
            "message": "Deposit successful",
            "accountId": "acc-1",
            "accountNumber": "ACC-0001",
            "newBalance": new_balance,
            "currency": "USD",
            "amountDeposited": amount,
            "transactionId": "txn-1",
            "transactionTimestamp": "2024-05-01T10:00:00Z"
        }
    })
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
