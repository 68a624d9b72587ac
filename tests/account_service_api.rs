//! Account service HTTP surface over the in-memory store

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

use account_gateway::api::{account_service_app, AccountServiceState};
use account_gateway::audit::TransactionAuditLog;
use account_gateway::domain::{AccountStatus, StoreKind};
use account_gateway::engine::MemoryAccountStore;

mod common;

async fn app() -> (Router, MemoryAccountStore) {
    let (engine, store) = common::memory_engine(
        StoreKind::Relational,
        vec![
            common::account("7", "42", dec!(100.00), AccountStatus::Active),
            common::account("8", "43", dec!(20.00), AccountStatus::Active),
        ],
        TransactionAuditLog::tracing_only(),
    )
    .await;

    (account_service_app(AccountServiceState { engine }), store)
}

fn get(uri: &str, user_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id);
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, user_id: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app().await;
    let response = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_balance_envelope() {
    let (app, _) = app().await;

    let response = app.oneshot(get("/balance", Some("42"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = common::body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Balance retrieved successfully");
    assert_eq!(body["data"]["accountId"], "7");
    assert_eq!(body["data"]["accountNumber"], "ACC-7");
    assert_eq!(body["data"]["balance"], "100.00");
    assert_eq!(body["data"]["currency"], "USD");
    assert_eq!(body["data"]["status"], "active");
}

#[tokio::test]
async fn test_deposit_returns_new_balance() {
    let (app, store) = app().await;

    let response = app
        .oneshot(post("/deposit/7", Some("42"), r#"{"amount": 50.75}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = common::body_json(response).await;
    assert_eq!(body["message"], "Deposit successful");
    assert_eq!(body["data"]["newBalance"], "150.75");
    assert_eq!(body["data"]["amountDeposited"], "50.75");
    assert!(body["data"]["transactionId"]
        .as_str()
        .unwrap()
        .starts_with("pg_txn_dep_"));

    assert_eq!(store.get("7").await.unwrap().balance.value(), dec!(150.75));
}

#[tokio::test]
async fn test_withdraw_more_than_balance() {
    let (app, store) = app().await;

    let response = app
        .oneshot(post("/withdraw", Some("43"), r#"{"amount": "75.00"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = common::body_json(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["error_code"], "insufficient_funds");
    assert_eq!(store.get("8").await.unwrap().balance.value(), dec!(20.00));
}

#[tokio::test]
async fn test_missing_user_id_is_rejected() {
    let (app, _) = app().await;

    let response = app
        .oneshot(post("/deposit", None, r#"{"amount": 10}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = common::body_json(response).await;
    assert_eq!(body["error_code"], "validation_error");
}

#[tokio::test]
async fn test_malformed_body_and_missing_amount() {
    let (app, _) = app().await;

    let response = app
        .clone()
        .oneshot(post("/deposit", Some("42"), "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(common::body_json(response).await["error_code"], "validation_error");

    let response = app
        .oneshot(post("/withdraw", Some("42"), r#"{"value": 10}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(common::body_json(response).await["error_code"], "invalid_amount");
}

#[tokio::test]
async fn test_foreign_and_unknown_accounts() {
    let (app, _) = app().await;

    let response = app
        .clone()
        .oneshot(get("/balance/8", Some("42")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(common::body_json(response).await["error_code"], "forbidden");

    let response = app.oneshot(get("/balance/999", Some("42"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = common::body_json(response).await;
    assert_eq!(body["error_code"], "account_not_found");
}

#[tokio::test]
async fn test_store_outage_maps_to_503() {
    let (app, store) = app().await;
    store.set_unavailable(true);

    let response = app
        .oneshot(post("/deposit", Some("42"), &json!({ "amount": 1 }).to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
