//! Account Service Routes
//!
//! Store-side endpoints the gateway forwards to. The caller is identified by
//! `X-User-ID` in this store's id namespace.

use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    routing::{get, post},
    Router,
};
use serde_json::Value;
use std::sync::Arc;

use crate::domain::OperationContext;
use crate::engine::{AccountMutationEngine, AccountTarget, BalanceView};
use crate::error::AppError;

use super::envelope::ApiResponse;

/// Shared account service state
#[derive(Clone)]
pub struct AccountServiceState {
    pub engine: Arc<AccountMutationEngine>,
}

/// Create the account service router
pub fn create_backend_router() -> Router<AccountServiceState> {
    Router::new()
        .route("/balance", get(read_balance))
        .route("/balance/:account_id", get(read_balance))
        .route("/deposit", post(deposit))
        .route("/deposit/:account_id", post(deposit))
        .route("/withdraw", post(withdraw))
        .route("/withdraw/:account_id", post(withdraw))
}

async fn read_balance(
    State(state): State<AccountServiceState>,
    Extension(context): Extension<OperationContext>,
    account_id: Option<Path<String>>,
) -> Result<ApiResponse<BalanceView>, AppError> {
    let user_id = context.user_id.clone().unwrap_or_default();
    let account_id = account_id.map(|Path(id)| id);
    let target = AccountTarget::new(&user_id, account_id.as_deref());

    let view = state.engine.read_balance(target, &context).await?;
    Ok(ApiResponse::success("Balance retrieved successfully", view))
}

async fn deposit(
    State(state): State<AccountServiceState>,
    Extension(context): Extension<OperationContext>,
    account_id: Option<Path<String>>,
    body: Bytes,
) -> Result<ApiResponse<Value>, AppError> {
    let user_id = context.user_id.clone().unwrap_or_default();
    let account_id = account_id.map(|Path(id)| id);
    let amount = amount_from_body(&body)?;
    let target = AccountTarget::new(&user_id, account_id.as_deref());

    let receipt = state.engine.credit(target, &amount, &context).await?;
    Ok(ApiResponse::success(receipt.message(), receipt.to_json()))
}

async fn withdraw(
    State(state): State<AccountServiceState>,
    Extension(context): Extension<OperationContext>,
    account_id: Option<Path<String>>,
    body: Bytes,
) -> Result<ApiResponse<Value>, AppError> {
    let user_id = context.user_id.clone().unwrap_or_default();
    let account_id = account_id.map(|Path(id)| id);
    let amount = amount_from_body(&body)?;
    let target = AccountTarget::new(&user_id, account_id.as_deref());

    let receipt = state.engine.debit(target, &amount, &context).await?;
    Ok(ApiResponse::success(receipt.message(), receipt.to_json()))
}

/// The `amount` member of a JSON body; `null` when absent so the engine can
/// reject (and audit) it
fn amount_from_body(body: &[u8]) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    let parsed: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Malformed JSON body: {}", e)))?;

    Ok(parsed.get("amount").cloned().unwrap_or(Value::Null))
}
