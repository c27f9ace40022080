use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use super::envelope::{respond, ApiError};
use super::AppState;
use crate::model::NewAccount;

type HandlerResult = Result<Response, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub transaction_type: String,
    #[serde(default)]
    pub amount: Decimal,
}

/// Runs a core operation on the blocking pool. The core talks to the store
/// synchronously, so it must stay off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

pub async fn health(State(state): State<AppState>) -> Response {
    match state.db.ping() {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "message": "OK",
                "status": "healthy",
                "timestamp": Utc::now(),
            })),
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "message": "store unavailable",
                    "status": "unhealthy",
                    "timestamp": Utc::now(),
                })),
            )
                .into_response()
        }
    }
}

pub async fn list_accounts(State(state): State<AppState>) -> HandlerResult {
    let accounts = blocking(move || state.processor.accounts().list_all()).await?;
    Ok(respond(
        StatusCode::OK,
        accounts,
        "Accounts fetched successfully",
    ))
}

pub async fn create_account(
    State(state): State<AppState>,
    payload: Result<Json<NewAccount>, JsonRejection>,
) -> HandlerResult {
    let Json(new) = payload?;
    let account = blocking(move || state.processor.accounts().create(new)).await?;
    Ok(respond(
        StatusCode::CREATED,
        account,
        "Account created successfully",
    ))
}

pub async fn get_account(State(state): State<AppState>, Path(id): Path<String>) -> HandlerResult {
    let account = blocking(move || state.processor.accounts().lookup(&id)).await?;
    Ok(respond(StatusCode::OK, account, "Account fetched successfully"))
}

pub async fn list_transactions(State(state): State<AppState>) -> HandlerResult {
    let transactions = blocking(move || state.processor.ledger().list_all()).await?;
    Ok(respond(
        StatusCode::OK,
        transactions,
        "Transactions fetched successfully",
    ))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> HandlerResult {
    let Json(request) = payload?;
    let activity = blocking(move || {
        state
            .processor
            .apply(&request.account_id, &request.transaction_type, request.amount)
    })
    .await?;
    Ok(respond(
        StatusCode::CREATED,
        activity,
        "Transaction created successfully",
    ))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HandlerResult {
    let transaction = blocking(move || state.processor.ledger().get_by_id(&id)).await?;
    Ok(respond(
        StatusCode::OK,
        transaction,
        "Transaction fetched successfully",
    ))
}

pub async fn list_account_transactions(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> HandlerResult {
    let transactions =
        blocking(move || state.processor.ledger().list_by_account(&account_id)).await?;
    Ok(respond(
        StatusCode::OK,
        transactions,
        "Transactions fetched successfully",
    ))
}
