use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

use balance_keeper::db::Database;
use balance_keeper::http::{self, AppState};

fn app() -> (Router, Database) {
    let db = Database::in_memory("api_test");
    let state = AppState::new(db.clone()).unwrap();
    (http::router(state, Duration::from_secs(60)), db)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_account(app: &Router, name: &str, email: &str, balance: f64) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/accounts",
        Some(json!({"name": name, "email": email, "initialBalance": balance})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"].clone()
}

async fn transact(app: &Router, account_id: &str, kind: &str, amount: f64) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/api/v1/transactions",
        Some(json!({"accountId": account_id, "transactionType": kind, "amount": amount})),
    )
    .await
}

async fn history(app: &Router, account_id: &str) -> Vec<Value> {
    let (status, body) = send(
        app,
        Method::GET,
        &format!("/api/v1/transactions/account/{account_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["data"].as_array().unwrap().clone()
}

#[tokio::test]
async fn test_deposit_withdraw_scenario() {
    let (app, _db) = app();

    let account = create_account(&app, "John", "j@x.com", 1000.0).await;
    let id = account["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());
    assert_eq!(account["balance"], 1000.0);
    assert_eq!(account["name"], "John");
    assert!(account.get("createdAt").is_some());
    assert!(account.get("updatedAt").is_some());

    let (status, body) = transact(&app, &id, "DEPOSIT", 500.0).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Transaction created successfully");
    assert_eq!(body["data"]["account"]["balance"], 1500.0);
    let transactions = body["data"]["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["transactionType"], "DEPOSIT");
    assert_eq!(transactions[0]["amount"], 500.0);
    assert_eq!(transactions[0]["accountId"], id.as_str());

    let (status, body) = transact(&app, &id, "WITHDRAW", 2000.0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "balance cannot be negative");

    let (status, body) = transact(&app, &id, "FOO", 500.0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/accounts/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Account fetched successfully");
    assert_eq!(body["data"]["balance"], 1500.0);
    assert_eq!(history(&app, &id).await.len(), 1);
}

#[tokio::test]
async fn test_history_newest_first() {
    let (app, _db) = app();
    let account = create_account(&app, "Alice", "alice@example.com", 1000.0).await;
    let id = account["id"].as_str().unwrap();

    transact(&app, id, "deposit", 500.0).await;
    let (status, body) = transact(&app, id, "withdraw", 200.0).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["account"]["balance"], 1300.0);

    let transactions = history(&app, id).await;
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0]["transactionType"], "WITHDRAW");
    assert_eq!(transactions[0]["amount"], 200.0);
    assert_eq!(transactions[1]["transactionType"], "DEPOSIT");
    assert_eq!(transactions[1]["amount"], 500.0);

    let (status, body) = send(&app, Method::GET, "/api/v1/transactions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let (app, _db) = app();
    let first = create_account(&app, "John", "john.doe@example.com", 10.0).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/accounts",
        Some(json!({"name": "Jane", "email": "john.doe@example.com", "initialBalance": 99})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "account with this email already exists");

    let (_, body) = send(&app, Method::GET, "/api/v1/accounts", None).await;
    let accounts = body["data"].as_array().unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0]["id"], first["id"]);
    assert_eq!(accounts[0]["balance"], 10.0);
}

#[tokio::test]
async fn test_create_account_validation() {
    let (app, _db) = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/accounts",
        Some(json!({"name": "John"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "email is required");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/accounts",
        Some(json!({"email": "j@x.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "name is required");
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let (app, _db) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/transactions")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_account_lookup_errors() {
    let (app, _db) = app();
    let (status, body) = send(&app, Method::GET, "/api/v1/accounts/not-an-id", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let missing = balance_keeper::AccountId::new();
    let (status, _) = send(&app, Method::GET, &format!("/api/v1/accounts/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = transact(&app, &missing.to_string(), "DEPOSIT", 5.0).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_transaction_by_id() {
    let (app, _db) = app();
    let account = create_account(&app, "John", "j@x.com", 0.0).await;
    let (_, body) = transact(&app, account["id"].as_str().unwrap(), "DEPOSIT", 42.5).await;
    let tx = body["data"]["transactions"][0].clone();

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/transactions/{}", tx["id"].as_str().unwrap()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], tx);

    let missing = balance_keeper::TransactionId::new();
    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/transactions/{missing}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_account_history_malformed_id() {
    let (app, _db) = app();
    let (status, _) = send(&app, Method::GET, "/api/v1/transactions/account/xyz", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_lists_are_arrays() {
    let (app, _db) = app();
    let (_, body) = send(&app, Method::GET, "/api/v1/accounts", None).await;
    assert_eq!(body["data"], json!([]));
    let (_, body) = send(&app, Method::GET, "/api/v1/transactions", None).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_health_and_store_outage() {
    let (app, db) = app();
    let (status, body) = send(&app, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    db.close().unwrap();

    let (status, body) = send(&app, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");

    let (status, body) = send(&app, Method::GET, "/api/v1/accounts", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal server error");
}

#[tokio::test]
async fn test_request_id_is_returned() {
    let (app, _db) = app();
    let request = Request::builder()
        .uri("/api/v1/health")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));

    let request = Request::builder()
        .uri("/api/v1/health")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn test_cors_preflight() {
    let (app, _db) = app();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/transactions")
        .header("origin", "http://example.com")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposits_over_http() {
    let (app, _db) = app();
    let account = create_account(&app, "John", "j@x.com", 100.0).await;
    let id = account["id"].as_str().unwrap().to_string();

    let mut handles = Vec::new();
    for _ in 0..50 {
        let app = app.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            let (status, _) = transact(&app, &id, "DEPOSIT", 10.0).await;
            status
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::CREATED);
    }

    let (_, body) = send(&app, Method::GET, &format!("/api/v1/accounts/{id}"), None).await;
    assert_eq!(body["data"]["balance"], 600.0);
    assert_eq!(history(&app, &id).await.len(), 50);
}
