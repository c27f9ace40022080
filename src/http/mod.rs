//! HTTP surface under `/api/v1`.
//!
//! Handlers are thin: decode the request, run the core operation on the blocking
//! pool, wrap the outcome in the [`envelope::ApiResponse`] envelope. Request ids,
//! request logging, panic recovery, timeouts and CORS are tower-http layers.

pub mod envelope;
pub mod handlers;

use axum::body::Body;
use axum::http::header::{
    HeaderName, ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE,
};
use axum::http::{Method, Request};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::db::Database;
use crate::engine::TransactionProcessor;
use crate::Result;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Database,
    pub processor: Arc<TransactionProcessor>,
}

impl AppState {
    pub fn new(db: Database) -> Result<Self> {
        let processor = Arc::new(TransactionProcessor::new(&db)?);
        Ok(Self { db, processor })
    }
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/accounts",
            get(handlers::list_accounts).post(handlers::create_account),
        )
        .route("/accounts/:id", get(handlers::get_account))
        .route(
            "/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route("/transactions/:id", get(handlers::get_transaction))
        .route(
            "/transactions/account/:account_id",
            get(handlers::list_account_transactions),
        );

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(request_id))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(CatchPanicLayer::new())
        .layer(cors())
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .nest("/api/v1", api)
        .layer(middleware)
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            CONTENT_LENGTH,
            ACCEPT_ENCODING,
            AUTHORIZATION,
            HeaderName::from_static("x-csrf-token"),
        ])
}
