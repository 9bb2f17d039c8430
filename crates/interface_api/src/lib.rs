//! HTTP API Layer
//!
//! This crate provides the REST API for the ledger engine using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for accounts, transfers, payments, history
//! - **Middleware**: Trusted caller identity, tracing, audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: `{code, message, retryable}` bodies with stable codes
//!
//! The caller identity is verified by the gateway in front of this service
//! and arrives in the `X-User-Id` header.
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{bootstrap, create_router};
//!
//! let engine = Arc::new(bootstrap::build_engine(&config).await?);
//! let app = create_router(engine, config);
//! axum::serve(listener, app).await?;
//! ```

pub mod bootstrap;
pub mod config;
pub mod dto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use domain_ledger::LedgerEngine;

use crate::config::ApiConfig;
use crate::handlers::{accounts, health, history, payments, transfers};
use crate::middleware::{audit_middleware, identity_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LedgerEngine>,
    pub config: ApiConfig,
}

/// Creates the main API router
///
/// Everything under `/api/v1` requires a caller identity; health routes are
/// public.
pub fn create_router(engine: Arc<LedgerEngine>, config: ApiConfig) -> Router {
    let state = AppState { engine, config };

    // Public routes (no identity required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let account_routes = Router::new()
        .route("/", post(accounts::open_account).get(accounts::list_accounts))
        .route("/:id", get(accounts::get_account))
        .route("/:id/balance", get(accounts::get_balance))
        .route("/:id/audit", get(accounts::audit_balance))
        .route("/:id/close", post(accounts::close_account));

    let api_routes = Router::new()
        .nest("/accounts", account_routes)
        .route("/transfers", post(transfers::create_transfer))
        .route("/payments", post(payments::create_payment))
        .route("/history", get(history::get_history))
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn(identity_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
