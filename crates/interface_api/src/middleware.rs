//! API middleware

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use chrono::Utc;
use tracing::{info, warn};

use core_kernel::UserId;

use crate::error::ApiError;

/// Header carrying the caller identity verified by the gateway
pub const USER_ID_HEADER: &str = "x-user-id";

/// Trusted caller identity, inserted into request extensions
#[derive(Debug, Clone)]
pub struct Caller(pub UserId);

/// Identity middleware
///
/// Credentials were checked upstream; this only lifts the identity out of
/// the header. Requests without one are rejected with 401.
pub async fn identity_middleware(mut request: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(UserId::new);

    match user_id {
        Some(user_id) => {
            request.extensions_mut().insert(Caller(user_id));
            Ok(next.run(request).await)
        }
        None => {
            warn!(uri = %request.uri(), "Missing caller identity header");
            Err(ApiError::MissingIdentity)
        }
    }
}

/// Audit logging middleware
///
/// Logs every API request with its caller, outcome and latency
pub async fn audit_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let user_id = request
        .extensions()
        .get::<Caller>()
        .map(|c| c.0.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    let start = Utc::now();

    let response = next.run(request).await;

    let duration = Utc::now() - start;
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        user = %user_id,
        status = %status.as_u16(),
        duration_ms = duration.num_milliseconds(),
        "API request"
    );

    response
}
