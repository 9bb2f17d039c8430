//! API error handling
//!
//! Every failure leaves the API as `{code, message, retryable, alternatives?}`
//! with the ledger's stable error code. Internal failures are logged here and
//! answered with a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use domain_ledger::error::codes;
use domain_ledger::LedgerError;

use crate::dto::accounts::AlternativeAccountResponse;

const MISSING_IDENTITY: &str = "MISSING_IDENTITY";

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    /// No trusted caller identity on the request
    #[error("Caller identity is required")]
    MissingIdentity,

    /// Malformed body or query, rejected before reaching the ledger
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    /// Other accounts able to cover a payment that failed for insufficient funds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Vec<AlternativeAccountResponse>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingIdentity => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Ledger(e) => ledger_status(e),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingIdentity => MISSING_IDENTITY,
            ApiError::Validation(_) => codes::VALIDATION_ERROR,
            ApiError::Ledger(e) => e.code(),
        }
    }
}

fn ledger_status(error: &LedgerError) -> StatusCode {
    match error {
        LedgerError::Validation(_) | LedgerError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::AccountNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::AccountNotOwned { .. } => StatusCode::FORBIDDEN,
        LedgerError::RequestInFlight { .. } | LedgerError::IdempotencyConflict { .. } => StatusCode::CONFLICT,
        LedgerError::RemoteFundingFailed(_) => StatusCode::BAD_GATEWAY,
        LedgerError::RemoteTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let body = match &self {
            ApiError::Ledger(e) if e.is_internal() => {
                error!(error = %e, "Request failed with an internal error");
                ErrorResponse {
                    code: code.to_string(),
                    message: "An internal error occurred".to_string(),
                    retryable: e.is_retryable(),
                    alternatives: None,
                }
            }
            ApiError::Ledger(e) => ErrorResponse {
                code: code.to_string(),
                message: e.to_string(),
                retryable: e.is_retryable(),
                alternatives: match e {
                    LedgerError::InsufficientFunds { alternatives, .. } => {
                        Some(alternatives.iter().map(AlternativeAccountResponse::from).collect())
                    }
                    _ => None,
                },
            },
            other => ErrorResponse {
                code: code.to_string(),
                message: other.to_string(),
                retryable: false,
                alternatives: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{AccountId, PortError};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::MissingIdentity, StatusCode::UNAUTHORIZED),
            (ApiError::Validation("bad".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (LedgerError::AccountNotFound(AccountId::new()).into(), StatusCode::NOT_FOUND),
            (
                LedgerError::AccountNotOwned { account_id: AccountId::new() }.into(),
                StatusCode::FORBIDDEN,
            ),
            (LedgerError::RequestInFlight { key: "k".into() }.into(), StatusCode::CONFLICT),
            (LedgerError::IdempotencyConflict { key: "k".into() }.into(), StatusCode::CONFLICT),
            (LedgerError::RemoteFundingFailed("no".into()).into(), StatusCode::BAD_GATEWAY),
            (LedgerError::RemoteTimeout("slow".into()).into(), StatusCode::GATEWAY_TIMEOUT),
            (
                LedgerError::Port(PortError::internal("db")).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "{}", error);
        }
    }

    #[test]
    fn test_missing_identity_code() {
        assert_eq!(ApiError::MissingIdentity.code(), "MISSING_IDENTITY");
        assert_eq!(ApiError::Validation("x".into()).code(), "VALIDATION_ERROR");
    }
}
