//! Ledger domain errors
//!
//! Every variant maps to a stable, caller-facing code via [`LedgerError::code`].
//! Infrastructure failures arrive as [`PortError`] and surface as
//! `INTERNAL_ERROR` without leaking their details past the interface layer.

use thiserror::Error;

use core_kernel::{AccountId, CoreError, MoneyError, PortError};

use crate::account::AlternativeAccount;

/// Stable error codes shared with API consumers
pub mod codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const ACCOUNT_NOT_FOUND: &str = "ACCOUNT_NOT_FOUND";
    pub const ACCOUNT_NOT_OWNED: &str = "ACCOUNT_NOT_OWNED";
    pub const DUPLICATE_REQUEST: &str = "DUPLICATE_REQUEST";
    pub const REQUEST_IN_FLIGHT: &str = "REQUEST_IN_FLIGHT";
    pub const IDEMPOTENCY_KEY_CONFLICT: &str = "IDEMPOTENCY_KEY_CONFLICT";
    pub const INSUFFICIENT_FUNDS: &str = "INSUFFICIENT_FUNDS";
    pub const REMOTE_FUNDING_FAILED: &str = "REMOTE_FUNDING_FAILED";
    pub const REMOTE_TIMEOUT: &str = "REMOTE_TIMEOUT";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Errors that can occur in the ledger domain
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Bad amount, missing field or malformed key; rejected before admission
    #[error("Validation error: {0}")]
    Validation(String),

    /// Account id unknown or the account is closed
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Caller is not the owner of the account
    #[error("Account {account_id} is not owned by the caller")]
    AccountNotOwned { account_id: AccountId },

    /// Same idempotency key is currently PENDING
    #[error("Request with idempotency key '{key}' is still in flight")]
    RequestInFlight { key: String },

    /// Idempotency key reused by another caller or with different parameters
    #[error("Idempotency key '{key}' was already used for a different request")]
    IdempotencyConflict { key: String },

    /// A debit would drive the balance below zero
    #[error("Insufficient funds in account {account_id}: balance={balance}, requested={requested}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: i64,
        requested: i64,
        alternatives: Vec<AlternativeAccount>,
    },

    /// The remote service refused or failed the debit
    #[error("Remote funding failed: {0}")]
    RemoteFundingFailed(String),

    /// The remote service did not answer in time
    #[error("Remote funding timed out: {0}")]
    RemoteTimeout(String),

    /// The operation was resolved to FAILED without completing (reconciliation)
    #[error("Operation did not complete: {0}")]
    Abandoned(String),

    /// Attempt to move a terminal operation
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Cached balance disagrees with the sum of ledger entries
    #[error("Balance divergence on account {account_id}: cached={cached}, reconstructed={reconstructed}")]
    BalanceDivergence {
        account_id: AccountId,
        cached: i64,
        reconstructed: i64,
    },

    /// Adapter failure
    #[error(transparent)]
    Port(#[from] PortError),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    /// Stable caller-facing code for this error
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => codes::VALIDATION_ERROR,
            LedgerError::AccountNotFound(_) => codes::ACCOUNT_NOT_FOUND,
            LedgerError::AccountNotOwned { .. } => codes::ACCOUNT_NOT_OWNED,
            LedgerError::RequestInFlight { .. } => codes::REQUEST_IN_FLIGHT,
            LedgerError::IdempotencyConflict { .. } => codes::IDEMPOTENCY_KEY_CONFLICT,
            LedgerError::InsufficientFunds { .. } => codes::INSUFFICIENT_FUNDS,
            LedgerError::RemoteFundingFailed(_) => codes::REMOTE_FUNDING_FAILED,
            LedgerError::RemoteTimeout(_) => codes::REMOTE_TIMEOUT,
            LedgerError::Abandoned(_)
            | LedgerError::InvalidStateTransition(_)
            | LedgerError::BalanceDivergence { .. }
            | LedgerError::Port(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Returns true if retrying the same request may succeed later
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::RequestInFlight { .. } => true,
            LedgerError::Port(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns true for errors that must not reveal internals to callers
    pub fn is_internal(&self) -> bool {
        self.code() == codes::INTERNAL_ERROR
    }
}

impl From<MoneyError> for LedgerError {
    fn from(error: MoneyError) -> Self {
        match error {
            MoneyError::InvalidAmount(msg) => LedgerError::Validation(msg),
            MoneyError::Overflow => LedgerError::Port(PortError::internal("balance overflow")),
        }
    }
}

impl From<CoreError> for LedgerError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Money(e) => e.into(),
            other @ CoreError::Configuration(_) => LedgerError::Port(PortError::internal(other.to_string())),
        }
    }
}
