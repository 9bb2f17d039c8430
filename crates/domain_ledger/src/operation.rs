//! Lifecycle shared by transfers and payments

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::PortError;

/// Status of an admitted operation
///
/// ```text
/// PENDING ──► SUCCEEDED
///    │
///    └──────► FAILED
/// ```
///
/// Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Succeeded,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Succeeded => "SUCCEEDED",
            OperationStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OperationStatus::Pending),
            "SUCCEEDED" => Ok(OperationStatus::Succeeded),
            "FAILED" => Ok(OperationStatus::Failed),
            other => Err(PortError::transformation(format!("unknown status '{}'", other))),
        }
    }
}

/// Why an operation ended in FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    InsufficientFunds,
    RemoteFundingFailed,
    RemoteTimeout,
    /// An account disappeared or was closed between admission and settlement
    AccountNotFound,
    /// Settlement hit an unexpected error and was rolled back
    Internal,
    /// Reconciliation found the operation stuck with nothing to finish
    Abandoned,
    /// Reconciliation could not learn whether the remote debit happened
    Unconfirmed,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::InsufficientFunds => "INSUFFICIENT_FUNDS",
            FailureCode::RemoteFundingFailed => "REMOTE_FUNDING_FAILED",
            FailureCode::RemoteTimeout => "REMOTE_TIMEOUT",
            FailureCode::AccountNotFound => "ACCOUNT_NOT_FOUND",
            FailureCode::Internal => "INTERNAL",
            FailureCode::Abandoned => "ABANDONED",
            FailureCode::Unconfirmed => "UNCONFIRMED",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureCode {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSUFFICIENT_FUNDS" => Ok(FailureCode::InsufficientFunds),
            "REMOTE_FUNDING_FAILED" => Ok(FailureCode::RemoteFundingFailed),
            "REMOTE_TIMEOUT" => Ok(FailureCode::RemoteTimeout),
            "ACCOUNT_NOT_FOUND" => Ok(FailureCode::AccountNotFound),
            "INTERNAL" => Ok(FailureCode::Internal),
            "ABANDONED" => Ok(FailureCode::Abandoned),
            "UNCONFIRMED" => Ok(FailureCode::Unconfirmed),
            other => Err(PortError::transformation(format!("unknown failure code '{}'", other))),
        }
    }
}

/// Outcome of asking storage to admit an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission<T> {
    /// The row was inserted by this request
    Fresh(T),
    /// A row with the same idempotency key already existed
    Duplicate(T),
}

impl<T> Admission<T> {
    pub fn into_inner(self) -> T {
        match self {
            Admission::Fresh(value) | Admission::Duplicate(value) => value,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Admission::Fresh(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_is_open() {
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(OperationStatus::Succeeded.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
    }

    #[test]
    fn test_failure_code_text() {
        for code in [
            FailureCode::InsufficientFunds,
            FailureCode::RemoteFundingFailed,
            FailureCode::RemoteTimeout,
            FailureCode::AccountNotFound,
            FailureCode::Internal,
            FailureCode::Abandoned,
            FailureCode::Unconfirmed,
        ] {
            assert_eq!(code.as_str().parse::<FailureCode>().unwrap(), code);
        }
    }
}
