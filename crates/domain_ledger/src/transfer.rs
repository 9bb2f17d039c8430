//! Transfers into an account
//!
//! A transfer credits a destination account, funded either by another
//! account the caller owns (internal) or by a debit at the remote funding
//! service (remote). Each transfer is admitted as PENDING under its
//! idempotency key and moves to exactly one terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{AccountId, Amount, TransferId, UserId};

use crate::error::LedgerError;
use crate::idempotency::{IdempotencyKey, Idempotent};
use crate::operation::{FailureCode, OperationStatus};

/// Where the money for a transfer comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundingSource {
    /// Another account owned by the caller
    Internal { source_account_id: AccountId },
    /// The caller's balance at the remote funding service
    Remote { remote_owner_id: UserId },
}

impl FundingSource {
    pub fn mode_str(&self) -> &'static str {
        match self {
            FundingSource::Internal { .. } => "INTERNAL",
            FundingSource::Remote { .. } => "REMOTE",
        }
    }

    pub fn source_account(&self) -> Option<AccountId> {
        match self {
            FundingSource::Internal { source_account_id } => Some(*source_account_id),
            FundingSource::Remote { .. } => None,
        }
    }
}

/// A caller's request to move money into an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub caller_id: UserId,
    pub destination_account_id: AccountId,
    pub amount: Amount,
    pub funding: FundingSource,
    pub idempotency_key: IdempotencyKey,
}

impl TransferRequest {
    /// Checks that need no storage access
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.caller_id.is_blank() {
            return Err(LedgerError::validation("caller identity is required"));
        }
        match &self.funding {
            FundingSource::Internal { source_account_id } if *source_account_id == self.destination_account_id => {
                Err(LedgerError::validation("source and destination accounts must differ"))
            }
            FundingSource::Remote { remote_owner_id } if remote_owner_id.is_blank() => {
                Err(LedgerError::validation("remote owner is required"))
            }
            FundingSource::Remote { remote_owner_id } if *remote_owner_id != self.caller_id => {
                Err(LedgerError::validation("remote funding must come from the caller's own balance"))
            }
            _ => Ok(()),
        }
    }
}

/// A transfer row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub idempotency_key: IdempotencyKey,
    pub caller_id: UserId,
    pub funding: FundingSource,
    pub destination_account_id: AccountId,
    pub amount: Amount,
    pub status: OperationStatus,
    pub failure_code: Option<FailureCode>,
    pub failure_reason: Option<String>,
    pub destination_balance_after: Option<i64>,
    pub source_balance_after: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// Builds the PENDING row admitted for a request
    pub fn pending(request: &TransferRequest) -> Self {
        Self {
            id: TransferId::new_v7(),
            idempotency_key: request.idempotency_key.clone(),
            caller_id: request.caller_id.clone(),
            funding: request.funding.clone(),
            destination_account_id: request.destination_account_id,
            amount: request.amount,
            status: OperationStatus::Pending,
            failure_code: None,
            failure_reason: None,
            destination_balance_after: None,
            source_balance_after: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn succeed(&mut self, destination_balance_after: i64, source_balance_after: Option<i64>) -> Result<(), LedgerError> {
        self.ensure_pending("SUCCEEDED")?;
        self.status = OperationStatus::Succeeded;
        self.destination_balance_after = Some(destination_balance_after);
        self.source_balance_after = source_balance_after;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, code: FailureCode, reason: impl Into<String>) -> Result<(), LedgerError> {
        self.ensure_pending("FAILED")?;
        self.status = OperationStatus::Failed;
        self.failure_code = Some(code);
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn ensure_pending(&self, target: &str) -> Result<(), LedgerError> {
        if self.is_terminal() {
            return Err(LedgerError::InvalidStateTransition(format!(
                "transfer {} is {} and cannot become {}",
                self.id, self.status, target
            )));
        }
        Ok(())
    }
}

impl Idempotent for Transfer {
    type Request = TransferRequest;

    fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    fn status(&self) -> OperationStatus {
        self.status
    }

    fn caller(&self) -> &UserId {
        &self.caller_id
    }

    fn matches(&self, request: &TransferRequest) -> bool {
        self.caller_id == request.caller_id
            && self.destination_account_id == request.destination_account_id
            && self.amount == request.amount
            && self.funding == request.funding
    }
}

/// Answer returned to the caller of a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub transfer: Transfer,
    /// True if this is the stored outcome of an earlier request
    pub replayed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::classify_replay;

    fn request() -> TransferRequest {
        TransferRequest {
            caller_id: UserId::new("alice"),
            destination_account_id: AccountId::new(),
            amount: Amount::new(50_000).unwrap(),
            funding: FundingSource::Remote {
                remote_owner_id: UserId::new("alice"),
            },
            idempotency_key: IdempotencyKey::parse("t-1").unwrap(),
        }
    }

    #[test]
    fn test_pending_then_succeed() {
        let mut transfer = Transfer::pending(&request());
        assert_eq!(transfer.status, OperationStatus::Pending);
        transfer.succeed(50_000, None).unwrap();
        assert_eq!(transfer.status, OperationStatus::Succeeded);
        assert_eq!(transfer.destination_balance_after, Some(50_000));
        assert!(transfer.completed_at.is_some());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut transfer = Transfer::pending(&request());
        transfer.fail(FailureCode::RemoteFundingFailed, "declined").unwrap();
        assert!(matches!(
            transfer.succeed(1, None),
            Err(LedgerError::InvalidStateTransition(_))
        ));
        assert!(transfer.fail(FailureCode::Internal, "again").is_err());
        assert_eq!(transfer.failure_code, Some(FailureCode::RemoteFundingFailed));
    }

    #[test]
    fn test_same_account_internal_transfer_rejected() {
        let mut req = request();
        req.funding = FundingSource::Internal {
            source_account_id: req.destination_account_id,
        };
        assert!(matches!(req.validate(), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_remote_funding_from_another_owner_rejected() {
        let mut req = request();
        req.funding = FundingSource::Remote {
            remote_owner_id: UserId::new("bob"),
        };
        assert!(matches!(req.validate(), Err(LedgerError::Validation(_))));
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_replay_classification() {
        let req = request();
        let pending = Transfer::pending(&req);
        assert!(matches!(
            classify_replay(pending.clone(), &req),
            Err(LedgerError::RequestInFlight { .. })
        ));

        let mut other = req.clone();
        other.amount = Amount::new(1).unwrap();
        assert!(matches!(
            classify_replay(pending.clone(), &other),
            Err(LedgerError::IdempotencyConflict { .. })
        ));

        let mut done = pending;
        done.succeed(50_000, None).unwrap();
        assert_eq!(classify_replay(done.clone(), &req).unwrap(), done);
    }
}
