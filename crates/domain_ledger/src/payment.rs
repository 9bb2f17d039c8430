//! Payments out of an account
//!
//! A payment debits an account the caller owns in favour of an external
//! recipient. The recipient is descriptive only; no money is credited inside
//! the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{AccountId, Amount, PaymentId, UserId};

use crate::error::LedgerError;
use crate::idempotency::{IdempotencyKey, Idempotent};
use crate::operation::{FailureCode, OperationStatus};

/// Who is being paid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientDescriptor {
    pub name: String,
    pub bank: Option<String>,
    pub account_number: Option<String>,
}

impl RecipientDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bank: None,
            account_number: None,
        }
    }
}

/// A caller's request to pay from one of their accounts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub caller_id: UserId,
    pub payer_account_id: AccountId,
    pub amount: Amount,
    pub recipient: RecipientDescriptor,
    pub idempotency_key: IdempotencyKey,
    /// Opaque reference to the checkout session that produced the payment
    pub session_ref: Option<String>,
}

impl PaymentRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.caller_id.is_blank() {
            return Err(LedgerError::validation("caller identity is required"));
        }
        if self.recipient.name.trim().is_empty() {
            return Err(LedgerError::validation("recipient name is required"));
        }
        Ok(())
    }
}

/// A payment row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub idempotency_key: IdempotencyKey,
    pub caller_id: UserId,
    pub payer_account_id: AccountId,
    pub amount: Amount,
    pub recipient: RecipientDescriptor,
    pub session_ref: Option<String>,
    pub status: OperationStatus,
    pub failure_code: Option<FailureCode>,
    pub failure_reason: Option<String>,
    pub balance_after: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn pending(request: &PaymentRequest) -> Self {
        Self {
            id: PaymentId::new_v7(),
            idempotency_key: request.idempotency_key.clone(),
            caller_id: request.caller_id.clone(),
            payer_account_id: request.payer_account_id,
            amount: request.amount,
            recipient: request.recipient.clone(),
            session_ref: request.session_ref.clone(),
            status: OperationStatus::Pending,
            failure_code: None,
            failure_reason: None,
            balance_after: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn succeed(&mut self, balance_after: i64) -> Result<(), LedgerError> {
        self.ensure_pending("SUCCEEDED")?;
        self.status = OperationStatus::Succeeded;
        self.balance_after = Some(balance_after);
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
                "payment {} is {} and cannot become {}",
                self.id, self.status, target
            )));
        }
        Ok(())
    }
}

impl Idempotent for Payment {
    type Request = PaymentRequest;

    fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    fn status(&self) -> OperationStatus {
        self.status
    }

    fn caller(&self) -> &UserId {
        &self.caller_id
    }

    fn matches(&self, request: &PaymentRequest) -> bool {
        self.caller_id == request.caller_id
            && self.payer_account_id == request.payer_account_id
            && self.amount == request.amount
            && self.recipient == request.recipient
    }
}

/// Answer returned to the caller of a payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub replayed: bool,
}
