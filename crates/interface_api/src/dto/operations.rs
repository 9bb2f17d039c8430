//! Transfer and payment DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{AccountId, Amount, UserId};
use domain_ledger::error::codes;
use domain_ledger::{
    FailureCode, FundingSource, IdempotencyKey, LedgerError, OperationStatus, PaymentReceipt, PaymentRequest,
    RecipientDescriptor, TransferReceipt, TransferRequest,
};

/// Funding side of a transfer request
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundingRequest {
    Internal {
        #[serde(rename = "sourceAccountId")]
        source_account_id: AccountId,
    },
    /// Remote owner defaults to the caller and must equal it when given
    Remote {
        #[serde(rename = "remoteOwnerId", default)]
        remote_owner_id: Option<String>,
    },
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransferRequest {
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: String,
    pub destination_account_id: AccountId,
    #[validate(range(min = 1))]
    pub amount: i64,
    pub funding: FundingRequest,
}

impl CreateTransferRequest {
    pub fn into_request(self, caller_id: UserId) -> Result<TransferRequest, LedgerError> {
        let funding = match self.funding {
            FundingRequest::Internal { source_account_id } => FundingSource::Internal { source_account_id },
            FundingRequest::Remote { remote_owner_id } => FundingSource::Remote {
                remote_owner_id: remote_owner_id.map(UserId::new).unwrap_or_else(|| caller_id.clone()),
            },
        };

        Ok(TransferRequest {
            caller_id,
            destination_account_id: self.destination_account_id,
            amount: Amount::new(self.amount)?,
            funding,
            idempotency_key: IdempotencyKey::parse(self.idempotency_key)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub transfer_id: Uuid,
    pub status: OperationStatus,
    pub amount: i64,
    pub destination_account_id: AccountId,
    pub funding_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_account_id: Option<AccountId>,
    pub destination_balance_after: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_balance_after: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub replayed: bool,
    /// `DUPLICATE_REQUEST` on a replay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<TransferReceipt> for TransferResponse {
    fn from(receipt: TransferReceipt) -> Self {
        let transfer = receipt.transfer;
        Self {
            transfer_id: *transfer.id.as_uuid(),
            status: transfer.status,
            amount: transfer.amount.minor_units(),
            destination_account_id: transfer.destination_account_id,
            funding_mode: transfer.funding.mode_str().to_string(),
            source_account_id: transfer.funding.source_account(),
            destination_balance_after: transfer.destination_balance_after,
            source_balance_after: transfer.source_balance_after,
            created_at: transfer.created_at,
            completed_at: transfer.completed_at,
            replayed: receipt.replayed,
            code: replay_code(receipt.replayed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecipientDto {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 100))]
    pub bank: Option<String>,
    #[validate(length(max = 64))]
    pub account_number: Option<String>,
}

impl From<RecipientDto> for RecipientDescriptor {
    fn from(dto: RecipientDto) -> Self {
        RecipientDescriptor {
            name: dto.name,
            bank: dto.bank,
            account_number: dto.account_number,
        }
    }
}

impl From<RecipientDescriptor> for RecipientDto {
    fn from(recipient: RecipientDescriptor) -> Self {
        RecipientDto {
            name: recipient.name,
            bank: recipient.bank,
            account_number: recipient.account_number,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: String,
    pub payer_account_id: AccountId,
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(nested)]
    pub recipient: RecipientDto,
    pub session_ref: Option<String>,
}

impl CreatePaymentRequest {
    pub fn into_request(self, caller_id: UserId) -> Result<PaymentRequest, LedgerError> {
        Ok(PaymentRequest {
            caller_id,
            payer_account_id: self.payer_account_id,
            amount: Amount::new(self.amount)?,
            recipient: self.recipient.into(),
            idempotency_key: IdempotencyKey::parse(self.idempotency_key)?,
            session_ref: self.session_ref,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub payment_id: Uuid,
    pub status: OperationStatus,
    pub payer_account_id: AccountId,
    pub amount: i64,
    pub recipient: RecipientDto,
    pub balance_after: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<FailureCode>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub replayed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<PaymentReceipt> for PaymentResponse {
    fn from(receipt: PaymentReceipt) -> Self {
        let payment = receipt.payment;
        Self {
            payment_id: *payment.id.as_uuid(),
            status: payment.status,
            payer_account_id: payment.payer_account_id,
            amount: payment.amount.minor_units(),
            recipient: payment.recipient.into(),
            balance_after: payment.balance_after,
            session_ref: payment.session_ref,
            failure_code: payment.failure_code,
            created_at: payment.created_at,
            completed_at: payment.completed_at,
            replayed: receipt.replayed,
            code: replay_code(receipt.replayed),
        }
    }
}

fn replay_code(replayed: bool) -> Option<String> {
    replayed.then(|| codes::DUPLICATE_REQUEST.to_string())
}
