//! Conversions between rows and domain types
//!
//! Stored enumerations are TEXT; a value that no longer parses is reported as
//! a transformation error rather than silently defaulted.

use std::str::FromStr;

use core_kernel::{AccountId, Amount, PaymentId, PortError, TransferId, UserId};
use domain_ledger::history::transfer_counterparty;
use domain_ledger::{
    Account, AccountKind, EntryId, EntryReference, FailureCode, FundingSource, HistoryItem, HistoryKind,
    IdempotencyKey, LedgerEntry, NewLedgerEntry, OperationStatus, Payment, RecipientDescriptor,
    TransactionType, Transfer,
};

use crate::repositories::{AccountRow, EntryRow, HistoryRow, NewEntryRow, PaymentRow, TransferRow};

fn corrupt(what: &str, detail: impl std::fmt::Display) -> PortError {
    PortError::transformation(format!("stored {} is invalid: {}", what, detail))
}

fn amount(value: i64) -> Result<Amount, PortError> {
    Amount::new(value).map_err(|e| corrupt("amount", e))
}

fn key(value: String) -> Result<IdempotencyKey, PortError> {
    IdempotencyKey::parse(value).map_err(|e| corrupt("idempotency key", e))
}

fn failure_code(value: Option<String>) -> Result<Option<FailureCode>, PortError> {
    value.as_deref().map(FailureCode::from_str).transpose()
}

pub(crate) fn account_to_row(account: &Account) -> AccountRow {
    AccountRow {
        account_id: *account.id.as_uuid(),
        owner_id: account.owner_id.as_str().to_string(),
        kind: account.kind.as_str().to_string(),
        is_active: account.is_active,
        created_at: account.created_at,
    }
}

pub(crate) fn row_to_account(row: AccountRow) -> Result<Account, PortError> {
    Ok(Account {
        id: AccountId::from_uuid(row.account_id),
        owner_id: UserId::new(row.owner_id),
        kind: AccountKind::from_str(&row.kind).map_err(|e| corrupt("account kind", e))?,
        is_active: row.is_active,
        created_at: row.created_at,
    })
}

pub(crate) fn entry_to_row(entry: &NewLedgerEntry) -> NewEntryRow {
    NewEntryRow {
        account_id: *entry.account_id.as_uuid(),
        transaction_type: entry.transaction_type.as_str().to_string(),
        amount: entry.amount,
        balance_after: entry.balance_after,
        reference_kind: entry.reference.map(|r| r.kind_str().to_string()),
        reference_id: entry.reference.map(|r| r.uuid()),
        created_at: entry.created_at,
    }
}

pub(crate) fn row_to_entry(row: EntryRow) -> Result<LedgerEntry, PortError> {
    Ok(LedgerEntry {
        id: EntryId::new(row.entry_id),
        account_id: AccountId::from_uuid(row.account_id),
        transaction_type: TransactionType::from_str(&row.transaction_type)?,
        amount: row.amount,
        balance_after: row.balance_after,
        reference: EntryReference::from_parts(row.reference_kind.as_deref(), row.reference_id)?,
        created_at: row.created_at,
    })
}

pub(crate) fn transfer_to_row(transfer: &Transfer) -> TransferRow {
    let (source_account_id, remote_owner_id) = match &transfer.funding {
        FundingSource::Internal { source_account_id } => (Some(*source_account_id.as_uuid()), None),
        FundingSource::Remote { remote_owner_id } => (None, Some(remote_owner_id.as_str().to_string())),
    };
    TransferRow {
        transfer_id: *transfer.id.as_uuid(),
        idempotency_key: transfer.idempotency_key.as_str().to_string(),
        caller_id: transfer.caller_id.as_str().to_string(),
        funding_kind: transfer.funding.mode_str().to_string(),
        source_account_id,
        remote_owner_id,
        destination_account_id: *transfer.destination_account_id.as_uuid(),
        amount: transfer.amount.minor_units(),
        status: transfer.status.as_str().to_string(),
        failure_code: transfer.failure_code.map(|c| c.as_str().to_string()),
        failure_reason: transfer.failure_reason.clone(),
        destination_balance_after: transfer.destination_balance_after,
        source_balance_after: transfer.source_balance_after,
        created_at: transfer.created_at,
        completed_at: transfer.completed_at,
    }
}

fn funding(
    kind: &str,
    source_account_id: Option<uuid::Uuid>,
    remote_owner_id: Option<String>,
) -> Result<FundingSource, PortError> {
    match (kind, source_account_id, remote_owner_id) {
        ("INTERNAL", Some(source), _) => Ok(FundingSource::Internal {
            source_account_id: AccountId::from_uuid(source),
        }),
        ("REMOTE", _, Some(owner)) => Ok(FundingSource::Remote {
            remote_owner_id: UserId::new(owner),
        }),
        (kind, _, _) => Err(corrupt("funding", format!("mode '{}' without its column", kind))),
    }
}

pub(crate) fn row_to_transfer(row: TransferRow) -> Result<Transfer, PortError> {
    Ok(Transfer {
        id: TransferId::from_uuid(row.transfer_id),
        idempotency_key: key(row.idempotency_key)?,
        caller_id: UserId::new(row.caller_id),
        funding: funding(&row.funding_kind, row.source_account_id, row.remote_owner_id)?,
        destination_account_id: AccountId::from_uuid(row.destination_account_id),
        amount: amount(row.amount)?,
        status: OperationStatus::from_str(&row.status)?,
        failure_code: failure_code(row.failure_code)?,
        failure_reason: row.failure_reason,
        destination_balance_after: row.destination_balance_after,
        source_balance_after: row.source_balance_after,
        created_at: row.created_at,
        completed_at: row.completed_at,
    })
}

pub(crate) fn payment_to_row(payment: &Payment) -> PaymentRow {
    PaymentRow {
        payment_id: *payment.id.as_uuid(),
        idempotency_key: payment.idempotency_key.as_str().to_string(),
        caller_id: payment.caller_id.as_str().to_string(),
        payer_account_id: *payment.payer_account_id.as_uuid(),
        amount: payment.amount.minor_units(),
        recipient_name: payment.recipient.name.clone(),
        recipient_bank: payment.recipient.bank.clone(),
        recipient_account_number: payment.recipient.account_number.clone(),
        session_ref: payment.session_ref.clone(),
        status: payment.status.as_str().to_string(),
        failure_code: payment.failure_code.map(|c| c.as_str().to_string()),
        failure_reason: payment.failure_reason.clone(),
        balance_after: payment.balance_after,
        created_at: payment.created_at,
        completed_at: payment.completed_at,
    }
}

pub(crate) fn row_to_payment(row: PaymentRow) -> Result<Payment, PortError> {
    Ok(Payment {
        id: PaymentId::from_uuid(row.payment_id),
        idempotency_key: key(row.idempotency_key)?,
        caller_id: UserId::new(row.caller_id),
        payer_account_id: AccountId::from_uuid(row.payer_account_id),
        amount: amount(row.amount)?,
        recipient: RecipientDescriptor {
            name: row.recipient_name,
            bank: row.recipient_bank,
            account_number: row.recipient_account_number,
        },
        session_ref: row.session_ref,
        status: OperationStatus::from_str(&row.status)?,
        failure_code: failure_code(row.failure_code)?,
        failure_reason: row.failure_reason,
        balance_after: row.balance_after,
        created_at: row.created_at,
        completed_at: row.completed_at,
    })
}

pub(crate) fn row_to_history_item(row: HistoryRow, kind: HistoryKind) -> Result<HistoryItem, PortError> {
    let transaction_type = TransactionType::from_str(&row.transaction_type)?;
    let counterparty = match kind {
        HistoryKind::Payment => row.recipient_name,
        HistoryKind::Transfer => match (row.funding_kind, row.destination_account_id) {
            (Some(funding_kind), Some(destination)) => {
                let source = funding(&funding_kind, row.source_account_id, row.remote_owner_id)?;
                Some(transfer_counterparty(
                    transaction_type,
                    &source,
                    AccountId::from_uuid(destination),
                ))
            }
            _ => None,
        },
    };
    Ok(HistoryItem {
        entry_id: EntryId::new(row.entry_id),
        kind,
        transaction_type,
        amount: row.amount,
        balance_after: row.balance_after,
        reference_id: row.reference_id,
        counterparty,
        created_at: row.created_at,
    })
}
