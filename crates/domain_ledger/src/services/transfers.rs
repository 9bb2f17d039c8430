//! Transfer orchestration
//!
//! ```text
//! validate ─► replay? ─► resolve accounts ─► admit PENDING
//!                                               │
//!              ┌────────────────────────────────┴──────────────┐
//!              ▼ internal                                      ▼ remote
//!   lock transfer, lock accounts (id order)         remote debit (bounded)
//!   debit source, credit destination                   │ failed/timeout ─► FAILED
//!   SUCCEEDED or FAILED, commit                        ▼ debited
//!                                                 lock transfer, lock destination
//!                                                 credit, SUCCEEDED, commit
//! ```
//!
//! Once the remote service has confirmed a debit the transfer is never moved
//! to FAILED because of a local error. It stays PENDING and the
//! reconciliation sweep finishes the credit.

use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use core_kernel::{AccountId, PortError, TransferId, UserId};

use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::events::LedgerEvent;
use crate::idempotency::classify_replay;
use crate::ledger::{EntryReference, Ledger, TransactionType};
use crate::operation::{Admission, FailureCode, OperationStatus};
use crate::ports::{
    EngineStore, EventPublisher, LedgerTx, RemoteDebitOutcome, RemoteDebitRequest, RemoteFundingPort,
};
use crate::services::accounts::AccountService;
use crate::services::publish_best_effort;
use crate::transfer::{FundingSource, Transfer, TransferReceipt, TransferRequest};

/// Executes transfers exactly once per idempotency key
#[derive(Clone)]
pub struct TransferOrchestrator {
    store: Arc<dyn EngineStore>,
    accounts: AccountService,
    remote: Arc<dyn RemoteFundingPort>,
    events: Arc<dyn EventPublisher>,
    config: EngineConfig,
}

impl TransferOrchestrator {
    pub fn new(
        store: Arc<dyn EngineStore>,
        remote: Arc<dyn RemoteFundingPort>,
        events: Arc<dyn EventPublisher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            accounts: AccountService::new(store.clone()),
            store,
            remote,
            events,
            config,
        }
    }

    /// Executes a transfer or replays the stored outcome for its key
    ///
    /// # Errors
    ///
    /// - `Validation`, `AccountNotFound`, `AccountNotOwned` before admission
    /// - `RequestInFlight` / `IdempotencyConflict` for a reused key
    /// - `InsufficientFunds`, `RemoteFundingFailed`, `RemoteTimeout` when the
    ///   transfer ends FAILED
    #[instrument(
        skip(self, request),
        fields(
            key = %request.idempotency_key,
            caller = %request.caller_id,
            destination = %request.destination_account_id,
            amount = %request.amount,
            mode = request.funding.mode_str(),
        )
    )]
    pub async fn execute_transfer(&self, request: TransferRequest) -> Result<TransferReceipt, LedgerError> {
        request.validate()?;

        if let Some(existing) = self.store.find_transfer_by_key(&request.idempotency_key).await? {
            return self.replay(existing, &request).await;
        }

        self.accounts.resolve(request.destination_account_id).await?;
        if let FundingSource::Internal { source_account_id } = &request.funding {
            self.accounts
                .resolve_owned(*source_account_id, &request.caller_id)
                .await?;
        }

        let transfer = match self.store.admit_transfer(&Transfer::pending(&request)).await? {
            Admission::Fresh(transfer) => transfer,
            Admission::Duplicate(existing) => return self.replay(existing, &request).await,
        };
        info!(transfer_id = %transfer.id, "Transfer admitted");

        let settled = match &transfer.funding {
            FundingSource::Internal { source_account_id } => {
                match self.settle_internal(transfer.id, *source_account_id).await {
                    Ok(settled) => settled,
                    Err(e) => return Err(self.fail_after_rollback(transfer.id, e).await),
                }
            }
            FundingSource::Remote { remote_owner_id } => {
                self.fund_remotely(&transfer, remote_owner_id).await?
            }
        };

        self.into_receipt(settled, false).await
    }

    async fn replay(&self, existing: Transfer, request: &TransferRequest) -> Result<TransferReceipt, LedgerError> {
        let existing = classify_replay(existing, request)?;
        info!(
            transfer_id = %existing.id,
            status = %existing.status,
            "Replaying stored transfer outcome"
        );
        self.into_receipt(existing, true).await
    }

    async fn into_receipt(&self, transfer: Transfer, replayed: bool) -> Result<TransferReceipt, LedgerError> {
        match transfer.status {
            OperationStatus::Succeeded => Ok(TransferReceipt { transfer, replayed }),
            OperationStatus::Failed => Err(self.failure_error(&transfer).await),
            OperationStatus::Pending => Err(LedgerError::RequestInFlight {
                key: transfer.idempotency_key.to_string(),
            }),
        }
    }

    /// Rebuilds the caller-facing error of a FAILED transfer
    async fn failure_error(&self, transfer: &Transfer) -> LedgerError {
        let reason = transfer.failure_reason.clone().unwrap_or_default();
        match transfer.failure_code {
            Some(FailureCode::InsufficientFunds) => {
                let Some(source) = transfer.funding.source_account() else {
                    return LedgerError::RemoteFundingFailed(reason);
                };
                match self.store.current_balance(source).await {
                    Ok(balance) => LedgerError::InsufficientFunds {
                        account_id: source,
                        balance,
                        requested: transfer.amount.minor_units(),
                        alternatives: Vec::new(),
                    },
                    Err(e) => e.into(),
                }
            }
            Some(FailureCode::RemoteFundingFailed) => LedgerError::RemoteFundingFailed(reason),
            Some(FailureCode::RemoteTimeout) => LedgerError::RemoteTimeout(reason),
            Some(FailureCode::AccountNotFound) => {
                LedgerError::AccountNotFound(self.missing_account(transfer).await)
            }
            Some(FailureCode::Internal | FailureCode::Abandoned | FailureCode::Unconfirmed) | None => {
                LedgerError::Abandoned(reason)
            }
        }
    }

    /// Which side of a transfer is no longer usable
    async fn missing_account(&self, transfer: &Transfer) -> AccountId {
        if let Some(source) = transfer.funding.source_account() {
            if self.accounts.resolve(source).await.is_err() {
                return source;
            }
        }
        transfer.destination_account_id
    }

    /// Moves money between two accounts in one unit of work
    async fn settle_internal(&self, transfer_id: TransferId, source: AccountId) -> Result<Transfer, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut transfer = tx
            .lock_transfer(transfer_id)
            .await?
            .ok_or_else(|| PortError::not_found("Transfer", transfer_id))?;
        if transfer.is_terminal() {
            return Ok(transfer);
        }

        match Self::move_internal(tx.as_mut(), &transfer, source).await {
            Ok((destination_balance, source_balance)) => {
                transfer.succeed(destination_balance, Some(source_balance))?;
            }
            Err(e) => match business_failure(&e) {
                Some(code) => {
                    warn!(transfer_id = %transfer.id, failure_code = %code, reason = %e, "Transfer rejected");
                    transfer.fail(code, e.to_string())?;
                }
                None => return Err(e),
            },
        }

        tx.save_transfer(&transfer).await?;
        tx.commit().await?;
        self.completed(&transfer).await;
        Ok(transfer)
    }

    async fn move_internal(
        tx: &mut dyn LedgerTx,
        transfer: &Transfer,
        source: AccountId,
    ) -> Result<(i64, i64), LedgerError> {
        let locked = Ledger::lock_all(tx, &[source, transfer.destination_account_id]).await?;
        let (source_account, destination_account) = (&locked[0], &locked[1]);
        source_account.account().ensure_owned_by(&transfer.caller_id)?;
        source_account.account().ensure_active()?;
        destination_account.account().ensure_active()?;

        let reference = Some(EntryReference::Transfer(transfer.id));
        let debit = Ledger::append(
            tx,
            source_account,
            transfer.amount,
            TransactionType::DebitTransferOut,
            reference,
        )
        .await?;
        let credit = Ledger::append(
            tx,
            destination_account,
            transfer.amount,
            TransactionType::CreditTransferIn,
            reference,
        )
        .await?;
        Ok((credit.balance_after, debit.balance_after))
    }

    /// Calls the remote service, then credits the destination
    async fn fund_remotely(&self, transfer: &Transfer, owner_id: &UserId) -> Result<Transfer, LedgerError> {
        let request = RemoteDebitRequest {
            owner_id: owner_id.clone(),
            amount: transfer.amount,
            correlation_id: transfer.id,
        };

        let failure = match tokio::time::timeout(self.config.remote_timeout(), self.remote.debit(&request)).await {
            Ok(Ok(RemoteDebitOutcome::Debited { balance_after })) => {
                info!(transfer_id = %transfer.id, remote_balance_after = ?balance_after, "Remote debit confirmed");
                None
            }
            Ok(Ok(RemoteDebitOutcome::Rejected { reason })) => Some((FailureCode::RemoteFundingFailed, reason)),
            Ok(Err(e)) if e.is_timeout() => Some((FailureCode::RemoteTimeout, e.to_string())),
            Ok(Err(e)) => Some((FailureCode::RemoteFundingFailed, e.to_string())),
            Err(_) => Some((
                FailureCode::RemoteTimeout,
                format!("no answer within {}ms", self.config.remote_timeout_ms),
            )),
        };

        if let Some((code, reason)) = failure {
            warn!(transfer_id = %transfer.id, failure_code = %code, reason = %reason, "Remote funding failed");
            return self.finalize_failure(transfer.id, code, reason).await.map_err(|e| {
                error!(
                    transfer_id = %transfer.id,
                    error = %e,
                    "Could not record remote funding failure; transfer left PENDING for reconciliation"
                );
                e
            });
        }

        match self.credit_destination(transfer.id).await {
            Ok(settled) => {
                if settled.status == OperationStatus::Failed {
                    error!(
                        transfer_id = %settled.id,
                        "Remote debit confirmed for a transfer that was already FAILED; remote side must release it"
                    );
                }
                Ok(settled)
            }
            Err(e) => {
                error!(
                    transfer_id = %transfer.id,
                    error = %e,
                    "Remote debit confirmed but local credit did not commit; transfer left PENDING for reconciliation"
                );
                Err(e)
            }
        }
    }

    /// Credits the destination of a transfer whose funding is confirmed
    ///
    /// A terminal transfer is returned unchanged.
    pub(crate) async fn credit_destination(&self, transfer_id: TransferId) -> Result<Transfer, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut transfer = tx
            .lock_transfer(transfer_id)
            .await?
            .ok_or_else(|| PortError::not_found("Transfer", transfer_id))?;
        if transfer.is_terminal() {
            return Ok(transfer);
        }

        let destination = Ledger::lock(tx.as_mut(), transfer.destination_account_id).await?;
        if !destination.account().is_active {
            warn!(
                transfer_id = %transfer.id,
                account_id = %destination.id(),
                "Destination closed after admission; crediting confirmed funds anyway"
            );
        }
        let credit = Ledger::append(
            tx.as_mut(),
            &destination,
            transfer.amount,
            TransactionType::CreditTransferIn,
            Some(EntryReference::Transfer(transfer.id)),
        )
        .await?;

        transfer.succeed(credit.balance_after, None)?;
        tx.save_transfer(&transfer).await?;
        tx.commit().await?;
        self.completed(&transfer).await;
        Ok(transfer)
    }

    /// Marks a PENDING transfer FAILED; a terminal transfer is returned unchanged
    pub(crate) async fn finalize_failure(
        &self,
        transfer_id: TransferId,
        code: FailureCode,
        reason: String,
    ) -> Result<Transfer, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut transfer = tx
            .lock_transfer(transfer_id)
            .await?
            .ok_or_else(|| PortError::not_found("Transfer", transfer_id))?;
        if transfer.is_terminal() {
            return Ok(transfer);
        }

        transfer.fail(code, reason)?;
        tx.save_transfer(&transfer).await?;
        tx.commit().await?;
        self.completed(&transfer).await;
        Ok(transfer)
    }

    /// Records FAILED after a rolled-back internal settlement
    async fn fail_after_rollback(&self, transfer_id: TransferId, cause: LedgerError) -> LedgerError {
        let reason = format!("settlement rolled back: {}", cause);
        match self.finalize_failure(transfer_id, FailureCode::Internal, reason).await {
            Ok(_) => warn!(transfer_id = %transfer_id, error = %cause, "Transfer failed after rollback"),
            Err(e) => error!(
                transfer_id = %transfer_id,
                error = %e,
                "Could not record transfer failure; transfer left PENDING for reconciliation"
            ),
        }
        cause
    }

    async fn completed(&self, transfer: &Transfer) {
        info!(
            transfer_id = %transfer.id,
            status = %transfer.status,
            failure_code = ?transfer.failure_code,
            destination_balance_after = ?transfer.destination_balance_after,
            "Transfer completed"
        );
        publish_best_effort(self.events.as_ref(), LedgerEvent::transfer_completed(transfer)).await;
    }
}

/// Errors inside a settlement that end the transfer rather than abort it
fn business_failure(error: &LedgerError) -> Option<FailureCode> {
    match error {
        LedgerError::InsufficientFunds { .. } => Some(FailureCode::InsufficientFunds),
        LedgerError::AccountNotFound(_) | LedgerError::AccountNotOwned { .. } => {
            Some(FailureCode::AccountNotFound)
        }
        _ => None,
    }
}
