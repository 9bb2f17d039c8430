//! Payment orchestration
//!
//! A payment is a single debit of the payer's account. Admission, the debit
//! and the terminal status are ordered exactly like an internal transfer: the
//! payment row is locked first, then the payer account.

use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use core_kernel::{PaymentId, PortError};

use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::events::LedgerEvent;
use crate::idempotency::classify_replay;
use crate::ledger::{EntryReference, Ledger, TransactionType};
use crate::operation::{Admission, FailureCode, OperationStatus};
use crate::payment::{Payment, PaymentReceipt, PaymentRequest};
use crate::ports::{EngineStore, EventPublisher, LedgerTx};
use crate::services::accounts::AccountService;
use crate::services::publish_best_effort;

/// Executes payments exactly once per idempotency key
#[derive(Clone)]
pub struct PaymentOrchestrator {
    store: Arc<dyn EngineStore>,
    accounts: AccountService,
    events: Arc<dyn EventPublisher>,
    config: EngineConfig,
}

impl PaymentOrchestrator {
    pub fn new(store: Arc<dyn EngineStore>, events: Arc<dyn EventPublisher>, config: EngineConfig) -> Self {
        Self {
            accounts: AccountService::new(store.clone()),
            store,
            events,
            config,
        }
    }

    /// Executes a payment or replays the stored outcome for its key
    ///
    /// On `InsufficientFunds` the error lists other accounts of the caller
    /// that could cover the amount.
    #[instrument(
        skip(self, request),
        fields(
            key = %request.idempotency_key,
            caller = %request.caller_id,
            payer = %request.payer_account_id,
            amount = %request.amount,
        )
    )]
    pub async fn execute_payment(&self, request: PaymentRequest) -> Result<PaymentReceipt, LedgerError> {
        request.validate()?;

        if let Some(existing) = self.store.find_payment_by_key(&request.idempotency_key).await? {
            return self.replay(existing, &request).await;
        }

        self.accounts
            .resolve_owned(request.payer_account_id, &request.caller_id)
            .await?;

        let payment = match self.store.admit_payment(&Payment::pending(&request)).await? {
            Admission::Fresh(payment) => payment,
            Admission::Duplicate(existing) => return self.replay(existing, &request).await,
        };
        info!(payment_id = %payment.id, "Payment admitted");

        let settled = match self.settle(payment.id).await {
            Ok(settled) => settled,
            Err(cause) => {
                let reason = format!("settlement rolled back: {}", cause);
                match self.finalize_failure(payment.id, FailureCode::Internal, reason).await {
                    Ok(_) => warn!(payment_id = %payment.id, error = %cause, "Payment failed after rollback"),
                    Err(e) => error!(
                        payment_id = %payment.id,
                        error = %e,
                        "Could not record payment failure; payment left PENDING for reconciliation"
                    ),
                }
                return Err(cause);
            }
        };

        self.into_receipt(settled, false).await
    }

    async fn replay(&self, existing: Payment, request: &PaymentRequest) -> Result<PaymentReceipt, LedgerError> {
        let existing = classify_replay(existing, request)?;
        info!(
            payment_id = %existing.id,
            status = %existing.status,
            "Replaying stored payment outcome"
        );
        self.into_receipt(existing, true).await
    }

    async fn into_receipt(&self, payment: Payment, replayed: bool) -> Result<PaymentReceipt, LedgerError> {
        match payment.status {
            OperationStatus::Succeeded => Ok(PaymentReceipt { payment, replayed }),
            OperationStatus::Failed => Err(self.failure_error(&payment).await),
            OperationStatus::Pending => Err(LedgerError::RequestInFlight {
                key: payment.idempotency_key.to_string(),
            }),
        }
    }

    /// Rebuilds the caller-facing error of a FAILED payment
    ///
    /// Balance and alternatives reflect the state at the time of the call.
    async fn failure_error(&self, payment: &Payment) -> LedgerError {
        let reason = payment.failure_reason.clone().unwrap_or_default();
        match payment.failure_code {
            Some(FailureCode::InsufficientFunds) => {
                let balance = match self.store.current_balance(payment.payer_account_id).await {
                    Ok(balance) => balance,
                    Err(e) => return e.into(),
                };
                let alternatives = match self
                    .accounts
                    .alternatives(
                        &payment.caller_id,
                        payment.payer_account_id,
                        payment.amount,
                        self.config.alternative_account_limit,
                    )
                    .await
                {
                    Ok(alternatives) => alternatives,
                    Err(e) => {
                        warn!(payment_id = %payment.id, error = %e, "Could not compute alternative accounts");
                        Vec::new()
                    }
                };
                LedgerError::InsufficientFunds {
                    account_id: payment.payer_account_id,
                    balance,
                    requested: payment.amount.minor_units(),
                    alternatives,
                }
            }
            Some(FailureCode::AccountNotFound) => LedgerError::AccountNotFound(payment.payer_account_id),
            Some(FailureCode::RemoteFundingFailed) => LedgerError::RemoteFundingFailed(reason),
            Some(FailureCode::RemoteTimeout) => LedgerError::RemoteTimeout(reason),
            Some(FailureCode::Internal | FailureCode::Abandoned | FailureCode::Unconfirmed) | None => {
                LedgerError::Abandoned(reason)
            }
        }
    }

    async fn settle(&self, payment_id: PaymentId) -> Result<Payment, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut payment = tx
            .lock_payment(payment_id)
            .await?
            .ok_or_else(|| PortError::not_found("Payment", payment_id))?;
        if payment.is_terminal() {
            return Ok(payment);
        }

        match Self::debit_payer(tx.as_mut(), &payment).await {
            Ok(balance_after) => payment.succeed(balance_after)?,
            Err(e @ LedgerError::InsufficientFunds { .. }) => {
                warn!(payment_id = %payment.id, reason = %e, "Payment rejected");
                payment.fail(FailureCode::InsufficientFunds, e.to_string())?;
            }
            Err(e @ (LedgerError::AccountNotFound(_) | LedgerError::AccountNotOwned { .. })) => {
                warn!(payment_id = %payment.id, reason = %e, "Payment rejected");
                payment.fail(FailureCode::AccountNotFound, e.to_string())?;
            }
            Err(e) => return Err(e),
        }

        tx.save_payment(&payment).await?;
        tx.commit().await?;
        self.completed(&payment).await;
        Ok(payment)
    }

    async fn debit_payer(tx: &mut dyn LedgerTx, payment: &Payment) -> Result<i64, LedgerError> {
        let payer = Ledger::lock(tx, payment.payer_account_id).await?;
        payer.account().ensure_owned_by(&payment.caller_id)?;
        payer.account().ensure_active()?;
        let entry = Ledger::append(
            tx,
            &payer,
            payment.amount,
            TransactionType::DebitPayment,
            Some(EntryReference::Payment(payment.id)),
        )
        .await?;
        Ok(entry.balance_after)
    }

    /// Marks a PENDING payment FAILED; a terminal payment is returned unchanged
    pub(crate) async fn finalize_failure(
        &self,
        payment_id: PaymentId,
        code: FailureCode,
        reason: String,
    ) -> Result<Payment, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut payment = tx
            .lock_payment(payment_id)
            .await?
            .ok_or_else(|| PortError::not_found("Payment", payment_id))?;
        if payment.is_terminal() {
            return Ok(payment);
        }

        payment.fail(code, reason)?;
        tx.save_payment(&payment).await?;
        tx.commit().await?;
        self.completed(&payment).await;
        Ok(payment)
    }

    async fn completed(&self, payment: &Payment) {
        info!(
            payment_id = %payment.id,
            status = %payment.status,
            failure_code = ?payment.failure_code,
            balance_after = ?payment.balance_after,
            "Payment completed"
        );
        publish_best_effort(self.events.as_ref(), LedgerEvent::payment_completed(payment)).await;
    }
}
