//! Reconciliation of stuck operations
//!
//! A transfer or payment still PENDING after the stale threshold was
//! interrupted between admission and its terminal write. The sweep finishes
//! it using only the row locks the orchestrators use, so a sweep racing a
//! live request resolves the row exactly once.
//!
//! | row                          | action                                   |
//! |------------------------------|------------------------------------------|
//! | payment                      | FAILED (ABANDONED)                       |
//! | internal transfer            | FAILED (ABANDONED)                       |
//! | remote transfer, DEBITED     | credit destination, SUCCEEDED            |
//! | remote transfer, NOT_DEBITED | FAILED (ABANDONED)                       |
//! | remote transfer, UNKNOWN     | FAILED (UNCONFIRMED), logged as error    |
//! | remote status unavailable    | skipped until the next sweep             |
//!
//! Rows are read in `(created_at, id)` pages so skipped rows never hide newer
//! ones. Every account referenced by an examined row is then audited against
//! the sum of its entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use core_kernel::AccountId;
use tracing::{error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::operation::{FailureCode, OperationStatus};
use crate::payment::Payment;
use crate::ports::{EngineStore, RemoteDebitStatus, RemoteFundingPort};
use crate::services::accounts::AccountService;
use crate::services::payments::PaymentOrchestrator;
use crate::services::transfers::TransferOrchestrator;
use crate::transfer::{FundingSource, Transfer};

/// Counts from one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Audited accounts whose cached balance disagrees with their entries
    pub divergent: usize,
}

impl SweepReport {
    fn record(&mut self, status: OperationStatus) {
        match status {
            OperationStatus::Succeeded => self.succeeded += 1,
            OperationStatus::Failed => self.failed += 1,
            OperationStatus::Pending => self.skipped += 1,
        }
    }
}

/// Periodic resolver for stale PENDING rows
#[derive(Clone)]
pub struct ReconciliationSweep {
    store: Arc<dyn EngineStore>,
    remote: Arc<dyn RemoteFundingPort>,
    accounts: AccountService,
    transfers: TransferOrchestrator,
    payments: PaymentOrchestrator,
    config: EngineConfig,
}

impl ReconciliationSweep {
    pub fn new(
        store: Arc<dyn EngineStore>,
        remote: Arc<dyn RemoteFundingPort>,
        transfers: TransferOrchestrator,
        payments: PaymentOrchestrator,
        config: EngineConfig,
    ) -> Self {
        Self {
            accounts: AccountService::new(store.clone()),
            store,
            remote,
            transfers,
            payments,
            config,
        }
    }

    /// Resolves rows that were PENDING before `now - stale_threshold`
    #[instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport, LedgerError> {
        let cutoff = now - self.config.stale_threshold();
        let batch = self.config.sweep_batch_size;
        let mut report = SweepReport::default();
        let mut touched = BTreeSet::new();

        let mut after = None;
        loop {
            let page = self.store.stale_transfers(cutoff, after, batch).await?;
            let full = page.len() == batch;
            after = page.last().map(|t| (t.created_at, t.id));
            for transfer in page {
                report.examined += 1;
                touched.insert(transfer.destination_account_id);
                touched.extend(transfer.funding.source_account());
                let transfer_id = transfer.id;
                match self.resolve_transfer(transfer).await {
                    Ok(status) => report.record(status),
                    Err(e) => {
                        warn!(transfer_id = %transfer_id, error = %e, "Could not reconcile transfer");
                        report.skipped += 1;
                    }
                }
            }
            if !full {
                break;
            }
        }

        let mut after = None;
        loop {
            let page = self.store.stale_payments(cutoff, after, batch).await?;
            let full = page.len() == batch;
            after = page.last().map(|p| (p.created_at, p.id));
            for payment in page {
                report.examined += 1;
                touched.insert(payment.payer_account_id);
                let payment_id = payment.id;
                match self.resolve_payment(payment).await {
                    Ok(status) => report.record(status),
                    Err(e) => {
                        warn!(payment_id = %payment_id, error = %e, "Could not reconcile payment");
                        report.skipped += 1;
                    }
                }
            }
            if !full {
                break;
            }
        }

        report.divergent = self.audit_accounts(touched).await;

        if report.examined > 0 {
            info!(
                examined = report.examined,
                succeeded = report.succeeded,
                failed = report.failed,
                skipped = report.skipped,
                divergent = report.divergent,
                "Reconciliation sweep finished"
            );
        }
        Ok(report)
    }

    /// Audits each account and returns how many diverged
    async fn audit_accounts(&self, accounts: BTreeSet<AccountId>) -> usize {
        let mut divergent = 0;
        for account_id in accounts {
            match self.accounts.audit_balance(account_id).await {
                Ok(audit) if !audit.is_consistent() => divergent += 1,
                Ok(_) => {}
                Err(e) => warn!(account_id = %account_id, error = %e, "Could not audit balance"),
            }
        }
        divergent
    }

    async fn resolve_transfer(&self, transfer: Transfer) -> Result<OperationStatus, LedgerError> {
        if let FundingSource::Internal { .. } = transfer.funding {
            let resolved = self
                .transfers
                .finalize_failure(
                    transfer.id,
                    FailureCode::Abandoned,
                    "no terminal write before the stale threshold".to_string(),
                )
                .await?;
            return Ok(resolved.status);
        }

        let status = match tokio::time::timeout(
            self.config.remote_timeout(),
            self.remote.debit_status(transfer.id),
        )
        .await
        {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!(transfer_id = %transfer.id, error = %e, "Remote status unavailable; will retry");
                return Ok(OperationStatus::Pending);
            }
            Err(_) => {
                warn!(transfer_id = %transfer.id, "Remote status lookup timed out; will retry");
                return Ok(OperationStatus::Pending);
            }
        };

        let resolved = match status {
            RemoteDebitStatus::Debited => self.transfers.credit_destination(transfer.id).await?,
            RemoteDebitStatus::NotDebited => {
                self.transfers
                    .finalize_failure(
                        transfer.id,
                        FailureCode::Abandoned,
                        "remote service has no debit for this transfer".to_string(),
                    )
                    .await?
            }
            RemoteDebitStatus::Unknown => {
                error!(
                    transfer_id = %transfer.id,
                    amount = %transfer.amount,
                    "Remote service cannot confirm debit; failing transfer for manual review"
                );
                self.transfers
                    .finalize_failure(
                        transfer.id,
                        FailureCode::Unconfirmed,
                        "remote debit could not be confirmed".to_string(),
                    )
                    .await?
            }
        };
        Ok(resolved.status)
    }

    async fn resolve_payment(&self, payment: Payment) -> Result<OperationStatus, LedgerError> {
        let resolved = self
            .payments
            .finalize_failure(
                payment.id,
                FailureCode::Abandoned,
                "no terminal write before the stale threshold".to_string(),
            )
            .await?;
        Ok(resolved.status)
    }

    /// Runs the sweep forever at the configured interval
    pub async fn run_forever(self) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once(Utc::now()).await {
                error!(error = %e, "Reconciliation sweep failed");
            }
        }
    }
}
