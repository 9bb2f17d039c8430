//! Composition root for the ledger services

use std::sync::Arc;

use core_kernel::{CoreError, HealthCheckResult};

use crate::config::EngineConfig;
use crate::ports::{EngineStore, EventPublisher, RemoteFundingPort};
use crate::services::{
    AccountService, HistoryCursorQuery, PaymentOrchestrator, ReconciliationSweep, TransferOrchestrator,
};

/// All ledger services wired to one set of adapters
#[derive(Clone)]
pub struct LedgerEngine {
    pub accounts: AccountService,
    pub transfers: TransferOrchestrator,
    pub payments: PaymentOrchestrator,
    pub history: HistoryCursorQuery,
    pub reconciliation: ReconciliationSweep,
    store: Arc<dyn EngineStore>,
    remote: Arc<dyn RemoteFundingPort>,
    config: EngineConfig,
}

impl LedgerEngine {
    /// Builds the engine after validating `config`
    pub fn new(
        store: Arc<dyn EngineStore>,
        remote: Arc<dyn RemoteFundingPort>,
        events: Arc<dyn EventPublisher>,
        config: EngineConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let transfers = TransferOrchestrator::new(store.clone(), remote.clone(), events.clone(), config.clone());
        let payments = PaymentOrchestrator::new(store.clone(), events, config.clone());
        let reconciliation = ReconciliationSweep::new(
            store.clone(),
            remote.clone(),
            transfers.clone(),
            payments.clone(),
            config.clone(),
        );

        Ok(Self {
            accounts: AccountService::new(store.clone()),
            history: HistoryCursorQuery::new(store.clone(), config.clone()),
            transfers,
            payments,
            reconciliation,
            store,
            remote,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Health of storage and of the remote funding service
    pub async fn health(&self) -> Vec<HealthCheckResult> {
        vec![self.store.health_check().await, self.remote.health_check().await]
    }

    /// Ready when storage is operational; a degraded remote only limits remote transfers
    pub async fn is_ready(&self) -> bool {
        self.store.health_check().await.is_operational()
    }
}
