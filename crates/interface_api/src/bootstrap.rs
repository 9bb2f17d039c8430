//! Wiring of production adapters into a [`LedgerEngine`]

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use domain_ledger::adapters::HttpRemoteFundingAdapter;
use domain_ledger::{LedgerEngine, TracingEventPublisher};
use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresLedgerStore};

use crate::config::ApiConfig;

/// Connects to PostgreSQL, applies migrations and builds the engine
pub async fn build_engine(config: &ApiConfig) -> anyhow::Result<LedgerEngine> {
    let pool = create_pool(DatabaseConfig::new(config.database_url.clone()))
        .await
        .context("connecting to the ledger database")?;
    run_migrations(&pool).await.context("applying ledger migrations")?;

    let remote = HttpRemoteFundingAdapter::new(config.remote_funding.clone())
        .context("building the remote funding client")?;

    let engine = LedgerEngine::new(
        Arc::new(PostgresLedgerStore::new(pool)),
        Arc::new(remote),
        Arc::new(TracingEventPublisher),
        config.engine.clone(),
    )
    .context("validating engine configuration")?;

    info!(
        remote_funding = %config.remote_funding.base_url,
        stale_threshold_secs = config.engine.stale_threshold_secs,
        "Ledger engine ready"
    );
    Ok(engine)
}

/// Runs the reconciliation sweep on its interval until the task is dropped
pub fn spawn_reconciliation(engine: &LedgerEngine) -> tokio::task::JoinHandle<()> {
    let sweep = engine.reconciliation.clone();
    tokio::spawn(sweep.run_forever())
}
