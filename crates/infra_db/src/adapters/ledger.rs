//! PostgreSQL Ledger Store
//!
//! [`PostgresLedgerStore`] implements every store port of the ledger domain
//! on one connection pool. Units of work are [`PgLedgerTx`]: a SQLx
//! transaction whose `lock_*` methods issue `SELECT … FOR UPDATE`, so row
//! locks are held until commit or rollback.
//!
//! Dropping a [`PgLedgerTx`] without committing rolls it back; SQLx issues
//! the ROLLBACK when the connection returns to the pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument, warn};

use core_kernel::{
    AccountId, AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, PaymentId, PortError, TransferId,
    UserId,
};
use domain_ledger::ports::{AccountStore, HistoryStore, LedgerStore, LedgerTx, OperationStore};
use domain_ledger::{
    Account, Admission, HistoryCursor, HistoryItem, HistoryKind, IdempotencyKey, LedgerEntry, NewLedgerEntry,
    Payment, Transfer,
};

use crate::adapters::mapping::{
    account_to_row, entry_to_row, payment_to_row, row_to_account, row_to_entry, row_to_history_item,
    row_to_payment, row_to_transfer, transfer_to_row,
};
use crate::error::{db_to_port_error, DatabaseError};
use crate::repositories::{
    AccountRepository, EntryRepository, HistoryRepository, PaymentRepository, TransferRepository,
};

const ADAPTER_ID: &str = "postgres-ledger-store";

/// PostgreSQL-backed implementation of the ledger store ports
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for migrations and maintenance queries
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn limit(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl DomainPort for PostgresLedgerStore {}

#[async_trait]
impl HealthCheckable for PostgresLedgerStore {
    /// Runs `SELECT 1` on the pool
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult::healthy(ADAPTER_ID, latency_ms),
            Err(e) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Unhealthy,
                latency_ms,
                message: Some(format!("Database error: {}", e)),
                checked_at: Utc::now(),
            },
        }
    }
}

#[async_trait]
impl AccountStore for PostgresLedgerStore {
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    async fn insert_account(&self, account: &Account) -> Result<(), PortError> {
        AccountRepository::insert(&self.pool, &account_to_row(account))
            .await
            .map_err(db_to_port_error)
    }

    async fn find_account(&self, id: AccountId) -> Result<Option<Account>, PortError> {
        AccountRepository::find(&self.pool, *id.as_uuid())
            .await
            .map_err(db_to_port_error)?
            .map(row_to_account)
            .transpose()
    }

    async fn accounts_by_owner(&self, owner_id: &UserId) -> Result<Vec<Account>, PortError> {
        AccountRepository::by_owner(&self.pool, owner_id.as_str())
            .await
            .map_err(db_to_port_error)?
            .into_iter()
            .map(row_to_account)
            .collect()
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, PortError> {
        let tx = self.pool.begin().await.map_err(|e| db_to_port_error(e.into()))?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn current_balance(&self, account_id: AccountId) -> Result<i64, PortError> {
        let latest = EntryRepository::latest(&self.pool, *account_id.as_uuid())
            .await
            .map_err(db_to_port_error)?;
        Ok(latest.map(|row| row.balance_after).unwrap_or(0))
    }

    async fn entry_sum(&self, account_id: AccountId) -> Result<(i64, u64), PortError> {
        let (total, count) = EntryRepository::sum(&self.pool, *account_id.as_uuid())
            .await
            .map_err(db_to_port_error)?;
        Ok((total, u64::try_from(count).unwrap_or_default()))
    }

    async fn entries(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, PortError> {
        EntryRepository::all(&self.pool, *account_id.as_uuid())
            .await
            .map_err(db_to_port_error)?
            .into_iter()
            .map(row_to_entry)
            .collect()
    }
}

#[async_trait]
impl OperationStore for PostgresLedgerStore {
    #[instrument(skip(self, transfer), fields(transfer_id = %transfer.id, key = %transfer.idempotency_key))]
    async fn admit_transfer(&self, transfer: &Transfer) -> Result<Admission<Transfer>, PortError> {
        let inserted = TransferRepository::insert_if_absent(&self.pool, &transfer_to_row(transfer))
            .await
            .map_err(db_to_port_error)?;
        if inserted {
            return Ok(Admission::Fresh(transfer.clone()));
        }

        debug!("Idempotency key already admitted");
        let existing = self
            .find_transfer_by_key(&transfer.idempotency_key)
            .await?
            .ok_or_else(|| PortError::internal("transfer key conflicted but no row holds it"))?;
        Ok(Admission::Duplicate(existing))
    }

    async fn find_transfer(&self, id: TransferId) -> Result<Option<Transfer>, PortError> {
        TransferRepository::find(&self.pool, *id.as_uuid())
            .await
            .map_err(db_to_port_error)?
            .map(row_to_transfer)
            .transpose()
    }

    async fn find_transfer_by_key(&self, key: &IdempotencyKey) -> Result<Option<Transfer>, PortError> {
        TransferRepository::find_by_key(&self.pool, key.as_str())
            .await
            .map_err(db_to_port_error)?
            .map(row_to_transfer)
            .transpose()
    }

    async fn stale_transfers(
        &self,
        older_than: DateTime<Utc>,
        after: Option<(DateTime<Utc>, TransferId)>,
        limit_rows: usize,
    ) -> Result<Vec<Transfer>, PortError> {
        let after = after.map(|(created_at, id)| (created_at, *id.as_uuid()));
        TransferRepository::stale(&self.pool, older_than, after, limit(limit_rows))
            .await
            .map_err(db_to_port_error)?
            .into_iter()
            .map(row_to_transfer)
            .collect()
    }

    #[instrument(skip(self, payment), fields(payment_id = %payment.id, key = %payment.idempotency_key))]
    async fn admit_payment(&self, payment: &Payment) -> Result<Admission<Payment>, PortError> {
        let inserted = PaymentRepository::insert_if_absent(&self.pool, &payment_to_row(payment))
            .await
            .map_err(db_to_port_error)?;
        if inserted {
            return Ok(Admission::Fresh(payment.clone()));
        }

        debug!("Idempotency key already admitted");
        let existing = self
            .find_payment_by_key(&payment.idempotency_key)
            .await?
            .ok_or_else(|| PortError::internal("payment key conflicted but no row holds it"))?;
        Ok(Admission::Duplicate(existing))
    }

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>, PortError> {
        PaymentRepository::find(&self.pool, *id.as_uuid())
            .await
            .map_err(db_to_port_error)?
            .map(row_to_payment)
            .transpose()
    }

    async fn find_payment_by_key(&self, key: &IdempotencyKey) -> Result<Option<Payment>, PortError> {
        PaymentRepository::find_by_key(&self.pool, key.as_str())
            .await
            .map_err(db_to_port_error)?
            .map(row_to_payment)
            .transpose()
    }

    async fn stale_payments(
        &self,
        older_than: DateTime<Utc>,
        after: Option<(DateTime<Utc>, PaymentId)>,
        limit_rows: usize,
    ) -> Result<Vec<Payment>, PortError> {
        let after = after.map(|(created_at, id)| (created_at, *id.as_uuid()));
        PaymentRepository::stale(&self.pool, older_than, after, limit(limit_rows))
            .await
            .map_err(db_to_port_error)?
            .into_iter()
            .map(row_to_payment)
            .collect()
    }
}

#[async_trait]
impl HistoryStore for PostgresLedgerStore {
    #[instrument(skip(self, cursor), fields(account_id = %account_id, kind = ?kind))]
    async fn history_slice(
        &self,
        account_id: AccountId,
        kind: HistoryKind,
        cursor: Option<HistoryCursor>,
        limit_rows: usize,
    ) -> Result<Vec<HistoryItem>, PortError> {
        let cursor = cursor.map(|c| (c.created_at, c.row_id.value()));
        let rows = match kind {
            HistoryKind::Payment => {
                HistoryRepository::payment_slice(&self.pool, *account_id.as_uuid(), cursor, limit(limit_rows)).await
            }
            HistoryKind::Transfer => {
                HistoryRepository::transfer_slice(&self.pool, *account_id.as_uuid(), cursor, limit(limit_rows)).await
            }
        }
        .map_err(db_to_port_error)?;

        rows.into_iter().map(|row| row_to_history_item(row, kind)).collect()
    }
}

/// A unit of work on PostgreSQL
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

impl PgLedgerTx {
    fn conn(&mut self) -> &mut sqlx::PgConnection {
        &mut self.tx
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, PortError> {
        AccountRepository::find_for_update(self.conn(), *id.as_uuid())
            .await
            .map_err(db_to_port_error)?
            .map(row_to_account)
            .transpose()
    }

    async fn lock_transfer(&mut self, id: TransferId) -> Result<Option<Transfer>, PortError> {
        TransferRepository::find_for_update(self.conn(), *id.as_uuid())
            .await
            .map_err(db_to_port_error)?
            .map(row_to_transfer)
            .transpose()
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, PortError> {
        PaymentRepository::find_for_update(self.conn(), *id.as_uuid())
            .await
            .map_err(db_to_port_error)?
            .map(row_to_payment)
            .transpose()
    }

    async fn latest_entry(&mut self, account_id: AccountId) -> Result<Option<LedgerEntry>, PortError> {
        EntryRepository::latest(self.conn(), *account_id.as_uuid())
            .await
            .map_err(db_to_port_error)?
            .map(row_to_entry)
            .transpose()
    }

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, PortError> {
        let row = EntryRepository::insert(self.conn(), &entry_to_row(&entry))
            .await
            .map_err(|e| {
                if let DatabaseError::ConstraintViolation(message) = &e {
                    warn!(account_id = %entry.account_id, %message, "Journal constraint rejected entry");
                }
                db_to_port_error(e)
            })?;
        row_to_entry(row)
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), PortError> {
        AccountRepository::set_active(self.conn(), *account.id.as_uuid(), account.is_active)
            .await
            .map_err(db_to_port_error)
    }

    async fn save_transfer(&mut self, transfer: &Transfer) -> Result<(), PortError> {
        TransferRepository::update_outcome(self.conn(), &transfer_to_row(transfer))
            .await
            .map_err(db_to_port_error)
    }

    async fn save_payment(&mut self, payment: &Payment) -> Result<(), PortError> {
        PaymentRepository::update_outcome(self.conn(), &payment_to_row(payment))
            .await
            .map_err(db_to_port_error)
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        self.tx.commit().await.map_err(|e| db_to_port_error(e.into()))
    }
}
