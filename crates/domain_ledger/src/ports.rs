//! Ledger Domain Ports
//!
//! The orchestrators depend only on these traits. Storage is provided by the
//! PostgreSQL adapter in `infra_db` (or the in-memory adapter behind the
//! `mock` feature), and the remote funding service by an HTTP adapter.
//!
//! # Units of work
//!
//! Every balance change happens inside a [`LedgerTx`] obtained from
//! [`LedgerStore::begin`]. A unit of work either commits as a whole or, when
//! dropped without [`LedgerTx::commit`], is rolled back. Row locks taken via
//! `lock_*` are held until then.
//!
//! Lock order inside a unit of work is fixed: the operation row first, then
//! accounts in ascending id order (see [`crate::ledger::Ledger::lock_all`]).
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut tx = store.begin().await?;
//! let account = Ledger::lock(tx.as_mut(), account_id).await?;
//! let entry = Ledger::append(tx.as_mut(), &account, amount, TransactionType::CreditCharge, None).await?;
//! tx.commit().await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{
    AccountId, Amount, DomainPort, HealthCheckable, PaymentId, PortError, TransferId, UserId,
};

use crate::account::Account;
use crate::events::LedgerEvent;
use crate::history::{HistoryCursor, HistoryItem, HistoryKind};
use crate::idempotency::IdempotencyKey;
use crate::ledger::{LedgerEntry, NewLedgerEntry};
use crate::operation::Admission;
use crate::payment::Payment;
use crate::transfer::Transfer;

/// Account persistence
#[async_trait]
pub trait AccountStore: DomainPort {
    async fn insert_account(&self, account: &Account) -> Result<(), PortError>;

    /// Returns the account whether or not it is active
    async fn find_account(&self, id: AccountId) -> Result<Option<Account>, PortError>;

    /// All accounts of one owner, oldest first
    async fn accounts_by_owner(&self, owner_id: &UserId) -> Result<Vec<Account>, PortError>;
}

/// Journal reads and unit-of-work creation
#[async_trait]
pub trait LedgerStore: DomainPort {
    /// Opens a unit of work
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, PortError>;

    /// `balance_after` of the entry with the highest id, or zero
    async fn current_balance(&self, account_id: AccountId) -> Result<i64, PortError>;

    /// Sum of signed amounts and number of entries
    async fn entry_sum(&self, account_id: AccountId) -> Result<(i64, u64), PortError>;

    /// All entries of an account in append order
    async fn entries(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, PortError>;
}

/// Transfer and payment rows
#[async_trait]
pub trait OperationStore: DomainPort {
    /// Inserts the PENDING row unless the key is taken, atomically
    ///
    /// Of two concurrent admissions with one key exactly one is `Fresh`.
    async fn admit_transfer(&self, transfer: &Transfer) -> Result<Admission<Transfer>, PortError>;

    async fn find_transfer(&self, id: TransferId) -> Result<Option<Transfer>, PortError>;

    async fn find_transfer_by_key(&self, key: &IdempotencyKey) -> Result<Option<Transfer>, PortError>;

    /// PENDING transfers created before `older_than`, ordered by `(created_at, id)`
    /// and starting strictly after `after`
    async fn stale_transfers(
        &self,
        older_than: DateTime<Utc>,
        after: Option<(DateTime<Utc>, TransferId)>,
        limit: usize,
    ) -> Result<Vec<Transfer>, PortError>;

    async fn admit_payment(&self, payment: &Payment) -> Result<Admission<Payment>, PortError>;

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>, PortError>;

    async fn find_payment_by_key(&self, key: &IdempotencyKey) -> Result<Option<Payment>, PortError>;

    async fn stale_payments(
        &self,
        older_than: DateTime<Utc>,
        after: Option<(DateTime<Utc>, PaymentId)>,
        limit: usize,
    ) -> Result<Vec<Payment>, PortError>;
}

/// History reads
#[async_trait]
pub trait HistoryStore: DomainPort {
    /// Entries of one kind for an account, newest first, strictly after `cursor`
    async fn history_slice(
        &self,
        account_id: AccountId,
        kind: HistoryKind,
        cursor: Option<HistoryCursor>,
        limit: usize,
    ) -> Result<Vec<HistoryItem>, PortError>;
}

/// Everything the engine needs from storage
pub trait EngineStore: AccountStore + LedgerStore + OperationStore + HistoryStore + HealthCheckable {}

impl<T> EngineStore for T where T: AccountStore + LedgerStore + OperationStore + HistoryStore + HealthCheckable {}

/// A storage transaction holding row locks
#[async_trait]
pub trait LedgerTx: Send {
    /// Locks an account row; `None` if it does not exist
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, PortError>;

    /// Locks a transfer row and returns its current state
    async fn lock_transfer(&mut self, id: TransferId) -> Result<Option<Transfer>, PortError>;

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, PortError>;

    /// Entry with the highest id for the account, seen through this transaction
    async fn latest_entry(&mut self, account_id: AccountId) -> Result<Option<LedgerEntry>, PortError>;

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, PortError>;

    /// Writes the mutable columns of a locked account
    async fn save_account(&mut self, account: &Account) -> Result<(), PortError>;

    /// Writes status, failure and balance columns of a locked transfer
    async fn save_transfer(&mut self, transfer: &Transfer) -> Result<(), PortError>;

    async fn save_payment(&mut self, payment: &Payment) -> Result<(), PortError>;

    async fn commit(self: Box<Self>) -> Result<(), PortError>;
}

/// Debit request sent to the remote funding service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDebitRequest {
    pub owner_id: UserId,
    pub amount: Amount,
    /// The transfer id; the remote service deduplicates on it
    pub correlation_id: TransferId,
}

/// Answer to a debit request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteDebitOutcome {
    Debited { balance_after: Option<i64> },
    Rejected { reason: String },
}

/// What the remote service knows about a correlation id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteDebitStatus {
    Debited,
    NotDebited,
    Unknown,
}

/// The remote funding service
#[async_trait]
pub trait RemoteFundingPort: DomainPort + HealthCheckable {
    /// Debits the owner's remote balance
    ///
    /// Repeating a call with the same correlation id must not debit twice.
    async fn debit(&self, request: &RemoteDebitRequest) -> Result<RemoteDebitOutcome, PortError>;

    /// Looks up the outcome of an earlier debit
    async fn debit_status(&self, correlation_id: TransferId) -> Result<RemoteDebitStatus, PortError>;
}

/// Sink for domain events
#[async_trait]
pub trait EventPublisher: DomainPort {
    async fn publish(&self, event: &LedgerEvent) -> Result<(), PortError>;
}
