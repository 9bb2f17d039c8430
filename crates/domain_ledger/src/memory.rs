//! In-memory adapters
//!
//! Used by unit and scenario tests and by the API tests. The store mirrors
//! the PostgreSQL adapter's semantics: row locks are per-key async mutexes
//! held until the unit of work ends, writes are staged and applied on
//! commit, and admission is atomic under the state lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use core_kernel::{
    AccountId, DomainPort, HealthCheckResult, HealthCheckable, PaymentId, PortError, TransferId, UserId,
};

use crate::account::Account;
use crate::events::LedgerEvent;
use crate::history::{transfer_counterparty, HistoryCursor, HistoryItem, HistoryKind};
use crate::idempotency::IdempotencyKey;
use crate::ledger::{EntryId, EntryReference, LedgerEntry, NewLedgerEntry};
use crate::operation::Admission;
use crate::payment::Payment;
use crate::ports::{
    AccountStore, EventPublisher, HistoryStore, LedgerStore, LedgerTx, OperationStore, RemoteDebitOutcome,
    RemoteDebitRequest, RemoteDebitStatus, RemoteFundingPort,
};
use crate::transfer::Transfer;

/// One async mutex per key, created on first use
struct KeyedLocks<K> {
    locks: StdMutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: StdMutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    entries: HashMap<AccountId, Vec<LedgerEntry>>,
    transfers: HashMap<TransferId, Transfer>,
    transfer_keys: HashMap<IdempotencyKey, TransferId>,
    payments: HashMap<PaymentId, Payment>,
    payment_keys: HashMap<IdempotencyKey, PaymentId>,
}

#[derive(Default)]
struct Shared {
    state: RwLock<MemoryState>,
    account_locks: KeyedLocks<AccountId>,
    transfer_locks: KeyedLocks<TransferId>,
    payment_locks: KeyedLocks<PaymentId>,
    last_entry_id: AtomicI64,
    failing_commits: AtomicUsize,
}

/// Storage adapter backed by process memory
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with a connection error
    pub fn fail_next_commits(&self, count: usize) {
        self.shared.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Shifts the latest `balance_after` of an account by `delta`, leaving amounts intact
    pub async fn skew_cached_balance(&self, account_id: AccountId, delta: i64) {
        let mut state = self.shared.state.write().await;
        if let Some(last) = state.entries.get_mut(&account_id).and_then(|entries| entries.last_mut()) {
            last.balance_after += delta;
        }
    }

    fn take_commit_failure(&self) -> bool {
        self.shared
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl DomainPort for InMemoryLedgerStore {}

#[async_trait]
impl HealthCheckable for InMemoryLedgerStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("memory_store", 0)
    }
}

#[async_trait]
impl AccountStore for InMemoryLedgerStore {
    async fn insert_account(&self, account: &Account) -> Result<(), PortError> {
        let mut state = self.shared.state.write().await;
        if state.accounts.contains_key(&account.id) {
            return Err(PortError::conflict(format!("account {} already exists", account.id)));
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_account(&self, id: AccountId) -> Result<Option<Account>, PortError> {
        Ok(self.shared.state.read().await.accounts.get(&id).cloned())
    }

    async fn accounts_by_owner(&self, owner_id: &UserId) -> Result<Vec<Account>, PortError> {
        let state = self.shared.state.read().await;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|account| &account.owner_id == owner_id)
            .cloned()
            .collect();
        accounts.sort_by_key(|account| (account.created_at, account.id));
        Ok(accounts)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, PortError> {
        Ok(Box::new(MemoryTx {
            store: self.clone(),
            guards: Vec::new(),
            held_accounts: HashSet::new(),
            held_transfers: HashSet::new(),
            held_payments: HashSet::new(),
            entries: Vec::new(),
            accounts: HashMap::new(),
            transfers: HashMap::new(),
            payments: HashMap::new(),
        }))
    }

    async fn current_balance(&self, account_id: AccountId) -> Result<i64, PortError> {
        let state = self.shared.state.read().await;
        Ok(state
            .entries
            .get(&account_id)
            .and_then(|entries| entries.last())
            .map(|entry| entry.balance_after)
            .unwrap_or(0))
    }

    async fn entry_sum(&self, account_id: AccountId) -> Result<(i64, u64), PortError> {
        let state = self.shared.state.read().await;
        let entries = state.entries.get(&account_id).map(Vec::as_slice).unwrap_or_default();
        Ok((entries.iter().map(|e| e.amount).sum(), entries.len() as u64))
    }

    async fn entries(&self, account_id: AccountId) -> Result<Vec<LedgerEntry>, PortError> {
        let state = self.shared.state.read().await;
        Ok(state.entries.get(&account_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl OperationStore for InMemoryLedgerStore {
    async fn admit_transfer(&self, transfer: &Transfer) -> Result<Admission<Transfer>, PortError> {
        let mut state = self.shared.state.write().await;
        if let Some(existing) = state
            .transfer_keys
            .get(&transfer.idempotency_key)
            .and_then(|id| state.transfers.get(id))
        {
            return Ok(Admission::Duplicate(existing.clone()));
        }
        state.transfer_keys.insert(transfer.idempotency_key.clone(), transfer.id);
        state.transfers.insert(transfer.id, transfer.clone());
        Ok(Admission::Fresh(transfer.clone()))
    }

    async fn find_transfer(&self, id: TransferId) -> Result<Option<Transfer>, PortError> {
        Ok(self.shared.state.read().await.transfers.get(&id).cloned())
    }

    async fn find_transfer_by_key(&self, key: &IdempotencyKey) -> Result<Option<Transfer>, PortError> {
        let state = self.shared.state.read().await;
        Ok(state
            .transfer_keys
            .get(key)
            .and_then(|id| state.transfers.get(id))
            .cloned())
    }

    async fn stale_transfers(
        &self,
        older_than: DateTime<Utc>,
        after: Option<(DateTime<Utc>, TransferId)>,
        limit: usize,
    ) -> Result<Vec<Transfer>, PortError> {
        let state = self.shared.state.read().await;
        let mut stale: Vec<Transfer> = state
            .transfers
            .values()
            .filter(|t| !t.is_terminal() && t.created_at < older_than)
            .filter(|t| after.map_or(true, |cursor| (t.created_at, t.id) > cursor))
            .cloned()
            .collect();
        stale.sort_by_key(|t| (t.created_at, t.id));
        stale.truncate(limit);
        Ok(stale)
    }

    async fn admit_payment(&self, payment: &Payment) -> Result<Admission<Payment>, PortError> {
        let mut state = self.shared.state.write().await;
        if let Some(existing) = state
            .payment_keys
            .get(&payment.idempotency_key)
            .and_then(|id| state.payments.get(id))
        {
            return Ok(Admission::Duplicate(existing.clone()));
        }
        state.payment_keys.insert(payment.idempotency_key.clone(), payment.id);
        state.payments.insert(payment.id, payment.clone());
        Ok(Admission::Fresh(payment.clone()))
    }

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>, PortError> {
        Ok(self.shared.state.read().await.payments.get(&id).cloned())
    }

    async fn find_payment_by_key(&self, key: &IdempotencyKey) -> Result<Option<Payment>, PortError> {
        let state = self.shared.state.read().await;
        Ok(state
            .payment_keys
            .get(key)
            .and_then(|id| state.payments.get(id))
            .cloned())
    }

    async fn stale_payments(
        &self,
        older_than: DateTime<Utc>,
        after: Option<(DateTime<Utc>, PaymentId)>,
        limit: usize,
    ) -> Result<Vec<Payment>, PortError> {
        let state = self.shared.state.read().await;
        let mut stale: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| !p.is_terminal() && p.created_at < older_than)
            .filter(|p| after.map_or(true, |cursor| (p.created_at, p.id) > cursor))
            .cloned()
            .collect();
        stale.sort_by_key(|p| (p.created_at, p.id));
        stale.truncate(limit);
        Ok(stale)
    }
}

#[async_trait]
impl HistoryStore for InMemoryLedgerStore {
    async fn history_slice(
        &self,
        account_id: AccountId,
        kind: HistoryKind,
        cursor: Option<HistoryCursor>,
        limit: usize,
    ) -> Result<Vec<HistoryItem>, PortError> {
        let state = self.shared.state.read().await;
        let Some(entries) = state.entries.get(&account_id) else {
            return Ok(Vec::new());
        };

        let mut items: Vec<HistoryItem> = entries
            .iter()
            .filter(|entry| cursor.map_or(true, |c| c.admits(entry.created_at, entry.id)))
            .filter_map(|entry| {
                let (item_kind, counterparty) = match (entry.reference?, kind) {
                    (EntryReference::Payment(id), HistoryKind::Payment) => (
                        HistoryKind::Payment,
                        state.payments.get(&id).map(|p| p.recipient.name.clone()),
                    ),
                    (EntryReference::Transfer(id), HistoryKind::Transfer) => (
                        HistoryKind::Transfer,
                        state.transfers.get(&id).map(|t| {
                            transfer_counterparty(entry.transaction_type, &t.funding, t.destination_account_id)
                        }),
                    ),
                    _ => return None,
                };
                Some(HistoryItem {
                    entry_id: entry.id,
                    kind: item_kind,
                    transaction_type: entry.transaction_type,
                    amount: entry.amount,
                    balance_after: entry.balance_after,
                    reference_id: entry.reference?.uuid(),
                    counterparty,
                    created_at: entry.created_at,
                })
            })
            .collect();

        items.sort_by(|a, b| (b.created_at, b.entry_id).cmp(&(a.created_at, a.entry_id)));
        items.truncate(limit);
        Ok(items)
    }
}

/// Unit of work over [`InMemoryLedgerStore`]
pub struct MemoryTx {
    store: InMemoryLedgerStore,
    guards: Vec<OwnedMutexGuard<()>>,
    held_accounts: HashSet<AccountId>,
    held_transfers: HashSet<TransferId>,
    held_payments: HashSet<PaymentId>,
    entries: Vec<LedgerEntry>,
    accounts: HashMap<AccountId, Account>,
    transfers: HashMap<TransferId, Transfer>,
    payments: HashMap<PaymentId, Payment>,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, PortError> {
        if self.held_accounts.insert(id) {
            self.guards.push(self.store.shared.account_locks.acquire(&id).await);
        }
        if let Some(staged) = self.accounts.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.store.shared.state.read().await.accounts.get(&id).cloned())
    }

    async fn lock_transfer(&mut self, id: TransferId) -> Result<Option<Transfer>, PortError> {
        if self.held_transfers.insert(id) {
            self.guards.push(self.store.shared.transfer_locks.acquire(&id).await);
        }
        if let Some(staged) = self.transfers.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.store.shared.state.read().await.transfers.get(&id).cloned())
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, PortError> {
        if self.held_payments.insert(id) {
            self.guards.push(self.store.shared.payment_locks.acquire(&id).await);
        }
        if let Some(staged) = self.payments.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.store.shared.state.read().await.payments.get(&id).cloned())
    }

    async fn latest_entry(&mut self, account_id: AccountId) -> Result<Option<LedgerEntry>, PortError> {
        if let Some(staged) = self.entries.iter().rev().find(|e| e.account_id == account_id) {
            return Ok(Some(staged.clone()));
        }
        let state = self.store.shared.state.read().await;
        Ok(state.entries.get(&account_id).and_then(|entries| entries.last()).cloned())
    }

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, PortError> {
        if !self.held_accounts.contains(&entry.account_id) {
            return Err(PortError::internal(format!(
                "entry for {} appended without holding its lock",
                entry.account_id
            )));
        }
        if entry.balance_after < 0 {
            return Err(PortError::validation("balance_after must not be negative"));
        }
        let id = self.store.shared.last_entry_id.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = entry.into_entry(EntryId::new(id));
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), PortError> {
        if !self.held_accounts.contains(&account.id) {
            return Err(PortError::internal("account saved without holding its lock"));
        }
        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn save_transfer(&mut self, transfer: &Transfer) -> Result<(), PortError> {
        if !self.held_transfers.contains(&transfer.id) {
            return Err(PortError::internal("transfer saved without holding its lock"));
        }
        self.transfers.insert(transfer.id, transfer.clone());
        Ok(())
    }

    async fn save_payment(&mut self, payment: &Payment) -> Result<(), PortError> {
        if !self.held_payments.contains(&payment.id) {
            return Err(PortError::internal("payment saved without holding its lock"));
        }
        self.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        if self.store.take_commit_failure() {
            return Err(PortError::connection("simulated commit failure"));
        }

        let this = *self;
        let mut state = this.store.shared.state.write().await;
        for entry in this.entries {
            state.entries.entry(entry.account_id).or_default().push(entry);
        }
        for (id, account) in this.accounts {
            state.accounts.insert(id, account);
        }
        for (id, transfer) in this.transfers {
            state.transfers.insert(id, transfer);
        }
        for (id, payment) in this.payments {
            state.payments.insert(id, payment);
        }
        drop(state);
        drop(this.guards);
        Ok(())
    }
}

/// Scripted behaviour of [`MockRemoteFunding`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRemoteBehavior {
    Approve,
    Reject(String),
    Unavailable,
    /// Never answers
    Hang,
}

/// Remote funding service double
///
/// Approved debits are remembered by correlation id, so repeated calls do not
/// debit twice and `debit_status` reports them.
pub struct MockRemoteFunding {
    behavior: StdMutex<MockRemoteBehavior>,
    status_override: StdMutex<Option<RemoteDebitStatus>>,
    status_unavailable: AtomicBool,
    debits: StdMutex<HashMap<TransferId, RemoteDebitRequest>>,
    calls: AtomicUsize,
}

impl MockRemoteFunding {
    pub fn new(behavior: MockRemoteBehavior) -> Self {
        Self {
            behavior: StdMutex::new(behavior),
            status_override: StdMutex::new(None),
            status_unavailable: AtomicBool::new(false),
            debits: StdMutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn approving() -> Self {
        Self::new(MockRemoteBehavior::Approve)
    }

    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self::new(MockRemoteBehavior::Reject(reason.into()))
    }

    pub fn set_behavior(&self, behavior: MockRemoteBehavior) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    /// Forces the answer of `debit_status`
    pub fn set_status_override(&self, status: Option<RemoteDebitStatus>) {
        *self.status_override.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn set_status_unavailable(&self, unavailable: bool) {
        self.status_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Records a debit whose answer never reached the caller
    pub fn record_debit(&self, request: RemoteDebitRequest) {
        self.debits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(request.correlation_id)
            .or_insert(request);
    }

    /// Number of `debit` calls received
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Distinct debits applied
    pub fn debit_count(&self) -> usize {
        self.debits.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn debited_total(&self) -> i64 {
        self.debits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|request| request.amount.minor_units())
            .sum()
    }
}

impl Default for MockRemoteFunding {
    fn default() -> Self {
        Self::approving()
    }
}

impl DomainPort for MockRemoteFunding {}

#[async_trait]
impl HealthCheckable for MockRemoteFunding {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("mock_remote_funding", 0)
    }
}

#[async_trait]
impl RemoteFundingPort for MockRemoteFunding {
    async fn debit(&self, request: &RemoteDebitRequest) -> Result<RemoteDebitOutcome, PortError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match behavior {
            MockRemoteBehavior::Approve => {
                self.record_debit(request.clone());
                Ok(RemoteDebitOutcome::Debited { balance_after: None })
            }
            MockRemoteBehavior::Reject(reason) => Ok(RemoteDebitOutcome::Rejected { reason }),
            MockRemoteBehavior::Unavailable => Err(PortError::ServiceUnavailable {
                service: "remote-funding".to_string(),
            }),
            MockRemoteBehavior::Hang => std::future::pending().await,
        }
    }

    async fn debit_status(&self, correlation_id: TransferId) -> Result<RemoteDebitStatus, PortError> {
        if self.status_unavailable.load(Ordering::SeqCst) {
            return Err(PortError::ServiceUnavailable {
                service: "remote-funding".to_string(),
            });
        }
        if let Some(status) = *self.status_override.lock().unwrap_or_else(PoisonError::into_inner) {
            return Ok(status);
        }
        let debited = self
            .debits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&correlation_id);
        Ok(if debited {
            RemoteDebitStatus::Debited
        } else {
            RemoteDebitStatus::NotDebited
        })
    }
}

/// Event publisher that keeps every event
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: StdMutex<Vec<LedgerEvent>>,
    failing: AtomicBool,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Makes every publish fail until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl DomainPort for RecordingEventPublisher {}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(&self, event: &LedgerEvent) -> Result<(), PortError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::ServiceUnavailable {
                service: "event-bus".to_string(),
            });
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}
