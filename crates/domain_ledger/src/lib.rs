//! Ledger Domain - Accounts, Transfers and Payments
//!
//! This crate holds the authoritative balances of the system. Every balance
//! change is an immutable ledger entry, and transfers and payments execute
//! exactly once per idempotency key under concurrent and retried requests.
//!
//! # Guarantees
//!
//! - A balance is always the sum of its account's entries and never negative
//! - A transfer credits its destination at most once, and never without a
//!   confirmed debit of its source
//! - Repeating a request with the same idempotency key replays the first
//!   outcome instead of executing again
//!
//! # Components
//!
//! - [`Ledger`]: append-only journal operations inside a unit of work
//! - [`TransferOrchestrator`] / [`PaymentOrchestrator`]: money movement
//! - [`HistoryCursorQuery`]: keyset-paginated account history
//! - [`ReconciliationSweep`]: resolves operations stuck in PENDING
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_ledger::{LedgerEngine, PaymentRequest, RecipientDescriptor};
//!
//! let engine = LedgerEngine::new(store, remote, events, EngineConfig::default())?;
//! let receipt = engine.payments.execute_payment(PaymentRequest {
//!     caller_id,
//!     payer_account_id,
//!     amount: Amount::new(3_000)?,
//!     recipient: RecipientDescriptor::named("Corner Cafe"),
//!     idempotency_key: IdempotencyKey::parse("order-42")?,
//!     session_ref: None,
//! }).await?;
//! ```

pub mod account;
pub mod adapters;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod idempotency;
pub mod ledger;
pub mod operation;
pub mod payment;
pub mod ports;
pub mod services;
pub mod transfer;

#[cfg(any(test, feature = "mock"))]
pub mod memory;

pub use account::{Account, AccountBalance, AccountKind, AlternativeAccount, BalanceAudit};
pub use config::EngineConfig;
pub use engine::LedgerEngine;
pub use error::LedgerError;
pub use events::{LedgerEvent, TracingEventPublisher};
pub use history::{HistoryCursor, HistoryItem, HistoryKind, HistoryPage, HistoryTypeFilter};
pub use idempotency::IdempotencyKey;
pub use ledger::{EntryId, EntryReference, Ledger, LedgerEntry, NewLedgerEntry, TransactionType};
pub use operation::{Admission, FailureCode, OperationStatus};
pub use payment::{Payment, PaymentReceipt, PaymentRequest, RecipientDescriptor};
pub use ports::{
    AccountStore, EngineStore, EventPublisher, HistoryStore, LedgerStore, LedgerTx, OperationStore,
    RemoteDebitOutcome, RemoteDebitRequest, RemoteDebitStatus, RemoteFundingPort,
};
pub use services::{
    AccountService, HistoryCursorQuery, PaymentOrchestrator, ReconciliationSweep, SweepReport,
    TransferOrchestrator,
};
pub use transfer::{FundingSource, Transfer, TransferReceipt, TransferRequest};
