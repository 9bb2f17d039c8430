//! Repository implementations for the ledger tables
//!
//! Repositories hold the SQL and map rows to plain row structs. Every
//! function is generic over [`sqlx::PgExecutor`], so the same query runs
//! against the pool for reads or inside an open transaction when it must see
//! (and lock) uncommitted state.
//!
//! Enumerations are stored as `TEXT` and parsed in the adapter layer.

pub mod accounts;
pub mod entries;
pub mod history;
pub mod payments;
pub mod transfers;

pub use accounts::{AccountRepository, AccountRow};
pub use entries::{EntryRepository, EntryRow, NewEntryRow};
pub use history::{HistoryRepository, HistoryRow};
pub use payments::{PaymentRepository, PaymentRow};
pub use transfers::{TransferRepository, TransferRow};
