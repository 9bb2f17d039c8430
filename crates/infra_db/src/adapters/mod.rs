//! Domain Adapters
//!
//! Implementations of the ledger store ports on PostgreSQL.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresLedgerStore;
//! use domain_ledger::ports::EngineStore;
//! use std::sync::Arc;
//!
//! let store: Arc<dyn EngineStore> = Arc::new(PostgresLedgerStore::new(pool));
//! ```

pub mod ledger;
mod mapping;

pub use ledger::{PgLedgerTx, PostgresLedgerStore};
