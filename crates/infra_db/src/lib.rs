//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the ledger engine using SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: repositories own the SQL and
//! work against any executor (the pool or an open transaction), and the
//! [`PostgresLedgerStore`] adapter implements the domain store ports on top
//! of them.
//!
//! # Concurrency
//!
//! - Admission relies on the unique index on `idempotency_key`
//!   (`INSERT … ON CONFLICT DO NOTHING`), so concurrent requests with one key
//!   produce exactly one row.
//! - Balance changes run inside a [`PgLedgerTx`] that takes
//!   `SELECT … FOR UPDATE` row locks; the journal's `balance_after >= 0`
//!   check is the last line against a negative balance.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresLedgerStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/ledger")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresLedgerStore::new(pool);
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::{PgLedgerTx, PostgresLedgerStore};
pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool};
