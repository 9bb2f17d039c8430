//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! ledger test suite.
//!
//! # Modules
//!
//! - `fixtures`: Owners, amounts, keys and recipients used across tests
//! - `builders`: `EngineHarness` and request builders
//! - `database`: PostgreSQL testcontainer with migrations applied
//! - `assertions`: Balance reconstruction and outcome assertions
//! - `generators`: Property-based test data generators

pub mod assertions;
pub mod builders;
pub mod database;
pub mod fixtures;
pub mod generators;

pub use assertions::*;
pub use builders::*;
pub use database::*;
pub use fixtures::*;
pub use generators::*;
