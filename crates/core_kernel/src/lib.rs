//! Core Kernel - Foundational types for the ledger engine
//!
//! This crate provides the building blocks shared by every other crate:
//! - Integer minor-unit amounts
//! - Strongly-typed identifiers and the opaque caller identity
//! - Port infrastructure for adapters (errors, health checks)

pub mod money;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{Amount, MoneyError};
pub use identifiers::{AccountId, TransferId, PaymentId, EventId, UserId};
pub use error::CoreError;
pub use ports::{
    PortError, DomainPort, CircuitBreakerConfig,
    AdapterHealth, HealthCheckResult, HealthCheckable,
};
