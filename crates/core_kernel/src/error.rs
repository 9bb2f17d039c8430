//! Core error types used across the system

use thiserror::Error;
use crate::money::MoneyError;

/// Core error type for the kernel
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    /// Engine or adapter settings rejected at startup
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        CoreError::Configuration(message.into())
    }
}
