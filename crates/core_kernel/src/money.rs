//! Money amounts in the smallest currency unit
//!
//! The engine moves exactly one currency, so an amount is a plain count of
//! minor units. [`Amount`] is always strictly positive: a zero or negative
//! request amount is rejected at construction. Signed deltas and balances are
//! ordinary `i64` values derived from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// A strictly positive amount of minor currency units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    /// Creates an amount, rejecting zero and negative values
    pub fn new(minor_units: i64) -> Result<Self, MoneyError> {
        if minor_units <= 0 {
            return Err(MoneyError::InvalidAmount(format!(
                "amount must be positive, got {}",
                minor_units
            )));
        }
        Ok(Self(minor_units))
    }

    /// Returns the amount in minor units
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Signed delta for a credit
    pub fn as_credit(&self) -> i64 {
        self.0
    }

    /// Signed delta for a debit
    pub fn as_debit(&self) -> i64 {
        -self.0
    }

    /// Applies a signed delta to a balance, failing on overflow
    pub fn apply_to(balance: i64, delta: i64) -> Result<i64, MoneyError> {
        balance.checked_add(delta).ok_or(MoneyError::Overflow)
    }

    /// Checked addition of two amounts
    pub fn checked_add(&self, other: Amount) -> Result<Amount, MoneyError> {
        self.0.checked_add(other.0).map(Amount).ok_or(MoneyError::Overflow)
    }
}

impl TryFrom<i64> for Amount {
    type Error = MoneyError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> i64 {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn credit_then_debit_is_identity(
            balance in 0i64..1_000_000_000i64,
            minor in 1i64..1_000_000_000i64
        ) {
            let amount = Amount::new(minor).unwrap();
            let credited = Amount::apply_to(balance, amount.as_credit()).unwrap();
            let restored = Amount::apply_to(credited, amount.as_debit()).unwrap();
            prop_assert_eq!(restored, balance);
        }
    }
}
