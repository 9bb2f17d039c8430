//! Idempotency keys and replay classification
//!
//! A key identifies one logical request. Keys are unique per operation kind:
//! the same string may name one transfer and one payment. When a key is seen
//! again the stored row decides the answer:
//!
//! | stored row                        | answer                       |
//! |-----------------------------------|------------------------------|
//! | different caller or parameters    | `IDEMPOTENCY_KEY_CONFLICT`   |
//! | PENDING                           | `REQUEST_IN_FLIGHT`          |
//! | SUCCEEDED / FAILED                | replay of the stored outcome |

use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::UserId;

use crate::error::LedgerError;
use crate::operation::OperationStatus;

/// Maximum key length accepted from callers
pub const MAX_KEY_LENGTH: usize = 128;

/// Caller-supplied idempotency key: 1 to 128 printable ASCII characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn parse(raw: impl Into<String>) -> Result<Self, LedgerError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(LedgerError::validation("idempotency key is required"));
        }
        if raw.len() > MAX_KEY_LENGTH {
            return Err(LedgerError::validation(format!(
                "idempotency key exceeds {} characters",
                MAX_KEY_LENGTH
            )));
        }
        if !raw.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(LedgerError::validation(
                "idempotency key must be printable ASCII without spaces",
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        IdempotencyKey::parse(value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> String {
        key.0
    }
}

/// An operation row addressed by an idempotency key
pub trait Idempotent {
    type Request;

    fn idempotency_key(&self) -> &IdempotencyKey;
    fn status(&self) -> OperationStatus;
    fn caller(&self) -> &UserId;
    /// True if `request` carries the same parameters as the stored row
    fn matches(&self, request: &Self::Request) -> bool;
}

/// Decides what a repeated key means for `request`
///
/// Returns the stored row when it is terminal and may be replayed.
pub fn classify_replay<T: Idempotent>(existing: T, request: &T::Request) -> Result<T, LedgerError> {
    if !existing.matches(request) {
        return Err(LedgerError::IdempotencyConflict {
            key: existing.idempotency_key().to_string(),
        });
    }
    if !existing.status().is_terminal() {
        return Err(LedgerError::RequestInFlight {
            key: existing.idempotency_key().to_string(),
        });
    }
    Ok(existing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bounds() {
        assert!(IdempotencyKey::parse("order-42").is_ok());
        assert!(IdempotencyKey::parse("a".repeat(MAX_KEY_LENGTH)).is_ok());
        assert!(IdempotencyKey::parse("").is_err());
        assert!(IdempotencyKey::parse("a".repeat(MAX_KEY_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_key_rejects_non_printable() {
        assert!(IdempotencyKey::parse("has space").is_err());
        assert!(IdempotencyKey::parse("tab\tkey").is_err());
        assert!(IdempotencyKey::parse("ключ").is_err());
    }

    #[test]
    fn test_key_deserialization_validates() {
        let parsed: Result<IdempotencyKey, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());
        let parsed: IdempotencyKey = serde_json::from_str("\"k-1\"").unwrap();
        assert_eq!(parsed.as_str(), "k-1");
    }
}
