//! Accounts
//!
//! An account is owned by exactly one caller identity and holds a balance of
//! minor currency units. The balance itself is not stored on the account: it
//! is the `balance_after` of the account's latest ledger entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{AccountId, UserId};

use crate::error::LedgerError;

/// Kinds of account a caller may open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountKind {
    /// Individual spending account
    Personal,
    /// Account used to receive and settle business payments
    Merchant,
    /// Shared pot managed by its owner
    Group,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Personal => "PERSONAL",
            AccountKind::Merchant => "MERCHANT",
            AccountKind::Group => "GROUP",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERSONAL" => Ok(AccountKind::Personal),
            "MERCHANT" => Ok(AccountKind::Merchant),
            "GROUP" => Ok(AccountKind::Group),
            other => Err(LedgerError::validation(format!("unknown account kind '{}'", other))),
        }
    }
}

/// A ledger account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner_id: UserId,
    pub kind: AccountKind,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Opens a new active account for the given owner
    pub fn open(owner_id: UserId, kind: AccountKind) -> Self {
        Self {
            id: AccountId::new_v7(),
            owner_id,
            kind,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Closes the account. Existing entries are retained.
    pub fn close(&mut self) {
        self.is_active = false;
    }

    pub fn is_owned_by(&self, caller: &UserId) -> bool {
        &self.owner_id == caller
    }

    /// Closed accounts are indistinguishable from missing ones for callers
    pub fn ensure_active(&self) -> Result<(), LedgerError> {
        if self.is_active {
            Ok(())
        } else {
            Err(LedgerError::AccountNotFound(self.id))
        }
    }

    pub fn ensure_owned_by(&self, caller: &UserId) -> Result<(), LedgerError> {
        if self.is_owned_by(caller) {
            Ok(())
        } else {
            Err(LedgerError::AccountNotOwned { account_id: self.id })
        }
    }
}

/// Account together with its current balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account: Account,
    pub balance: i64,
}

/// Another account of the same caller that could cover a failed payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeAccount {
    pub account_id: AccountId,
    pub kind: AccountKind,
    pub balance: i64,
}

/// Result of comparing a cached balance to the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAudit {
    pub account_id: AccountId,
    /// `balance_after` of the latest entry
    pub cached: i64,
    /// Sum of every signed entry amount
    pub reconstructed: i64,
    pub entry_count: u64,
}

impl BalanceAudit {
    pub fn is_consistent(&self) -> bool {
        self.cached == self.reconstructed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_account_is_active() {
        let account = Account::open(UserId::new("user-1"), AccountKind::Personal);
        assert!(account.is_active);
        assert!(account.is_owned_by(&UserId::new("user-1")));
        assert!(account.ensure_active().is_ok());
    }

    #[test]
    fn test_closed_account_reports_not_found() {
        let mut account = Account::open(UserId::new("user-1"), AccountKind::Merchant);
        account.close();
        assert!(matches!(
            account.ensure_active(),
            Err(LedgerError::AccountNotFound(id)) if id == account.id
        ));
    }

    #[test]
    fn test_foreign_owner_rejected() {
        let account = Account::open(UserId::new("owner"), AccountKind::Group);
        assert!(matches!(
            account.ensure_owned_by(&UserId::new("intruder")),
            Err(LedgerError::AccountNotOwned { .. })
        ));
    }

    #[test]
    fn test_kind_round_trips_through_text() {
        for kind in [AccountKind::Personal, AccountKind::Merchant, AccountKind::Group] {
            assert_eq!(kind.as_str().parse::<AccountKind>().unwrap(), kind);
        }
        assert!("SAVINGS".parse::<AccountKind>().is_err());
    }
}
