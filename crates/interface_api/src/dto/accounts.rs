//! Account DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::{AccountId, UserId};
use domain_ledger::{Account, AccountBalance, AccountKind, AlternativeAccount, BalanceAudit};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OpenAccountRequest {
    pub kind: AccountKind,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub account_id: AccountId,
    pub owner_id: UserId,
    pub kind: AccountKind,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
}

impl AccountResponse {
    pub fn with_balance(account: Account, balance: i64) -> Self {
        Self {
            balance: Some(balance),
            ..account.into()
        }
    }
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            account_id: account.id,
            owner_id: account.owner_id,
            kind: account.kind,
            is_active: account.is_active,
            created_at: account.created_at,
            balance: None,
        }
    }
}

impl From<AccountBalance> for AccountResponse {
    fn from(value: AccountBalance) -> Self {
        Self::with_balance(value.account, value.balance)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub account_id: AccountId,
    /// Minor currency units
    pub balance: i64,
}

/// Cached balance against the sum of entries; `balance` is the sum
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceAuditResponse {
    pub account_id: AccountId,
    pub balance: i64,
    pub cached_balance: i64,
    pub entry_count: u64,
    pub consistent: bool,
}

impl From<BalanceAudit> for BalanceAuditResponse {
    fn from(audit: BalanceAudit) -> Self {
        Self {
            account_id: audit.account_id,
            balance: audit.reconstructed,
            cached_balance: audit.cached,
            entry_count: audit.entry_count,
            consistent: audit.is_consistent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeAccountResponse {
    pub account_id: AccountId,
    pub kind: AccountKind,
    pub balance: i64,
}

impl From<&AlternativeAccount> for AlternativeAccountResponse {
    fn from(alt: &AlternativeAccount) -> Self {
        Self {
            account_id: alt.account_id,
            kind: alt.kind,
            balance: alt.balance,
        }
    }
}
