//! Account lifecycle, balances and audits

use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use core_kernel::{AccountId, Amount, UserId};

use crate::account::{Account, AccountBalance, AccountKind, AlternativeAccount, BalanceAudit};
use crate::error::LedgerError;
use crate::ledger::{Ledger, LedgerEntry, TransactionType};
use crate::ports::EngineStore;

/// Application service for accounts
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn EngineStore>,
}

impl AccountService {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    /// Opens an account with a zero balance
    #[instrument(skip(self), fields(owner = %owner_id))]
    pub async fn open_account(&self, owner_id: UserId, kind: AccountKind) -> Result<Account, LedgerError> {
        if owner_id.is_blank() {
            return Err(LedgerError::validation("caller identity is required"));
        }
        let account = Account::open(owner_id, kind);
        self.store.insert_account(&account).await?;
        info!(account_id = %account.id, kind = %kind, "Account opened");
        Ok(account)
    }

    /// Resolves an active account regardless of owner
    pub async fn resolve(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        let account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        account.ensure_active()?;
        Ok(account)
    }

    /// Resolves an active account and checks that `caller` owns it
    pub async fn resolve_owned(&self, account_id: AccountId, caller: &UserId) -> Result<Account, LedgerError> {
        let account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        account.ensure_owned_by(caller)?;
        account.ensure_active()?;
        Ok(account)
    }

    /// Closes an account that no longer holds funds
    ///
    /// Closing an already closed account returns it unchanged.
    #[instrument(skip(self), fields(account_id = %account_id, caller = %caller))]
    pub async fn close_account(&self, account_id: AccountId, caller: &UserId) -> Result<Account, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut account = tx
            .lock_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        account.ensure_owned_by(caller)?;
        if !account.is_active {
            return Ok(account);
        }

        let balance = tx
            .latest_entry(account_id)
            .await?
            .map(|entry| entry.balance_after)
            .unwrap_or(0);
        if balance != 0 {
            return Err(LedgerError::validation(format!(
                "account {} still holds {} and cannot be closed",
                account_id, balance
            )));
        }

        account.close();
        tx.save_account(&account).await?;
        tx.commit().await?;
        info!("Account closed");
        Ok(account)
    }

    /// Active accounts of the caller with their balances
    pub async fn list_owned(&self, caller: &UserId) -> Result<Vec<AccountBalance>, LedgerError> {
        let accounts = self.store.accounts_by_owner(caller).await?;
        let mut result = Vec::with_capacity(accounts.len());
        for account in accounts.into_iter().filter(|a| a.is_active) {
            let balance = self.store.current_balance(account.id).await?;
            result.push(AccountBalance { account, balance });
        }
        Ok(result)
    }

    /// Balance of an account the caller owns
    pub async fn balance(&self, account_id: AccountId, caller: &UserId) -> Result<AccountBalance, LedgerError> {
        let account = self.resolve_owned(account_id, caller).await?;
        let balance = self.store.current_balance(account_id).await?;
        Ok(AccountBalance { account, balance })
    }

    /// Compares the latest `balance_after` with the sum of all entries
    ///
    /// A mismatch is logged at error level; the sum is authoritative.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn audit_balance(&self, account_id: AccountId) -> Result<BalanceAudit, LedgerError> {
        if self.store.find_account(account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        let cached = self.store.current_balance(account_id).await?;
        let (reconstructed, entry_count) = self.store.entry_sum(account_id).await?;
        let audit = BalanceAudit {
            account_id,
            cached,
            reconstructed,
            entry_count,
        };
        if !audit.is_consistent() {
            error!(cached, reconstructed, entry_count, "Balance divergence detected");
        }
        Ok(audit)
    }

    /// Balance audit of an account the caller owns
    pub async fn audit_owned(&self, account_id: AccountId, caller: &UserId) -> Result<BalanceAudit, LedgerError> {
        self.resolve_owned(account_id, caller).await?;
        self.audit_balance(account_id).await
    }

    /// Administrative credit used to seed balances
    #[instrument(skip(self), fields(account_id = %account_id, amount = %amount))]
    pub async fn charge(&self, account_id: AccountId, amount: Amount) -> Result<LedgerEntry, LedgerError> {
        let mut tx = self.store.begin().await?;
        let locked = Ledger::lock(tx.as_mut(), account_id).await?;
        locked.account().ensure_active()?;
        let entry = Ledger::append(tx.as_mut(), &locked, amount, TransactionType::CreditCharge, None).await?;
        tx.commit().await?;
        info!(balance_after = entry.balance_after, "Account charged");
        Ok(entry)
    }

    /// Other active accounts of `caller` able to cover `amount`, richest first
    pub(crate) async fn alternatives(
        &self,
        caller: &UserId,
        excluding: AccountId,
        amount: Amount,
        limit: usize,
    ) -> Result<Vec<AlternativeAccount>, LedgerError> {
        let mut candidates = Vec::new();
        for entry in self.list_owned(caller).await? {
            if entry.account.id == excluding || entry.balance < amount.minor_units() {
                continue;
            }
            candidates.push(AlternativeAccount {
                account_id: entry.account.id,
                kind: entry.account.kind,
                balance: entry.balance,
            });
        }
        candidates.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.account_id.cmp(&b.account_id)));
        candidates.truncate(limit);
        if candidates.is_empty() {
            debug!(caller = %caller, "No alternative account can cover the amount");
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{amount, Harness};

    #[tokio::test]
    async fn test_open_requires_owner() {
        let h = Harness::new();
        let result = h
            .engine
            .accounts
            .open_account(UserId::new("  "), AccountKind::Personal)
            .await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_balance_is_owner_only() {
        let h = Harness::new();
        let account = h.funded_account("alice", 2_500).await;

        let own = h.engine.accounts.balance(account, &UserId::new("alice")).await.unwrap();
        assert_eq!(own.balance, 2_500);

        let foreign = h.engine.accounts.balance(account, &UserId::new("bob")).await;
        assert!(matches!(foreign, Err(LedgerError::AccountNotOwned { .. })));
    }

    #[tokio::test]
    async fn test_close_requires_zero_balance() {
        let h = Harness::new();
        let caller = UserId::new("alice");
        let funded = h.funded_account("alice", 10).await;
        let empty = h.funded_account("alice", 0).await;

        let result = h.engine.accounts.close_account(funded, &caller).await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));

        let closed = h.engine.accounts.close_account(empty, &caller).await.unwrap();
        assert!(!closed.is_active);
        let again = h.engine.accounts.close_account(empty, &caller).await.unwrap();
        assert_eq!(again, closed);

        let foreign = h.engine.accounts.close_account(funded, &UserId::new("bob")).await;
        assert!(matches!(foreign, Err(LedgerError::AccountNotOwned { .. })));

        let listed = h.engine.accounts.list_owned(&caller).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].account.id, funded);

        let resolved = h.engine.accounts.resolve(empty).await;
        assert!(matches!(resolved, Err(LedgerError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_charge_on_closed_account_rejected() {
        let h = Harness::new();
        let caller = UserId::new("alice");
        let account = h.funded_account("alice", 0).await;
        h.engine.accounts.close_account(account, &caller).await.unwrap();

        let result = h.engine.accounts.charge(account, amount(100)).await;
        assert!(matches!(result, Err(LedgerError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_audit_matches_entry_sum() {
        let h = Harness::new();
        let account = h.funded_account("alice", 1_000).await;
        h.engine.accounts.charge(account, amount(234)).await.unwrap();

        let audit = h.engine.accounts.audit_balance(account).await.unwrap();
        assert!(audit.is_consistent());
        assert_eq!(audit.reconstructed, 1_234);
        assert_eq!(audit.entry_count, 2);
    }

    #[tokio::test]
    async fn test_owner_audit_reports_divergence_with_sum_as_balance() {
        let h = Harness::new();
        let account = h.funded_account("alice", 1_000).await;
        h.store.skew_cached_balance(account, 50).await;

        let audit = h.engine.accounts.audit_owned(account, &UserId::new("alice")).await.unwrap();
        assert!(!audit.is_consistent());
        assert_eq!(audit.cached, 1_050);
        assert_eq!(audit.reconstructed, 1_000);

        let foreign = h.engine.accounts.audit_owned(account, &UserId::new("bob")).await;
        assert!(matches!(foreign, Err(LedgerError::AccountNotOwned { .. })));
    }

    #[tokio::test]
    async fn test_alternatives_exclude_small_and_foreign_accounts() {
        let h = Harness::new();
        let caller = UserId::new("alice");
        let payer = h.funded_account("alice", 0).await;
        let big = h.funded_account("alice", 9_000).await;
        h.funded_account("alice", 10).await;
        h.funded_account("bob", 50_000).await;

        let alternatives = h
            .engine
            .accounts
            .alternatives(&caller, payer, amount(500), 5)
            .await
            .unwrap();
        assert_eq!(alternatives.len(), 1);
        assert_eq!(alternatives[0].account_id, big);
        assert_eq!(alternatives[0].balance, 9_000);
    }
}
