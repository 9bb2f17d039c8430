//! Append-only journal of balance changes
//!
//! Every balance change is an immutable [`LedgerEntry`] carrying the signed
//! amount and the resulting `balance_after`. An account's balance is the
//! `balance_after` of its latest entry (zero when it has none), and always
//! equals the sum of its entries' signed amounts.
//!
//! # Invariants
//!
//! - Entries are never updated or deleted
//! - `balance_after` is never negative
//! - Entries of one account are appended while that account's row lock is held,
//!   so `entry_id` order per account is the chaining order

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use core_kernel::{AccountId, Amount, PaymentId, PortError, TransferId};

use crate::account::Account;
use crate::error::LedgerError;
use crate::ports::LedgerTx;

/// Storage-assigned, monotonically increasing entry identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(i64);

impl EntryId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
}

/// What caused a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Destination side of a transfer
    CreditTransferIn,
    /// Source side of an internal transfer
    DebitTransferOut,
    /// Payer side of a payment
    DebitPayment,
    /// Administrative top-up
    CreditCharge,
}

impl TransactionType {
    pub fn direction(&self) -> Direction {
        match self {
            TransactionType::CreditTransferIn | TransactionType::CreditCharge => Direction::Credit,
            TransactionType::DebitTransferOut | TransactionType::DebitPayment => Direction::Debit,
        }
    }

    /// Signed delta this entry type applies for `amount`
    pub fn signed(&self, amount: Amount) -> i64 {
        match self.direction() {
            Direction::Credit => amount.as_credit(),
            Direction::Debit => amount.as_debit(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::CreditTransferIn => "CREDIT_TRANSFER_IN",
            TransactionType::DebitTransferOut => "DEBIT_TRANSFER_OUT",
            TransactionType::DebitPayment => "DEBIT_PAYMENT",
            TransactionType::CreditCharge => "CREDIT_CHARGE",
        }
    }
}

impl FromStr for TransactionType {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREDIT_TRANSFER_IN" => Ok(TransactionType::CreditTransferIn),
            "DEBIT_TRANSFER_OUT" => Ok(TransactionType::DebitTransferOut),
            "DEBIT_PAYMENT" => Ok(TransactionType::DebitPayment),
            "CREDIT_CHARGE" => Ok(TransactionType::CreditCharge),
            other => Err(PortError::transformation(format!(
                "unknown transaction type '{}'",
                other
            ))),
        }
    }
}

/// The operation an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryReference {
    Transfer(TransferId),
    Payment(PaymentId),
}

impl EntryReference {
    pub fn kind_str(&self) -> &'static str {
        match self {
            EntryReference::Transfer(_) => "TRANSFER",
            EntryReference::Payment(_) => "PAYMENT",
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            EntryReference::Transfer(id) => *id.as_uuid(),
            EntryReference::Payment(id) => *id.as_uuid(),
        }
    }

    /// Rebuilds a reference from its stored columns
    pub fn from_parts(kind: Option<&str>, id: Option<Uuid>) -> Result<Option<Self>, PortError> {
        match (kind, id) {
            (None, None) => Ok(None),
            (Some("TRANSFER"), Some(id)) => Ok(Some(EntryReference::Transfer(TransferId::from_uuid(id)))),
            (Some("PAYMENT"), Some(id)) => Ok(Some(EntryReference::Payment(PaymentId::from_uuid(id)))),
            (kind, id) => Err(PortError::transformation(format!(
                "malformed entry reference kind={:?} id={:?}",
                kind, id
            ))),
        }
    }
}

/// A committed, immutable journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub transaction_type: TransactionType,
    /// Signed amount: positive for credits, negative for debits
    pub amount: i64,
    pub balance_after: i64,
    pub reference: Option<EntryReference>,
    pub created_at: DateTime<Utc>,
}

/// An entry about to be inserted; storage assigns the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub account_id: AccountId,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub balance_after: i64,
    pub reference: Option<EntryReference>,
    pub created_at: DateTime<Utc>,
}

impl NewLedgerEntry {
    /// Attaches the storage-assigned id
    pub fn into_entry(self, id: EntryId) -> LedgerEntry {
        LedgerEntry {
            id,
            account_id: self.account_id,
            transaction_type: self.transaction_type,
            amount: self.amount,
            balance_after: self.balance_after,
            reference: self.reference,
            created_at: self.created_at,
        }
    }
}

/// An account whose row lock is held by the current unit of work
///
/// Only [`Ledger::lock`] produces one, so [`Ledger::append`] cannot be called
/// for an account that was not locked first.
#[derive(Debug)]
pub struct LockedAccount {
    account: Account,
}

impl LockedAccount {
    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn id(&self) -> AccountId {
        self.account.id
    }
}

/// Journal operations performed inside a unit of work
pub struct Ledger;

impl Ledger {
    /// Takes the row lock for an account within `tx`
    ///
    /// Closed accounts are still returned; callers decide whether that matters.
    pub async fn lock(tx: &mut dyn LedgerTx, account_id: AccountId) -> Result<LockedAccount, LedgerError> {
        let account = tx
            .lock_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        Ok(LockedAccount { account })
    }

    /// Locks several accounts in ascending id order
    ///
    /// All multi-account units of work go through here so two of them can
    /// never wait on each other's locks. Results come back in request order.
    pub async fn lock_all(
        tx: &mut dyn LedgerTx,
        account_ids: &[AccountId],
    ) -> Result<Vec<LockedAccount>, LedgerError> {
        let mut order: Vec<usize> = (0..account_ids.len()).collect();
        order.sort_by_key(|&i| account_ids[i]);

        let mut slots: Vec<Option<LockedAccount>> = account_ids.iter().map(|_| None).collect();
        for i in order {
            slots[i] = Some(Self::lock(tx, account_ids[i]).await?);
        }
        slots
            .into_iter()
            .zip(account_ids)
            .map(|(slot, id)| slot.ok_or(LedgerError::AccountNotFound(*id)))
            .collect()
    }

    /// Appends an entry for a locked account
    ///
    /// # Errors
    ///
    /// - `InsufficientFunds` if the entry would drive the balance below zero;
    ///   nothing is written in that case
    /// - `Port` for storage failures
    pub async fn append(
        tx: &mut dyn LedgerTx,
        account: &LockedAccount,
        amount: Amount,
        transaction_type: TransactionType,
        reference: Option<EntryReference>,
    ) -> Result<LedgerEntry, LedgerError> {
        let account_id = account.id();
        let current = tx
            .latest_entry(account_id)
            .await?
            .map(|entry| entry.balance_after)
            .unwrap_or(0);

        let delta = transaction_type.signed(amount);
        let balance_after = Amount::apply_to(current, delta)?;
        if balance_after < 0 {
            return Err(LedgerError::InsufficientFunds {
                account_id,
                balance: current,
                requested: amount.minor_units(),
                alternatives: Vec::new(),
            });
        }

        let entry = tx
            .insert_entry(NewLedgerEntry {
                account_id,
                transaction_type,
                amount: delta,
                balance_after,
                reference,
                created_at: Utc::now(),
            })
            .await?;

        debug!(
            account_id = %account_id,
            entry_id = %entry.id,
            transaction_type = transaction_type.as_str(),
            balance_after,
            "Ledger entry appended"
        );
        Ok(entry)
    }

    /// Sums the signed amounts of a set of entries
    pub fn reconstruct_balance(entries: &[LedgerEntry]) -> i64 {
        entries.iter().map(|entry| entry.amount).sum()
    }

    /// Checks that each entry chains from its predecessor
    ///
    /// Entries must be in append order. Returns the final balance.
    pub fn verify_chain(entries: &[LedgerEntry]) -> Result<i64, LedgerError> {
        let mut running = 0i64;
        for entry in entries {
            running = Amount::apply_to(running, entry.amount)?;
            if running != entry.balance_after || entry.balance_after < 0 {
                return Err(LedgerError::BalanceDivergence {
                    account_id: entry.account_id,
                    cached: entry.balance_after,
                    reconstructed: running,
                });
            }
        }
        Ok(running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, account_id: AccountId, amount: i64, balance_after: i64) -> LedgerEntry {
        LedgerEntry {
            id: EntryId::new(id),
            account_id,
            transaction_type: if amount >= 0 {
                TransactionType::CreditCharge
            } else {
                TransactionType::DebitPayment
            },
            amount,
            balance_after,
            reference: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_signed_amounts_follow_direction() {
        let amount = Amount::new(700).unwrap();
        assert_eq!(TransactionType::CreditTransferIn.signed(amount), 700);
        assert_eq!(TransactionType::CreditCharge.signed(amount), 700);
        assert_eq!(TransactionType::DebitTransferOut.signed(amount), -700);
        assert_eq!(TransactionType::DebitPayment.signed(amount), -700);
    }

    #[test]
    fn test_verify_chain_accepts_consistent_entries() {
        let account = AccountId::new();
        let entries = vec![
            entry(1, account, 10_000, 10_000),
            entry(2, account, -3_000, 7_000),
            entry(3, account, 500, 7_500),
        ];
        assert_eq!(Ledger::verify_chain(&entries).unwrap(), 7_500);
        assert_eq!(Ledger::reconstruct_balance(&entries), 7_500);
    }

    #[test]
    fn test_verify_chain_detects_divergence() {
        let account = AccountId::new();
        let entries = vec![entry(1, account, 10_000, 10_000), entry(2, account, -3_000, 6_000)];
        assert!(matches!(
            Ledger::verify_chain(&entries),
            Err(LedgerError::BalanceDivergence { cached: 6_000, reconstructed: 7_000, .. })
        ));
    }

    #[test]
    fn test_reference_from_parts() {
        let id = TransferId::new();
        let reference = EntryReference::from_parts(Some("TRANSFER"), Some(*id.as_uuid())).unwrap();
        assert_eq!(reference, Some(EntryReference::Transfer(id)));
        assert_eq!(EntryReference::from_parts(None, None).unwrap(), None);
        assert!(EntryReference::from_parts(Some("PAYMENT"), None).is_err());
    }

    #[test]
    fn test_transaction_type_text() {
        assert_eq!(
            "DEBIT_PAYMENT".parse::<TransactionType>().unwrap(),
            TransactionType::DebitPayment
        );
        assert!("REFUND".parse::<TransactionType>().is_err());
    }
}
