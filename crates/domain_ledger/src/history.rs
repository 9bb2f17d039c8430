//! Unified account history
//!
//! History is read from ledger entries that reference a payment or a
//! transfer. Each source is queried separately with the same keyset bound and
//! the slices are merged here, newest first.
//!
//! Ordering is `(created_at DESC, entry_id DESC)`. Entry ids are unique and
//! monotonic, so the pair is a total order and a cursor taken from the last
//! row of a page never repeats or skips a row on the next page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use uuid::Uuid;

use core_kernel::AccountId;

use crate::error::LedgerError;
use crate::ledger::{EntryId, TransactionType};
use crate::transfer::FundingSource;

/// Source of a history row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryKind {
    Payment,
    Transfer,
}

/// Which sources a caller wants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryTypeFilter {
    #[default]
    All,
    Payments,
    Transfers,
}

impl HistoryTypeFilter {
    pub fn kinds(&self) -> &'static [HistoryKind] {
        match self {
            HistoryTypeFilter::All => &[HistoryKind::Payment, HistoryKind::Transfer],
            HistoryTypeFilter::Payments => &[HistoryKind::Payment],
            HistoryTypeFilter::Transfers => &[HistoryKind::Transfer],
        }
    }
}

impl FromStr for HistoryTypeFilter {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "" | "ALL" => Ok(HistoryTypeFilter::All),
            "PAYMENT" | "PAYMENTS" => Ok(HistoryTypeFilter::Payments),
            "TRANSFER" | "TRANSFERS" => Ok(HistoryTypeFilter::Transfers),
            other => Err(LedgerError::validation(format!("unknown history type '{}'", other))),
        }
    }
}

/// Keyset position: rows strictly older than this are returned next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryCursor {
    pub created_at: DateTime<Utc>,
    pub row_id: EntryId,
}

impl HistoryCursor {
    /// True if a row at `(created_at, row_id)` comes after this cursor
    pub fn admits(&self, created_at: DateTime<Utc>, row_id: EntryId) -> bool {
        (created_at, row_id) < (self.created_at, self.row_id)
    }
}

/// One row of the unified history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub entry_id: EntryId,
    pub kind: HistoryKind,
    pub transaction_type: TransactionType,
    /// Signed amount as recorded on the entry
    pub amount: i64,
    pub balance_after: i64,
    /// Payment or transfer id
    pub reference_id: Uuid,
    /// Recipient name for payments, funding side for transfers
    pub counterparty: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HistoryItem {
    pub fn cursor(&self) -> HistoryCursor {
        HistoryCursor {
            created_at: self.created_at,
            row_id: self.entry_id,
        }
    }

    fn newest_first(a: &HistoryItem, b: &HistoryItem) -> Ordering {
        (b.created_at, b.entry_id).cmp(&(a.created_at, a.entry_id))
    }
}

/// Label of the other side of a transfer entry
///
/// The credit side names the funding source, the debit side names the
/// destination account.
pub fn transfer_counterparty(
    transaction_type: TransactionType,
    funding: &FundingSource,
    destination_account_id: AccountId,
) -> String {
    match (transaction_type, funding) {
        (TransactionType::DebitTransferOut, _) => destination_account_id.to_string(),
        (_, FundingSource::Internal { source_account_id }) => source_account_id.to_string(),
        (_, FundingSource::Remote { remote_owner_id }) => format!("remote:{}", remote_owner_id),
    }
}

/// A page of history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub items: Vec<HistoryItem>,
    /// Present only when `has_more` is true
    pub next_cursor: Option<HistoryCursor>,
    pub has_more: bool,
}

impl HistoryPage {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }
}

/// Merges per-source slices into one page
///
/// Each slice must already be bounded by the same cursor and hold at most
/// `page_size + 1` rows; the extra lookahead row decides `has_more`.
pub fn merge_page(slices: Vec<Vec<HistoryItem>>, page_size: usize) -> HistoryPage {
    let mut items: Vec<HistoryItem> = slices.into_iter().flatten().collect();
    items.sort_by(HistoryItem::newest_first);
    items.dedup_by_key(|item| item.entry_id);

    let has_more = items.len() > page_size;
    items.truncate(page_size);
    let next_cursor = if has_more {
        items.last().map(HistoryItem::cursor)
    } else {
        None
    };

    HistoryPage {
        items,
        next_cursor,
        has_more,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(id: i64, kind: HistoryKind, secs: i64) -> HistoryItem {
        HistoryItem {
            entry_id: EntryId::new(id),
            kind,
            transaction_type: match kind {
                HistoryKind::Payment => TransactionType::DebitPayment,
                HistoryKind::Transfer => TransactionType::CreditTransferIn,
            },
            amount: 100,
            balance_after: 100,
            reference_id: Uuid::new_v4(),
            counterparty: None,
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_merge_orders_newest_first_with_id_tiebreak() {
        let payments = vec![item(4, HistoryKind::Payment, 10), item(1, HistoryKind::Payment, 5)];
        let transfers = vec![item(5, HistoryKind::Transfer, 10), item(2, HistoryKind::Transfer, 7)];
        let page = merge_page(vec![payments, transfers], 10);
        let ids: Vec<i64> = page.items.iter().map(|i| i.entry_id.value()).collect();
        assert_eq!(ids, vec![5, 4, 2, 1]);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_lookahead_row_sets_has_more() {
        let rows = vec![
            item(3, HistoryKind::Payment, 3),
            item(2, HistoryKind::Payment, 2),
            item(1, HistoryKind::Payment, 1),
        ];
        let page = merge_page(vec![rows], 2);
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more);
        let cursor = page.next_cursor.unwrap();
        assert_eq!(cursor.row_id, EntryId::new(2));
        assert!(cursor.admits(item(1, HistoryKind::Payment, 1).created_at, EntryId::new(1)));
        assert!(!cursor.admits(cursor.created_at, cursor.row_id));
    }

    #[test]
    fn test_transfer_counterparty_sides() {
        let source = AccountId::new();
        let destination = AccountId::new();
        let funding = FundingSource::Internal { source_account_id: source };
        assert_eq!(
            transfer_counterparty(TransactionType::CreditTransferIn, &funding, destination),
            source.to_string()
        );
        assert_eq!(
            transfer_counterparty(TransactionType::DebitTransferOut, &funding, destination),
            destination.to_string()
        );
        let remote = FundingSource::Remote {
            remote_owner_id: core_kernel::UserId::new("carol"),
        };
        assert_eq!(
            transfer_counterparty(TransactionType::CreditTransferIn, &remote, destination),
            "remote:carol"
        );
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!("payments".parse::<HistoryTypeFilter>().unwrap(), HistoryTypeFilter::Payments);
        assert_eq!("TRANSFER".parse::<HistoryTypeFilter>().unwrap(), HistoryTypeFilter::Transfers);
        assert_eq!("".parse::<HistoryTypeFilter>().unwrap(), HistoryTypeFilter::All);
        assert!("charges".parse::<HistoryTypeFilter>().is_err());
    }
}
