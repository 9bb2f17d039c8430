//! History DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::AccountId;
use domain_ledger::{EntryId, HistoryCursor, HistoryItem, HistoryKind, HistoryPage, LedgerError, TransactionType};

/// `GET /history` query parameters
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub account_id: AccountId,
    pub size: Option<usize>,
    /// `ALL`, `PAYMENTS` or `TRANSFERS`
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub cursor_created_at: Option<DateTime<Utc>>,
    pub cursor_id: Option<i64>,
}

impl HistoryQuery {
    /// Both cursor halves or neither
    pub fn cursor(&self) -> Result<Option<HistoryCursor>, LedgerError> {
        match (self.cursor_created_at, self.cursor_id) {
            (Some(created_at), Some(id)) => Ok(Some(HistoryCursor {
                created_at,
                row_id: EntryId::new(id),
            })),
            (None, None) => Ok(None),
            _ => Err(LedgerError::validation(
                "cursorCreatedAt and cursorId must be given together",
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItemResponse {
    pub entry_id: i64,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub balance_after: i64,
    pub reference_id: Uuid,
    pub counterparty: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<HistoryItem> for HistoryItemResponse {
    fn from(item: HistoryItem) -> Self {
        Self {
            entry_id: item.entry_id.value(),
            kind: item.kind,
            transaction_type: item.transaction_type,
            amount: item.amount,
            balance_after: item.balance_after,
            reference_id: item.reference_id,
            counterparty: item.counterparty,
            created_at: item.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub items: Vec<HistoryItemResponse>,
    pub next_cursor_created_at: Option<DateTime<Utc>>,
    pub next_cursor_id: Option<i64>,
    pub has_more: bool,
}

impl From<HistoryPage> for HistoryResponse {
    fn from(page: HistoryPage) -> Self {
        Self {
            next_cursor_created_at: page.next_cursor.map(|c| c.created_at),
            next_cursor_id: page.next_cursor.map(|c| c.row_id.value()),
            has_more: page.has_more,
            items: page.items.into_iter().map(HistoryItemResponse::from).collect(),
        }
    }
}
