//! Keyset-paginated account history

use std::sync::Arc;
use tracing::{debug, instrument};

use core_kernel::{AccountId, UserId};

use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::history::{merge_page, HistoryCursor, HistoryPage, HistoryTypeFilter};
use crate::ports::EngineStore;

/// Read-side query over payment and transfer entries
#[derive(Clone)]
pub struct HistoryCursorQuery {
    store: Arc<dyn EngineStore>,
    config: EngineConfig,
}

impl HistoryCursorQuery {
    pub fn new(store: Arc<dyn EngineStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// One page of the account's history, newest first
    ///
    /// Ownership is checked before any row is read; a foreign account yields
    /// `AccountNotOwned`. Closed accounts keep their history.
    #[instrument(skip(self), fields(account_id = %account_id, caller = %caller))]
    pub async fn unified_history(
        &self,
        account_id: AccountId,
        caller: &UserId,
        page_size: Option<usize>,
        filter: HistoryTypeFilter,
        cursor: Option<HistoryCursor>,
    ) -> Result<HistoryPage, LedgerError> {
        let account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        account.ensure_owned_by(caller)?;

        let page_size = self.config.page_size(page_size);
        let mut slices = Vec::with_capacity(filter.kinds().len());
        for kind in filter.kinds() {
            slices.push(
                self.store
                    .history_slice(account_id, *kind, cursor, page_size + 1)
                    .await?,
            );
        }

        let page = merge_page(slices, page_size);
        debug!(items = page.items.len(), has_more = page.has_more, "History page assembled");
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryKind;
    use crate::payment::{PaymentRequest, RecipientDescriptor};
    use crate::services::test_support::{amount, key, Harness};
    use crate::transfer::{FundingSource, TransferRequest};
    use std::collections::HashSet;

    async fn seeded(h: &Harness) -> AccountId {
        let account = h.funded_account("alice", 100_000).await;
        let other = h.funded_account("alice", 0).await;
        for i in 0..7 {
            h.engine
                .payments
                .execute_payment(PaymentRequest {
                    caller_id: UserId::new("alice"),
                    payer_account_id: account,
                    amount: amount(100 + i),
                    recipient: RecipientDescriptor::named("Shop"),
                    idempotency_key: key(&format!("hp-{}", i)),
                    session_ref: None,
                })
                .await
                .unwrap();
        }
        for i in 0..5 {
            h.engine
                .transfers
                .execute_transfer(TransferRequest {
                    caller_id: UserId::new("alice"),
                    destination_account_id: other,
                    amount: amount(200 + i),
                    funding: FundingSource::Internal {
                        source_account_id: account,
                    },
                    idempotency_key: key(&format!("ht-{}", i)),
                })
                .await
                .unwrap();
        }
        account
    }

    #[tokio::test]
    async fn test_pages_cover_every_entry_once() {
        let h = Harness::new();
        let account = seeded(&h).await;
        let caller = UserId::new("alice");

        let mut seen = HashSet::new();
        let mut cursor = None;
        let mut pages = 0;
        loop {
            let page = h
                .engine
                .history
                .unified_history(account, &caller, Some(5), HistoryTypeFilter::All, cursor)
                .await
                .unwrap();
            pages += 1;
            for item in &page.items {
                assert!(seen.insert(item.entry_id), "entry returned twice");
            }
            if !page.has_more {
                assert!(page.next_cursor.is_none());
                break;
            }
            cursor = page.next_cursor;
        }

        // The opening charge is not a payment or transfer entry
        assert_eq!(seen.len(), 12);
        assert_eq!(pages, 3);
    }

    #[tokio::test]
    async fn test_filter_limits_kind() {
        let h = Harness::new();
        let account = seeded(&h).await;

        let page = h
            .engine
            .history
            .unified_history(account, &UserId::new("alice"), Some(50), HistoryTypeFilter::Transfers, None)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 5);
        assert!(page.items.iter().all(|item| item.kind == HistoryKind::Transfer));
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_foreign_caller_is_rejected() {
        let h = Harness::new();
        let account = seeded(&h).await;

        let result = h
            .engine
            .history
            .unified_history(account, &UserId::new("mallory"), None, HistoryTypeFilter::All, None)
            .await;
        assert!(matches!(result, Err(LedgerError::AccountNotOwned { .. })));
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let h = Harness::new();
        let result = h
            .engine
            .history
            .unified_history(AccountId::new(), &UserId::new("alice"), None, HistoryTypeFilter::All, None)
            .await;
        assert!(matches!(result, Err(LedgerError::AccountNotFound(_))));
    }
}
