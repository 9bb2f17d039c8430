//! Tests for the ledger value types and page assembly

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use core_kernel::{AccountId, Amount, TransferId, UserId};

use domain_ledger::history::{merge_page, HistoryCursor, HistoryItem, HistoryKind, HistoryTypeFilter};
use domain_ledger::idempotency::IdempotencyKey;
use domain_ledger::ledger::{EntryId, EntryReference, Ledger, LedgerEntry, TransactionType};
use domain_ledger::operation::{FailureCode, OperationStatus};
use domain_ledger::transfer::{FundingSource, Transfer, TransferRequest};
use domain_ledger::LedgerError;

fn amount(minor_units: i64) -> Amount {
    Amount::new(minor_units).unwrap()
}

// ============================================================================
// Journal Tests
// ============================================================================

mod journal_tests {
    use super::*;

    fn chain(account_id: AccountId, deltas: &[i64]) -> Vec<LedgerEntry> {
        let mut balance = 0;
        deltas
            .iter()
            .enumerate()
            .map(|(i, delta)| {
                balance += delta;
                LedgerEntry {
                    id: EntryId::new(i as i64 + 1),
                    account_id,
                    transaction_type: if *delta > 0 {
                        TransactionType::CreditTransferIn
                    } else {
                        TransactionType::DebitPayment
                    },
                    amount: *delta,
                    balance_after: balance,
                    reference: None,
                    created_at: Utc::now(),
                }
            })
            .collect()
    }

    #[test]
    fn test_signed_amount_follows_direction() {
        let a = amount(750);
        assert_eq!(TransactionType::CreditTransferIn.signed(a), 750);
        assert_eq!(TransactionType::CreditCharge.signed(a), 750);
        assert_eq!(TransactionType::DebitTransferOut.signed(a), -750);
        assert_eq!(TransactionType::DebitPayment.signed(a), -750);
    }

    #[test]
    fn test_verify_chain_returns_final_balance() {
        let entries = chain(AccountId::new(), &[10_000, -3_000, -2_000, 500]);
        assert_eq!(Ledger::verify_chain(&entries).unwrap(), 5_500);
        assert_eq!(Ledger::reconstruct_balance(&entries), 5_500);
    }

    #[test]
    fn test_verify_chain_detects_tampered_balance() {
        let mut entries = chain(AccountId::new(), &[10_000, -3_000]);
        entries[1].balance_after = 8_000;

        let result = Ledger::verify_chain(&entries);
        assert!(matches!(
            result,
            Err(LedgerError::BalanceDivergence { cached: 8_000, reconstructed: 7_000, .. })
        ));
    }

    #[test]
    fn test_verify_chain_rejects_negative_balance() {
        let entries = chain(AccountId::new(), &[100, -200]);
        assert!(Ledger::verify_chain(&entries).is_err());
    }

    #[test]
    fn test_reference_round_trip_through_columns() {
        let id = TransferId::new();
        let reference = EntryReference::Transfer(id);

        let rebuilt = EntryReference::from_parts(Some(reference.kind_str()), Some(reference.uuid())).unwrap();
        assert_eq!(rebuilt, Some(reference));
        assert_eq!(EntryReference::from_parts(None, None).unwrap(), None);
        assert!(EntryReference::from_parts(Some("REFUND"), Some(Uuid::new_v4())).is_err());
    }

    proptest! {
        #[test]
        fn prop_well_formed_chain_always_verifies(deltas in prop::collection::vec(1i64..10_000, 1..40)) {
            // Alternate credits and debits that never overdraw
            let mut balance = 0i64;
            let mut signed = Vec::new();
            for (i, delta) in deltas.iter().enumerate() {
                if i % 2 == 1 && *delta <= balance {
                    signed.push(-delta);
                    balance -= delta;
                } else {
                    signed.push(*delta);
                    balance += delta;
                }
            }
            let entries = chain(AccountId::new(), &signed);
            prop_assert_eq!(Ledger::verify_chain(&entries).unwrap(), balance);
            prop_assert_eq!(Ledger::reconstruct_balance(&entries), balance);
        }
    }
}

// ============================================================================
// Idempotency Tests
// ============================================================================

mod idempotency_tests {
    use super::*;

    #[test]
    fn test_key_limits() {
        assert!(IdempotencyKey::parse("order-42").is_ok());
        assert!(IdempotencyKey::parse("").is_err());
        assert!(IdempotencyKey::parse("has space").is_err());
        assert!(IdempotencyKey::parse("k".repeat(128)).is_ok());
        assert!(IdempotencyKey::parse("k".repeat(129)).is_err());
    }

    #[test]
    fn test_transfer_state_machine() {
        let request = TransferRequest {
            caller_id: UserId::new("alice"),
            destination_account_id: AccountId::new(),
            amount: amount(1_000),
            funding: FundingSource::Remote {
                remote_owner_id: UserId::new("alice"),
            },
            idempotency_key: IdempotencyKey::parse("sm-1").unwrap(),
        };
        let mut transfer = Transfer::pending(&request);
        assert_eq!(transfer.status, OperationStatus::Pending);

        transfer.fail(FailureCode::RemoteTimeout, "slow").unwrap();
        assert!(transfer.is_terminal());
        assert!(transfer.completed_at.is_some());

        assert!(matches!(
            transfer.succeed(1_000, None),
            Err(LedgerError::InvalidStateTransition(_))
        ));
        assert_eq!(transfer.status, OperationStatus::Failed);
    }

    proptest! {
        #[test]
        fn prop_printable_keys_round_trip(raw in "[!-~]{1,128}") {
            let key = IdempotencyKey::parse(raw.clone()).unwrap();
            prop_assert_eq!(key.as_str(), raw.as_str());
        }
    }
}

// ============================================================================
// History Page Tests
// ============================================================================

mod history_tests {
    use super::*;

    fn item(id: i64, seconds: i64, kind: HistoryKind) -> HistoryItem {
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
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + Duration::seconds(seconds),
        }
    }

    /// Emulates the store: rows of one kind strictly after the cursor, newest first
    fn slice(rows: &[HistoryItem], kind: HistoryKind, cursor: Option<HistoryCursor>, limit: usize) -> Vec<HistoryItem> {
        let mut matching: Vec<HistoryItem> = rows
            .iter()
            .filter(|row| row.kind == kind)
            .filter(|row| cursor.map_or(true, |c| c.admits(row.created_at, row.entry_id)))
            .cloned()
            .collect();
        matching.sort_by(|a, b| (b.created_at, b.entry_id).cmp(&(a.created_at, a.entry_id)));
        matching.truncate(limit);
        matching
    }

    fn walk(rows: &[HistoryItem], page_size: usize) -> Vec<EntryId> {
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let slices = HistoryTypeFilter::All
                .kinds()
                .iter()
                .map(|kind| slice(rows, *kind, cursor, page_size + 1))
                .collect();
            let page = merge_page(slices, page_size);
            seen.extend(page.items.iter().map(|i| i.entry_id));
            if !page.has_more {
                return seen;
            }
            cursor = page.next_cursor;
        }
    }

    #[test]
    fn test_equal_timestamps_break_ties_by_id() {
        let rows = vec![
            item(1, 0, HistoryKind::Payment),
            item(2, 0, HistoryKind::Transfer),
            item(3, 0, HistoryKind::Payment),
        ];
        let seen = walk(&rows, 1);
        assert_eq!(seen, vec![EntryId::new(3), EntryId::new(2), EntryId::new(1)]);
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!("payments".parse::<HistoryTypeFilter>().unwrap(), HistoryTypeFilter::Payments);
        assert_eq!("TRANSFER".parse::<HistoryTypeFilter>().unwrap(), HistoryTypeFilter::Transfers);
        assert_eq!("".parse::<HistoryTypeFilter>().unwrap(), HistoryTypeFilter::All);
        assert!("refunds".parse::<HistoryTypeFilter>().is_err());
    }

    proptest! {
        #[test]
        fn prop_pagination_visits_every_row_once(
            shape in prop::collection::vec((0i64..20, any::<bool>()), 0..60),
            page_size in 1usize..8,
        ) {
            let rows: Vec<HistoryItem> = shape
                .iter()
                .enumerate()
                .map(|(i, (seconds, is_payment))| {
                    let kind = if *is_payment { HistoryKind::Payment } else { HistoryKind::Transfer };
                    item(i as i64 + 1, *seconds, kind)
                })
                .collect();

            let seen = walk(&rows, page_size);

            let mut expected: Vec<EntryId> = rows.iter().map(|r| r.entry_id).collect();
            expected.sort();
            let mut actual = seen.clone();
            actual.sort();
            prop_assert_eq!(actual, expected);

            // Strictly newest first across page boundaries
            let order: Vec<_> = seen
                .iter()
                .map(|id| {
                    let row = rows.iter().find(|r| r.entry_id == *id).unwrap();
                    (row.created_at, row.entry_id)
                })
                .collect();
            prop_assert!(order.windows(2).all(|w| w[0] > w[1]));
        }
    }
}
