//! Ledger engine on a real PostgreSQL
//!
//! Requires Docker. Run with `cargo test -p test_utils -- --ignored`.

use tokio::task::JoinSet;

use domain_ledger::{HistoryTypeFilter, LedgerError, OperationStatus, OperationStore};
use test_utils::*;

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_payment_and_replay_on_postgres() {
    let db = get_shared_test_database().await;
    let harness = EngineHarness::new();
    let engine = db.engine(&harness);
    let store = db.store();
    let owner = fake_owner();

    let account = engine.accounts.open_account(owner.clone(), domain_ledger::AccountKind::Personal).await.unwrap();
    engine.accounts.charge(account.id, AmountFixtures::of(10_000)).await.unwrap();

    let request = PaymentRequestBuilder::new(owner, account.id)
        .amount(3_000)
        .recipient(RecipientFixtures::bank_transfer())
        .session_ref("sess-1")
        .build();
    let first = engine.payments.execute_payment(request.clone()).await.unwrap();
    let replay = engine.payments.execute_payment(request.clone()).await.unwrap();

    assert!(!first.replayed);
    assert!(replay.replayed);
    assert_eq!(replay.payment.id, first.payment.id);
    assert_eq!(replay.payment.recipient, RecipientFixtures::bank_transfer());

    let stored = store.find_payment_by_key(&request.idempotency_key).await.unwrap().unwrap();
    assert_eq!(stored.status, OperationStatus::Succeeded);
    assert_eq!(stored.session_ref.as_deref(), Some("sess-1"));
    assert_eq!(assert_balance_reconstructs(&store, account.id).await, 7_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires a Docker daemon"]
async fn test_row_locks_serialize_concurrent_payments() {
    let db = get_shared_test_database().await;
    let harness = EngineHarness::new();
    let engine = db.engine(&harness);
    let owner = fake_owner();

    let account = engine.accounts.open_account(owner.clone(), domain_ledger::AccountKind::Personal).await.unwrap();
    engine.accounts.charge(account.id, AmountFixtures::of(10_000)).await.unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..2 {
        let engine = engine.clone();
        let request = PaymentRequestBuilder::new(owner.clone(), account.id).amount(6_000).build();
        tasks.spawn(async move { engine.payments.execute_payment(request).await });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        outcomes.push(joined.unwrap());
    }

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(LedgerError::InsufficientFunds { .. }))));
    assert_eq!(assert_balance_reconstructs(&db.store(), account.id).await, 4_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires a Docker daemon"]
async fn test_unique_key_admits_once_on_postgres() {
    let db = get_shared_test_database().await;
    let harness = EngineHarness::new();
    let engine = db.engine(&harness);
    let owner = fake_owner();

    let destination = engine.accounts.open_account(owner.clone(), domain_ledger::AccountKind::Group).await.unwrap();
    let request = TransferRequestBuilder::new(owner, destination.id).amount(1_500).build();

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let engine = engine.clone();
        let request = request.clone();
        tasks.spawn(async move { engine.transfers.execute_transfer(request).await });
    }
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) | Err(LedgerError::RequestInFlight { .. }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(harness.remote.debit_count(), 1);
    assert_eq!(assert_balance_reconstructs(&db.store(), destination.id).await, 1_500);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_history_pages_on_postgres() {
    let db = get_shared_test_database().await;
    let harness = EngineHarness::new();
    let engine = db.engine(&harness);
    let owner = fake_owner();

    let account = engine.accounts.open_account(owner.clone(), domain_ledger::AccountKind::Personal).await.unwrap();
    let other = engine.accounts.open_account(owner.clone(), domain_ledger::AccountKind::Personal).await.unwrap();
    engine.accounts.charge(account.id, AmountFixtures::of(100_000)).await.unwrap();

    for _ in 0..4 {
        let request = PaymentRequestBuilder::new(owner.clone(), account.id).amount(100).build();
        engine.payments.execute_payment(request).await.unwrap();
        let request = TransferRequestBuilder::new(owner.clone(), other.id)
            .from_account(account.id)
            .amount(100)
            .build();
        engine.transfers.execute_transfer(request).await.unwrap();
    }

    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = engine
            .history
            .unified_history(account.id, &owner, Some(3), HistoryTypeFilter::All, cursor)
            .await
            .unwrap();
        seen.extend(page.items.iter().map(|item| (item.created_at, item.entry_id)));
        if !page.has_more {
            break;
        }
        cursor = page.next_cursor;
    }

    assert_eq!(seen.len(), 8);
    assert!(seen.windows(2).all(|w| w[0] > w[1]));
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_journal_rejects_updates() {
    let db = get_shared_test_database().await;
    let harness = EngineHarness::new();
    let engine = db.engine(&harness);
    let owner = fake_owner();

    let account = engine.accounts.open_account(owner, domain_ledger::AccountKind::Merchant).await.unwrap();
    engine.accounts.charge(account.id, AmountFixtures::of(500)).await.unwrap();

    let result = sqlx::query("UPDATE ledger_entries SET amount = 1 WHERE account_id = $1")
        .bind(account.id.as_uuid())
        .execute(db.pool())
        .await;
    assert!(result.is_err());
    assert_eq!(assert_balance_reconstructs(&db.store(), account.id).await, 500);
}
