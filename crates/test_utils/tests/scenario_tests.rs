//! End-to-end scenarios and properties on the in-memory adapters

use std::time::Duration;

use chrono::Utc;
use proptest::prelude::*;
use tokio::task::JoinSet;

use domain_ledger::memory::MockRemoteBehavior;
use domain_ledger::{HistoryTypeFilter, LedgerError, OperationStatus, OperationStore};
use test_utils::*;

// ============================================================================
// Documented Scenarios
// ============================================================================

mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_payment_then_replay_keeps_balance() {
        let harness = EngineHarness::new();
        let alice = OwnerFixtures::alice();
        let account = harness.open_funded_account(&alice, 10_000).await;
        let key = KeyFixtures::unique("scenario-pay");

        let request = PaymentRequestBuilder::new(alice.clone(), account)
            .amount(3_000)
            .key(key.clone())
            .build();
        let first = harness.engine.payments.execute_payment(request.clone()).await.unwrap();
        assert_eq!(first.payment.status, OperationStatus::Succeeded);
        assert_eq!(harness.balance(account).await, 7_000);

        let replay = harness.engine.payments.execute_payment(request).await.unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.payment.id, first.payment.id);
        assert_eq!(assert_balance_reconstructs(&harness.store, account).await, 7_000);
    }

    #[tokio::test]
    async fn test_failed_remote_funding_leaves_destination_untouched() {
        let harness = EngineHarness::new().with_remote(MockRemoteBehavior::Reject("declined".into()));
        let bob = OwnerFixtures::bob();
        let destination = harness.open_funded_account(&bob, 0).await;
        let request = TransferRequestBuilder::new(bob, destination).amount(50_000).build();
        let key = request.idempotency_key.clone();

        let result = harness.engine.transfers.execute_transfer(request).await;
        assert_error_code(&result, "REMOTE_FUNDING_FAILED");

        let stored = harness.store.find_transfer_by_key(&key).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Failed);
        assert_eq!(assert_balance_reconstructs(&harness.store, destination).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_concurrent_payments_one_succeeds() {
        let harness = EngineHarness::new();
        let alice = OwnerFixtures::alice();
        let account = harness.open_funded_account(&alice, 10_000).await;

        let mut tasks = JoinSet::new();
        for _ in 0..2 {
            let engine = harness.engine.clone();
            let request = PaymentRequestBuilder::new(alice.clone(), account).amount(6_000).build();
            tasks.spawn(async move { engine.payments.execute_payment(request).await });
        }

        let mut succeeded = 0;
        let mut insufficient = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined.unwrap() {
                Ok(_) => succeeded += 1,
                Err(LedgerError::InsufficientFunds { .. }) => insufficient += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!((succeeded, insufficient), (1, 1));
        assert_eq!(assert_balance_reconstructs(&harness.store, account).await, 4_000);
    }
}

// ============================================================================
// Concurrency Tests
// ============================================================================

mod concurrency_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_same_key_executes_once() {
        let harness = EngineHarness::new();
        let alice = OwnerFixtures::alice();
        let account = harness.open_funded_account(&alice, 10_000).await;
        let request = PaymentRequestBuilder::new(alice, account).amount(1_000).build();

        let mut tasks = JoinSet::new();
        for _ in 0..16 {
            let engine = harness.engine.clone();
            let request = request.clone();
            tasks.spawn(async move { engine.payments.execute_payment(request).await });
        }

        let mut payment_ids = Vec::new();
        let mut fresh = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined.unwrap() {
                Ok(receipt) => {
                    if !receipt.replayed {
                        fresh += 1;
                    }
                    payment_ids.push(receipt.payment.id);
                }
                Err(LedgerError::RequestInFlight { .. }) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(fresh, 1);
        assert!(payment_ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(assert_balance_reconstructs(&harness.store, account).await, 9_000);

        // Once settled every retry is a replay of the same payment
        let retry = harness.engine.payments.execute_payment(request).await.unwrap();
        assert!(retry.replayed);
        assert_eq!(Some(retry.payment.id), payment_ids.first().copied());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_opposite_internal_transfers_do_not_deadlock() {
        let harness = EngineHarness::new();
        let carol = OwnerFixtures::alice();
        let left = harness.open_funded_account(&carol, 50_000).await;
        let right = harness.open_funded_account(&carol, 50_000).await;

        let mut tasks = JoinSet::new();
        for i in 0..40 {
            let engine = harness.engine.clone();
            let (from, to) = if i % 2 == 0 { (left, right) } else { (right, left) };
            let request = TransferRequestBuilder::new(carol.clone(), to)
                .from_account(from)
                .amount(700)
                .build();
            tasks.spawn(async move { engine.transfers.execute_transfer(request).await });
        }

        let all = async {
            while let Some(joined) = tasks.join_next().await {
                joined.unwrap().unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(10), all)
            .await
            .expect("transfers finished without deadlock");

        let left_balance = assert_balance_reconstructs(&harness.store, left).await;
        let right_balance = assert_balance_reconstructs(&harness.store, right).await;
        assert_eq!(left_balance + right_balance, 100_000);
        assert_eq!(left_balance, 50_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_remote_credits_all_land() {
        let harness = EngineHarness::new();
        let dave = OwnerFixtures::bob();
        let destination = harness.open_funded_account(&dave, 0).await;

        let mut tasks = JoinSet::new();
        for _ in 0..25 {
            let engine = harness.engine.clone();
            let request = TransferRequestBuilder::new(dave.clone(), destination).amount(400).build();
            tasks.spawn(async move { engine.transfers.execute_transfer(request).await });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        assert_eq!(assert_balance_reconstructs(&harness.store, destination).await, 10_000);
        assert_eq!(harness.remote.debited_total(), 10_000);
    }
}

// ============================================================================
// Reconciliation Tests
// ============================================================================

mod reconciliation_tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_credits_a_stranded_remote_transfer() {
        let harness = EngineHarness::new();
        let erin = OwnerFixtures::alice();
        let destination = harness.open_funded_account(&erin, 0).await;
        let request = TransferRequestBuilder::new(erin, destination).amount(2_500).build();
        let key = request.idempotency_key.clone();

        harness.store.fail_next_commits(1);
        assert!(harness.engine.transfers.execute_transfer(request).await.is_err());
        assert_eq!(harness.balance(destination).await, 0);

        let later = Utc::now() + chrono::Duration::minutes(5);
        let report = harness.engine.reconciliation.run_once(later).await.unwrap();
        assert_eq!(report.succeeded, 1);

        let stored = harness.store.find_transfer_by_key(&key).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Succeeded);
        assert_eq!(assert_balance_reconstructs(&harness.store, destination).await, 2_500);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The journal always explains the balance and never goes negative
    #[test]
    fn prop_workload_keeps_balances_reconstructable(
        opening in opening_balance_strategy(),
        ops in ledger_ops_strategy(25),
    ) {
        runtime().block_on(async {
            let harness = EngineHarness::new();
            let owner = fake_owner();
            let main = harness.open_funded_account(&owner, opening).await;
            let sibling = harness.open_funded_account(&owner, 0).await;

            let mut expected_main = opening;
            let mut expected_sibling = 0;
            for op in &ops {
                match *op {
                    LedgerOp::Pay(amount) => {
                        let request = PaymentRequestBuilder::new(owner.clone(), main).amount(amount).build();
                        let result = harness.engine.payments.execute_payment(request).await;
                        if amount <= expected_main {
                            assert!(result.is_ok());
                            expected_main -= amount;
                        } else {
                            assert_error_code(&result, "INSUFFICIENT_FUNDS");
                        }
                    }
                    LedgerOp::FundIn(amount) => {
                        let request = TransferRequestBuilder::new(owner.clone(), main).amount(amount).build();
                        harness.engine.transfers.execute_transfer(request).await.unwrap();
                        expected_main += amount;
                    }
                    LedgerOp::MoveOut(amount) => {
                        let request = TransferRequestBuilder::new(owner.clone(), sibling)
                            .from_account(main)
                            .amount(amount)
                            .build();
                        let result = harness.engine.transfers.execute_transfer(request).await;
                        if amount <= expected_main {
                            assert!(result.is_ok());
                            expected_main -= amount;
                            expected_sibling += amount;
                        } else {
                            assert_error_code(&result, "INSUFFICIENT_FUNDS");
                        }
                    }
                }
            }

            assert_eq!(assert_balance_reconstructs(&harness.store, main).await, expected_main);
            assert_eq!(assert_balance_reconstructs(&harness.store, sibling).await, expected_sibling);
        });
    }

    /// A rejected or silent remote never produces a credit
    #[test]
    fn prop_no_phantom_credit(amount in amount_minor_strategy(), hang in any::<bool>()) {
        runtime().block_on(async {
            let behavior = if hang {
                MockRemoteBehavior::Hang
            } else {
                MockRemoteBehavior::Reject("declined".into())
            };
            let harness = EngineHarness::new().with_remote(behavior);
            let owner = fake_owner();
            let destination = harness.open_funded_account(&owner, 0).await;
            let request = TransferRequestBuilder::new(owner, destination).amount(amount).build();
            let key = request.idempotency_key.clone();

            let result = harness.engine.transfers.execute_transfer(request).await;
            assert_error_code(&result, if hang { "REMOTE_TIMEOUT" } else { "REMOTE_FUNDING_FAILED" });

            let stored = harness.store.find_transfer_by_key(&key).await.unwrap().unwrap();
            assert_eq!(stored.status, OperationStatus::Failed);
            assert_eq!(assert_balance_reconstructs(&harness.store, destination).await, 0);
        });
    }

    /// Walking every page yields each operation exactly once
    #[test]
    fn prop_history_pages_are_complete(
        payments in 0usize..8,
        transfers in 0usize..8,
        page_size in page_size_strategy(),
    ) {
        runtime().block_on(async {
            let harness = EngineHarness::new();
            let owner = fake_owner();
            let account = harness.open_funded_account(&owner, 1_000_000).await;
            let other = harness.open_funded_account(&owner, 0).await;

            for _ in 0..payments {
                let request = PaymentRequestBuilder::new(owner.clone(), account).amount(10).build();
                harness.engine.payments.execute_payment(request).await.unwrap();
            }
            for _ in 0..transfers {
                let request = TransferRequestBuilder::new(owner.clone(), other)
                    .from_account(account)
                    .amount(10)
                    .build();
                harness.engine.transfers.execute_transfer(request).await.unwrap();
            }

            let mut seen = Vec::new();
            let mut cursor = None;
            loop {
                let page = harness
                    .engine
                    .history
                    .unified_history(account, &owner, Some(page_size), HistoryTypeFilter::All, cursor)
                    .await
                    .unwrap();
                assert!(page.items.len() <= page_size);
                seen.extend(page.items.iter().map(|item| item.entry_id));
                if !page.has_more {
                    break;
                }
                cursor = page.next_cursor;
            }

            let mut unique = seen.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), seen.len());
            assert_eq!(seen.len(), payments + transfers);
        });
    }
}
