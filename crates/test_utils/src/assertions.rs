//! Custom Test Assertions
//!
//! The balance assertions treat the journal as the oracle: an account's
//! balance must equal the sum of its entries, every `balance_after` must
//! follow from the previous one, and no prefix may go negative.

use core_kernel::AccountId;
use domain_ledger::{Ledger, LedgerError, LedgerStore, OperationStatus};

/// Asserts the cached balance equals the reconstructed one and returns it
///
/// # Panics
///
/// Panics if the chain is broken or the balances disagree
pub async fn assert_balance_reconstructs<S: LedgerStore + ?Sized>(store: &S, account_id: AccountId) -> i64 {
    let entries = store.entries(account_id).await.expect("read entries");
    let cached = store.current_balance(account_id).await.expect("read balance");

    let chained = Ledger::verify_chain(&entries)
        .unwrap_or_else(|e| panic!("Journal of {} is inconsistent: {}", account_id, e));
    let (summed, count) = store.entry_sum(account_id).await.expect("sum entries");

    assert_eq!(
        cached, chained,
        "Cached balance {} of {} differs from the chained balance {}",
        cached, account_id, chained
    );
    assert_eq!(summed, chained, "Entry sum {} differs from the chain {}", summed, chained);
    assert_eq!(count as usize, entries.len());
    cached
}

/// Asserts a result is the given error code
///
/// # Panics
///
/// Panics on success or on another code
pub fn assert_error_code<T: std::fmt::Debug>(result: &Result<T, LedgerError>, code: &str) {
    match result {
        Err(e) => assert_eq!(e.code(), code, "Expected {} but got {}", code, e),
        Ok(value) => panic!("Expected {} but the call succeeded with {:?}", code, value),
    }
}

/// Asserts a stored operation reached a terminal status
pub fn assert_terminal(status: OperationStatus) {
    assert!(status.is_terminal(), "Operation is still {}", status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::EngineHarness;
    use crate::fixtures::OwnerFixtures;

    #[tokio::test]
    async fn test_fresh_account_reconstructs_to_zero() {
        let harness = EngineHarness::new();
        let account = harness.open_funded_account(&OwnerFixtures::alice(), 0).await;
        assert_eq!(assert_balance_reconstructs(&harness.store, account).await, 0);
    }

    #[test]
    fn test_error_code_assertion() {
        let result: Result<(), LedgerError> = Err(LedgerError::validation("bad"));
        assert_error_code(&result, "VALIDATION_ERROR");
    }

    #[test]
    #[should_panic(expected = "still PENDING")]
    fn test_pending_is_not_terminal() {
        assert_terminal(OperationStatus::Pending);
    }
}
