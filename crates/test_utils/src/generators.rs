//! Property-Based Test Generators
//!
//! Provides proptest strategies for ledger inputs and `fake`-based owner
//! identities.

use fake::faker::internet::en::Username;
use fake::Fake;
use proptest::prelude::*;

use core_kernel::UserId;

/// Strategy for valid positive amounts in minor units
pub fn amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..100_000i64
}

/// Strategy for opening balances, zero included
pub fn opening_balance_strategy() -> impl Strategy<Value = i64> {
    0i64..200_000i64
}

/// Strategy for idempotency keys of any valid length
pub fn idempotency_key_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,128}"
}

/// One step against an account in a generated workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOp {
    /// Payment out of the account
    Pay(i64),
    /// Remote-funded transfer into the account
    FundIn(i64),
    /// Internal transfer from the account to a sibling account
    MoveOut(i64),
}

/// Strategy for a single ledger operation
pub fn ledger_op_strategy() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        3 => amount_minor_strategy().prop_map(LedgerOp::Pay),
        2 => amount_minor_strategy().prop_map(LedgerOp::FundIn),
        2 => amount_minor_strategy().prop_map(LedgerOp::MoveOut),
    ]
}

/// Strategy for a workload of up to `max_len` operations
pub fn ledger_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<LedgerOp>> {
    prop::collection::vec(ledger_op_strategy(), 1..=max_len)
}

/// Strategy for page sizes accepted by the history query
pub fn page_size_strategy() -> impl Strategy<Value = usize> {
    1usize..=10
}

/// A random but plausible caller identity
pub fn fake_owner() -> UserId {
    let name: String = Username().fake();
    UserId::new(format!("{}-{}", name, uuid::Uuid::new_v4().simple()))
}
