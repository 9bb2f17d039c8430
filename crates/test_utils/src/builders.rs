//! Test Data Builders
//!
//! [`EngineHarness`] wires a [`LedgerEngine`] to the in-memory adapters and
//! keeps handles on them so tests can script failures and inspect effects.
//! The request builders fill every field with a valid default.

use std::sync::Arc;

use core_kernel::{AccountId, UserId};
use domain_ledger::memory::{InMemoryLedgerStore, MockRemoteBehavior, MockRemoteFunding, RecordingEventPublisher};
use domain_ledger::{
    AccountKind, EngineConfig, FundingSource, IdempotencyKey, LedgerEngine, LedgerStore, PaymentRequest,
    RecipientDescriptor, TransferRequest,
};

use crate::fixtures::{AmountFixtures, KeyFixtures, RecipientFixtures, TEST_ENGINE_CONFIG};

/// Ledger engine on in-memory adapters
#[derive(Clone)]
pub struct EngineHarness {
    pub engine: Arc<LedgerEngine>,
    pub store: InMemoryLedgerStore,
    pub remote: Arc<MockRemoteFunding>,
    pub events: Arc<RecordingEventPublisher>,
}

impl Default for EngineHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineHarness {
    pub fn new() -> Self {
        Self::with_config(TEST_ENGINE_CONFIG.clone())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = InMemoryLedgerStore::new();
        let remote = Arc::new(MockRemoteFunding::approving());
        let events = Arc::new(RecordingEventPublisher::new());
        let engine = LedgerEngine::new(Arc::new(store.clone()), remote.clone(), events.clone(), config)
            .expect("test engine config is valid");

        Self {
            engine: Arc::new(engine),
            store,
            remote,
            events,
        }
    }

    /// Scripts the remote funding double
    pub fn with_remote(self, behavior: MockRemoteBehavior) -> Self {
        self.remote.set_behavior(behavior);
        self
    }

    /// Opens a personal account for `owner` and charges it with `balance`
    pub async fn open_funded_account(&self, owner: &UserId, balance: i64) -> AccountId {
        self.open_account_of_kind(owner, AccountKind::Personal, balance).await
    }

    pub async fn open_account_of_kind(&self, owner: &UserId, kind: AccountKind, balance: i64) -> AccountId {
        let account = self
            .engine
            .accounts
            .open_account(owner.clone(), kind)
            .await
            .expect("open account");
        if balance > 0 {
            self.engine
                .accounts
                .charge(account.id, AmountFixtures::of(balance))
                .await
                .expect("charge account");
        }
        account.id
    }

    /// Latest `balance_after`, bypassing ownership checks
    pub async fn balance(&self, account_id: AccountId) -> i64 {
        self.store
            .current_balance(account_id)
            .await
            .expect("read balance")
    }
}

/// Builder for payment requests
pub struct PaymentRequestBuilder {
    request: PaymentRequest,
}

impl PaymentRequestBuilder {
    pub fn new(caller_id: UserId, payer_account_id: AccountId) -> Self {
        Self {
            request: PaymentRequest {
                caller_id,
                payer_account_id,
                amount: AmountFixtures::small(),
                recipient: RecipientFixtures::cafe(),
                idempotency_key: KeyFixtures::unique("pay"),
                session_ref: None,
            },
        }
    }

    pub fn amount(mut self, minor_units: i64) -> Self {
        self.request.amount = AmountFixtures::of(minor_units);
        self
    }

    pub fn key(mut self, key: IdempotencyKey) -> Self {
        self.request.idempotency_key = key;
        self
    }

    pub fn recipient(mut self, recipient: RecipientDescriptor) -> Self {
        self.request.recipient = recipient;
        self
    }

    pub fn session_ref(mut self, session_ref: impl Into<String>) -> Self {
        self.request.session_ref = Some(session_ref.into());
        self
    }

    pub fn build(self) -> PaymentRequest {
        self.request
    }
}

/// Builder for transfer requests; remote-funded by the caller unless told otherwise
pub struct TransferRequestBuilder {
    request: TransferRequest,
}

impl TransferRequestBuilder {
    pub fn new(caller_id: UserId, destination_account_id: AccountId) -> Self {
        Self {
            request: TransferRequest {
                funding: FundingSource::Remote {
                    remote_owner_id: caller_id.clone(),
                },
                caller_id,
                destination_account_id,
                amount: AmountFixtures::small(),
                idempotency_key: KeyFixtures::unique("xfer"),
            },
        }
    }

    pub fn amount(mut self, minor_units: i64) -> Self {
        self.request.amount = AmountFixtures::of(minor_units);
        self
    }

    pub fn key(mut self, key: IdempotencyKey) -> Self {
        self.request.idempotency_key = key;
        self
    }

    pub fn from_account(mut self, source_account_id: AccountId) -> Self {
        self.request.funding = FundingSource::Internal { source_account_id };
        self
    }

    pub fn build(self) -> TransferRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::OwnerFixtures;

    #[tokio::test]
    async fn test_harness_funds_accounts() {
        let harness = EngineHarness::new();
        let account = harness.open_funded_account(&OwnerFixtures::alice(), 1_234).await;
        assert_eq!(harness.balance(account).await, 1_234);
    }

    #[test]
    fn test_transfer_builder_defaults_to_remote() {
        let destination = AccountId::new();
        let request = TransferRequestBuilder::new(OwnerFixtures::bob(), destination).build();
        assert_eq!(request.funding.source_account(), None);
        assert!(request.validate().is_ok());
    }
}
