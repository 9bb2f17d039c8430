//! Pre-built Test Fixtures
//!
//! Provides ready-to-use owners, amounts, keys and recipients. Values are
//! fixed so that failures are easy to read.

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;

use core_kernel::{Amount, UserId};
use domain_ledger::{EngineConfig, IdempotencyKey, RecipientDescriptor};

/// Engine settings for tests: short remote timeout, stale threshold above it
pub static TEST_ENGINE_CONFIG: Lazy<EngineConfig> = Lazy::new(|| EngineConfig {
    remote_timeout_ms: 200,
    stale_threshold_secs: 60,
    sweep_batch_size: 50,
    ..EngineConfig::default()
});

static KEY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Fixture for caller identities
pub struct OwnerFixtures;

impl OwnerFixtures {
    pub fn alice() -> UserId {
        UserId::new("alice")
    }

    pub fn bob() -> UserId {
        UserId::new("bob")
    }

    /// An identity that owns nothing
    pub fn stranger() -> UserId {
        UserId::new("mallory")
    }
}

/// Fixture for amounts in minor units
pub struct AmountFixtures;

impl AmountFixtures {
    /// Panics on non-positive input; fixtures are always valid
    pub fn of(minor_units: i64) -> Amount {
        Amount::new(minor_units).expect("fixture amounts are positive")
    }

    pub fn small() -> Amount {
        Self::of(3_000)
    }

    pub fn large() -> Amount {
        Self::of(50_000)
    }
}

/// Fixture for idempotency keys
pub struct KeyFixtures;

impl KeyFixtures {
    pub fn key(raw: &str) -> IdempotencyKey {
        IdempotencyKey::parse(raw).expect("fixture keys are valid")
    }

    /// A key no other test in the process has used
    pub fn unique(prefix: &str) -> IdempotencyKey {
        let n = KEY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self::key(&format!("{}-{}", prefix, n))
    }
}

/// Fixture for payment recipients
pub struct RecipientFixtures;

impl RecipientFixtures {
    pub fn cafe() -> RecipientDescriptor {
        RecipientDescriptor::named("Corner Cafe")
    }

    pub fn bank_transfer() -> RecipientDescriptor {
        RecipientDescriptor {
            name: "Landlord Ltd".to_string(),
            bank: Some("First Bank".to_string()),
            account_number: Some("12-3456-7890".to_string()),
        }
    }
}
