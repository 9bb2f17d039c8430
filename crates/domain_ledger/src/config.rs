//! Engine tuning

use serde::{Deserialize, Serialize};
use std::time::Duration;

use core_kernel::CoreError;

/// Longest accepted stale threshold (30 days)
pub const MAX_STALE_THRESHOLD_SECS: u64 = 30 * 24 * 60 * 60;

/// Configuration for the orchestrators and the reconciliation sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on one remote funding call
    pub remote_timeout_ms: u64,
    /// Age after which a PENDING operation is handed to reconciliation
    pub stale_threshold_secs: u64,
    /// Rows examined per sweep and kind
    pub sweep_batch_size: usize,
    pub sweep_interval_secs: u64,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Accounts suggested when a payment fails for insufficient funds
    pub alternative_account_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            remote_timeout_ms: 5_000,
            stale_threshold_secs: 300,
            sweep_batch_size: 100,
            sweep_interval_secs: 60,
            default_page_size: 20,
            max_page_size: 100,
            alternative_account_limit: 5,
        }
    }
}

impl EngineConfig {
    /// Rejects settings under which reconciliation could race a live request
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.remote_timeout_ms == 0 {
            return Err(CoreError::configuration("remote_timeout_ms must be positive"));
        }
        if self.stale_threshold_secs.saturating_mul(1_000) <= self.remote_timeout_ms {
            return Err(CoreError::configuration(
                "stale_threshold_secs must exceed the remote timeout",
            ));
        }
        if self.stale_threshold_secs > MAX_STALE_THRESHOLD_SECS {
            return Err(CoreError::configuration(format!(
                "stale_threshold_secs must not exceed {}",
                MAX_STALE_THRESHOLD_SECS
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(CoreError::configuration("sweep_interval_secs must be positive"));
        }
        if self.sweep_batch_size == 0 {
            return Err(CoreError::configuration("sweep_batch_size must be positive"));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(CoreError::configuration(
                "default_page_size must be between 1 and max_page_size",
            ));
        }
        Ok(())
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn stale_threshold(&self) -> chrono::Duration {
        let secs = self.stale_threshold_secs.min(MAX_STALE_THRESHOLD_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Applies the default and the ceiling to a requested page size
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}
