//! Application services
//!
//! Each service owns one use case and talks to storage only through the
//! ports in [`crate::ports`].

pub mod accounts;
pub mod history;
pub mod payments;
pub mod reconciliation;
pub mod transfers;

pub use accounts::AccountService;
pub use history::HistoryCursorQuery;
pub use payments::PaymentOrchestrator;
pub use reconciliation::{ReconciliationSweep, SweepReport};
pub use transfers::TransferOrchestrator;

use tracing::warn;

use crate::events::LedgerEvent;
use crate::ports::EventPublisher;

/// Publishes after commit; failures are logged and swallowed
pub(crate) async fn publish_best_effort(events: &dyn EventPublisher, event: LedgerEvent) {
    if let Err(e) = events.publish(&event).await {
        warn!(
            event_type = event.event_type(),
            event_id = %event.event_id(),
            error = %e,
            "Failed to publish ledger event"
        );
    }
}
