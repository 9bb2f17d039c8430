//! Domain events for completed money movements
//!
//! Events are emitted after the unit of work that made an operation terminal
//! has committed. Publication is best-effort: a failed publish is logged and
//! never changes the outcome returned to the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use core_kernel::{
    AccountId, DomainPort, EventId, HealthCheckResult, HealthCheckable, PaymentId, PortError,
    TransferId,
};

use crate::operation::{FailureCode, OperationStatus};
use crate::payment::Payment;
use crate::ports::EventPublisher;
use crate::transfer::Transfer;

/// Events emitted by the orchestrators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A transfer reached SUCCEEDED or FAILED
    TransferCompleted {
        event_id: EventId,
        transfer_id: TransferId,
        destination_account_id: AccountId,
        source_account_id: Option<AccountId>,
        amount: i64,
        status: OperationStatus,
        failure_code: Option<FailureCode>,
        timestamp: DateTime<Utc>,
    },

    /// A payment reached SUCCEEDED or FAILED
    PaymentCompleted {
        event_id: EventId,
        payment_id: PaymentId,
        payer_account_id: AccountId,
        amount: i64,
        status: OperationStatus,
        failure_code: Option<FailureCode>,
        timestamp: DateTime<Utc>,
    },
}

impl LedgerEvent {
    pub fn transfer_completed(transfer: &Transfer) -> Self {
        LedgerEvent::TransferCompleted {
            event_id: EventId::new_v7(),
            transfer_id: transfer.id,
            destination_account_id: transfer.destination_account_id,
            source_account_id: transfer.funding.source_account(),
            amount: transfer.amount.minor_units(),
            status: transfer.status,
            failure_code: transfer.failure_code,
            timestamp: transfer.completed_at.unwrap_or_else(Utc::now),
        }
    }

    pub fn payment_completed(payment: &Payment) -> Self {
        LedgerEvent::PaymentCompleted {
            event_id: EventId::new_v7(),
            payment_id: payment.id,
            payer_account_id: payment.payer_account_id,
            amount: payment.amount.minor_units(),
            status: payment.status,
            failure_code: payment.failure_code,
            timestamp: payment.completed_at.unwrap_or_else(Utc::now),
        }
    }

    /// Returns the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::TransferCompleted { .. } => "TransferCompleted",
            LedgerEvent::PaymentCompleted { .. } => "PaymentCompleted",
        }
    }

    pub fn event_id(&self) -> EventId {
        match self {
            LedgerEvent::TransferCompleted { event_id, .. }
            | LedgerEvent::PaymentCompleted { event_id, .. } => *event_id,
        }
    }
}

/// Publisher that writes events to the structured log
///
/// Used when no message bus is wired in; downstream tooling can tail the
/// `ledger_events` target.
#[derive(Debug, Clone, Default)]
pub struct TracingEventPublisher;

impl DomainPort for TracingEventPublisher {}

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, event: &LedgerEvent) -> Result<(), PortError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| PortError::transformation(e.to_string()))?;
        info!(
            target: "ledger_events",
            event_type = event.event_type(),
            event_id = %event.event_id(),
            payload = %payload,
            "Ledger event"
        );
        Ok(())
    }
}

#[async_trait]
impl HealthCheckable for TracingEventPublisher {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("tracing_events", 0)
    }
}
