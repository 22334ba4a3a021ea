//! Webhook event types for notifying external collaborators.
//!
//! Delivery is at-least-once: consumers must deduplicate on `event_id`.
//! The dashboard, reporting, and onboarding flows consume this feed —
//! they never write ledger state directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EventId, SettlementId};

/// The kind of state transition an event announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A settlement's ledger movement completed.
    SettlementCompleted,
    /// The bridged payout reached the destination rail.
    PayoutCompleted,
    /// The bridged payout permanently failed. The settlement stands.
    PayoutFailed,
}

impl EventType {
    /// Dotted wire name carried in the webhook payload.
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::SettlementCompleted => "settlement.completed",
            Self::PayoutCompleted => "payout.completed",
            Self::PayoutFailed => "payout.failed",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// A webhook event: `{ event_id, event_type, settlement_id, timestamp, data }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Unique id. At-least-once delivery permits duplicates; consumers
    /// deduplicate on this.
    pub event_id: EventId,
    /// What happened.
    pub event_type: EventType,
    /// The settlement this event concerns.
    pub settlement_id: SettlementId,
    /// When the transition occurred.
    pub timestamp: DateTime<Utc>,
    /// Event-specific payload snapshot.
    pub data: serde_json::Value,
}

impl WebhookEvent {
    /// Build an event stamped at `now`.
    #[must_use]
    pub fn new(
        event_type: EventType,
        settlement_id: SettlementId,
        data: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            event_type,
            settlement_id,
            timestamp: now,
            data,
        }
    }

    /// The JSON body delivered to the target URL.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "event_id": self.event_id,
            "event_type": self.event_type.wire_name(),
            "settlement_id": self.settlement_id,
            "timestamp": self.timestamp,
            "data": self.data,
        })
    }
}

/// Terminal outcome of a delivery attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryOutcome {
    /// Still retrying.
    Pending,
    /// The endpoint acknowledged the event.
    Delivered,
    /// Retries exhausted; parked in the dead-letter queue.
    DeadLettered,
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Delivered => write!(f, "DELIVERED"),
            Self::DeadLettered => write!(f, "DEAD_LETTERED"),
        }
    }
}

/// Tracks the delivery of one event to one target URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDeliveryAttempt {
    /// The event being delivered.
    pub event: WebhookEvent,
    /// Where it is being delivered.
    pub target_url: String,
    /// Attempts made so far.
    pub attempts: u32,
    /// Earliest instant of the next attempt, per the backoff schedule.
    pub next_attempt_at: DateTime<Utc>,
    /// Current outcome.
    pub outcome: DeliveryOutcome,
    /// The most recent transport error, if any.
    pub last_error: Option<String>,
}
