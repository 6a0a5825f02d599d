//! Audit events for terminal scan outcomes.
//!
//! Every success, duplicate, conflict and bad-signature outcome is emitted
//! once to an [`AuditSink`]. The activity log and statistics widgets of the
//! surrounding platform consume the stream.

use crate::ids::{ActorId, DeviceId, EventId, GateId, TicketId};
use crate::store::StoreFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of terminal outcome being audited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// First successful check-in
    CheckedIn,
    /// Same-actor repeat absorbed as success
    Duplicate,
    /// Already used by a different actor
    Conflict,
    /// Signature failed verification
    BadSignature,
}

impl OutcomeKind {
    /// Stable label for storage and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CheckedIn => "checked_in",
            Self::Duplicate => "duplicate",
            Self::Conflict => "conflict",
            Self::BadSignature => "bad_signature",
        }
    }

    /// Parse from the stored label.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "checked_in" => Some(Self::CheckedIn),
            "duplicate" => Some(Self::Duplicate),
            "conflict" => Some(Self::Conflict),
            "bad_signature" => Some(Self::BadSignature),
            _ => None,
        }
    }

    /// Whether operators should be alerted.
    #[must_use]
    pub const fn is_fraud_signal(&self) -> bool {
        matches!(self, Self::Conflict | Self::BadSignature)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audited outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Ticket involved
    pub ticket_id: TicketId,
    /// Event of the ticket
    pub event_id: EventId,
    /// Scanning actor; absent for token-only validation
    pub actor_id: Option<ActorId>,
    /// What happened
    pub outcome_kind: OutcomeKind,
    /// Gate of the scan
    pub gate_id: Option<GateId>,
    /// Device of the scan
    pub device_id: Option<DeviceId>,
    /// When it happened (scan time for replays)
    pub timestamp: DateTime<Utc>,
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Record one event.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the event could not be persisted. Callers
    /// log the failure; the audited outcome itself stands.
    fn record(&self, event: AuditEvent) -> StoreFuture<'_, ()>;
}
