//! Closed result types for validation and check-in.
//!
//! Expected rejections are values, not errors: callers must match every
//! [`RejectionReason`]. Faults (storage down, misconfigured secret) travel
//! separately as errors.

use crate::event::EventSecurityConfig;
use crate::ids::{EventId, GateId, TicketId};
use crate::lifecycle::Ineligible;
use crate::ticket::{CheckInFacts, Seat, Ticket, TicketStatusKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Generic message shown to end users for any invalid-ticket rejection.
pub const INVALID_TICKET_MESSAGE: &str = "Invalid ticket";

/// Ticket validity window violations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum TicketWindowViolation {
    /// Window has not started
    NotYetValid {
        /// Window start
        valid_from: DateTime<Utc>,
    },
    /// Window has ended
    Lapsed {
        /// Window end, if one was set
        valid_until: Option<DateTime<Utc>>,
    },
}

/// Event check-in window and timing violations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum EventWindowViolation {
    /// Check-in switched off for the event
    CheckInDisabled,
    /// Check-in window not yet open
    NotYetOpen {
        /// Window start
        opens_at: DateTime<Utc>,
    },
    /// Check-in window closed
    Closed {
        /// Window end
        closes_at: DateTime<Utc>,
    },
    /// Scanned earlier than the admission lead time before event start
    TooEarly {
        /// Earliest admission time
        admits_from: DateTime<Utc>,
    },
    /// Event is over
    EventEnded {
        /// Event end
        ended_at: DateTime<Utc>,
    },
}

/// Why a token or check-in was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Token could not be decoded
    Malformed,
    /// Ticket or event does not exist, or the token's ticket code is stale
    NotFound,
    /// Signature did not verify: a fraud signal
    BadSignature,
    /// Token itself expired
    Expired {
        /// Token expiry
        expired_at: DateTime<Utc>,
    },
    /// Ticket validity window
    TicketWindow(TicketWindowViolation),
    /// Event check-in window or timing
    EventWindow(EventWindowViolation),
    /// Already checked in; carries who, when and where
    AlreadyUsed(CheckInFacts),
    /// Ticket was cancelled
    Cancelled,
    /// Gate unknown to the event, or VIP-only for a non-VIP ticket
    GateNotAuthorized {
        /// Gate presented
        gate: GateId,
    },
}

impl RejectionReason {
    /// Stable snake-case label, used for metrics, logs and audit rows.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::NotFound => "not_found",
            Self::BadSignature => "bad_signature",
            Self::Expired { .. } => "expired",
            Self::TicketWindow(_) => "ticket_window",
            Self::EventWindow(_) => "event_window",
            Self::AlreadyUsed(_) => "already_used",
            Self::Cancelled => "cancelled",
            Self::GateNotAuthorized { .. } => "gate_not_authorized",
        }
    }

    /// Whether this rejection is a fraud signal on its own.
    ///
    /// `AlreadyUsed` is only a fraud signal when a different actor made the
    /// original scan, which the coordinator decides.
    #[must_use]
    pub const fn is_fraud_signal(&self) -> bool {
        matches!(self, Self::BadSignature)
    }

    /// Short, non-diagnostic text for end users.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::Malformed | Self::NotFound | Self::BadSignature => INVALID_TICKET_MESSAGE,
            Self::Expired { .. } => "Ticket code expired, please refresh",
            Self::TicketWindow(_) | Self::EventWindow(_) => "Ticket not valid at this time",
            Self::AlreadyUsed(_) => "Ticket already used",
            Self::Cancelled => "Ticket cancelled",
            Self::GateNotAuthorized { .. } => "Not valid at this gate",
        }
    }
}

impl From<Ineligible> for RejectionReason {
    fn from(value: Ineligible) -> Self {
        match value {
            Ineligible::Used(facts) => Self::AlreadyUsed(facts),
            Ineligible::Cancelled => Self::Cancelled,
            Ineligible::NotYetValid { valid_from } => {
                Self::TicketWindow(TicketWindowViolation::NotYetValid { valid_from })
            }
            Ineligible::Lapsed { valid_until } => {
                Self::TicketWindow(TicketWindowViolation::Lapsed { valid_until })
            }
            Ineligible::CheckInDisabled => Self::EventWindow(EventWindowViolation::CheckInDisabled),
            Ineligible::WindowNotOpen { opens_at } => {
                Self::EventWindow(EventWindowViolation::NotYetOpen { opens_at })
            }
            Ineligible::WindowClosed { closes_at } => {
                Self::EventWindow(EventWindowViolation::Closed { closes_at })
            }
        }
    }
}

/// What a scanner UI may display about an admitted ticket. Never carries the
/// secret, the raw token or the holder's contact details.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSummary {
    /// Ticket id
    pub ticket_id: TicketId,
    /// Event id
    pub event_id: EventId,
    /// Event display name
    pub event_name: String,
    /// Holder name
    pub holder_name: String,
    /// Ticket type
    pub ticket_type: String,
    /// Seat, if reserved
    pub seat: Option<Seat>,
    /// Headline status at the time of the summary
    pub status: TicketStatusKind,
}

impl TicketSummary {
    /// Project a ticket and its event into a summary.
    #[must_use]
    pub fn new(ticket: &Ticket, event: &EventSecurityConfig) -> Self {
        Self {
            ticket_id: ticket.id,
            event_id: ticket.event_id,
            event_name: event.name.clone(),
            holder_name: ticket.holder.name.clone(),
            ticket_type: ticket.ticket_type.clone(),
            seat: ticket.seat.clone(),
            status: ticket.status.kind(),
        }
    }
}

/// Result of validating a token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Token is genuine and the ticket may be admitted now
    Admitted(TicketSummary),
    /// Token or ticket rejected
    Rejected(RejectionReason),
}

impl Verdict {
    /// Label for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Admitted(_) => "admitted",
            Self::Rejected(reason) => reason.kind(),
        }
    }

    /// Whether the ticket may be admitted.
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }
}

/// Result of a check-in attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckInOutcome {
    /// The ticket is checked in by this actor.
    CheckedIn {
        /// Display summary
        summary: TicketSummary,
        /// Committed check-in facts (the original ones for a duplicate)
        facts: CheckInFacts,
        /// True when this call repeated an already committed scan by the
        /// same actor within the duplicate window
        duplicate: bool,
    },
    /// The check-in was refused.
    Rejected(RejectionReason),
}

impl CheckInOutcome {
    /// Label for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CheckedIn {
                duplicate: false, ..
            } => "checked_in",
            Self::CheckedIn {
                duplicate: true, ..
            } => "duplicate",
            Self::Rejected(reason) => reason.kind(),
        }
    }

    /// Whether the holder may enter.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::CheckedIn { .. })
    }

    /// Whether this outcome is a repeated scan absorbed as success.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::CheckedIn { duplicate: true, .. })
    }
}
