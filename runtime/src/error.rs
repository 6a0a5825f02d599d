//! Faults raised by the check-in services.
//!
//! Expected rejections are never errors; they come back as
//! [`Verdict`](turnstile_core::Verdict) or
//! [`CheckInOutcome`](turnstile_core::CheckInOutcome) values. What remains here
//! aborts the request.

use thiserror::Error;
use turnstile_core::{
    EventId, ManifestError, SigningError, StoreError, TicketId, TicketStatusKind, TransitionError,
};

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;

/// Faults from validation, check-in, issuance and reconciliation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TurnstileError {
    /// Storage failed or returned undecodable data.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// The event's secret is missing or misconfigured.
    #[error("Signing secret error: {0}")]
    Signing(#[from] SigningError),

    /// Manifest could not be built or opened.
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// The state machine refused a requested administrative transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Referenced event does not exist (administrative paths only).
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// Referenced ticket does not exist (administrative paths only).
    #[error("Ticket not found: {0}")]
    TicketNotFound(TicketId),

    /// Optimistic writes kept losing to concurrent writers.
    #[error("Ticket {ticket_id} still contended after {attempts} write attempts")]
    Contention {
        /// Contended ticket
        ticket_id: TicketId,
        /// Attempts made
        attempts: u32,
    },

    /// Token issuance throttled for this ticket and requester.
    #[error("Token issuance rate limit exceeded for ticket {ticket_id}")]
    RateLimited {
        /// Throttled ticket
        ticket_id: TicketId,
    },

    /// Token requested for a ticket that cannot be scanned.
    #[error("Ticket {ticket_id} is {status} and cannot be issued a token")]
    NotIssuable {
        /// Ticket
        ticket_id: TicketId,
        /// Its current status
        status: TicketStatusKind,
    },

    /// Offline scanner has no manifest loaded.
    #[error("No manifest loaded")]
    ManifestNotLoaded,

    /// Internal invariant broken (lock poisoned, etc).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TurnstileError {
    /// Whether the same request may succeed if retried later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::Contention { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_storage_and_contention_are_transient() {
        assert!(TurnstileError::from(StoreError::Unavailable("down".into())).is_transient());
        assert!(
            TurnstileError::Contention {
                ticket_id: TicketId::new(),
                attempts: 5
            }
            .is_transient()
        );
        assert!(!TurnstileError::from(StoreError::Corrupt("bad row".into())).is_transient());
        assert!(!TurnstileError::from(SigningError::MissingSecret).is_transient());
    }
}
