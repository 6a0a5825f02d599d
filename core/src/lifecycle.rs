//! The ticket state machine.
//!
//! ```text
//!            check-in             ┌──────┐
//!   valid ──────────────────────▶ │ used │
//!     │  ╲                        └──────┘
//!     │   ╲ transfer   ┌─────────────┐  transfer (again)
//!     │    ╲─────────▶ │ transferred │ ◀──────┐
//!     │                └─────────────┘ ───────┘
//!     │ cancel            │ check-in ─▶ used
//!     ▼                   │ cancel   ─▶ cancelled
//!  cancelled              │ expire   ─▶ expired
//! ```
//!
//! `transferred` is the headline label after ownership moves. The ticket
//! itself stays scannable for its current holder; scan eligibility is the
//! separate predicate [`scan_eligibility`]. Transfers rotate the ticket code
//! so tokens issued to the previous holder stop resolving.
//!
//! Transitions are pure: [`Ticket::apply`] returns the next ticket without
//! touching storage. Stores persist the result under a version check.

use crate::event::EventSecurityConfig;
use crate::ids::ActorId;
use crate::ticket::{CheckInFacts, Holder, Ticket, TicketStatus, TicketStatusKind, TransferRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Alphabet for ticket codes: uppercase letters and digits without the
/// easily confused `0`, `O`, `1`, `I`.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a generated ticket code.
pub const TICKET_CODE_LEN: usize = 10;

/// Statuses a transition may leave.
pub const LIVE_STATUSES: &[TicketStatusKind] =
    &[TicketStatusKind::Valid, TicketStatusKind::Transferred];

/// A requested status change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TicketTransition {
    /// Mark the ticket used with the given facts.
    CheckIn(CheckInFacts),
    /// Refund or void the ticket.
    Cancel {
        /// Who cancelled it
        by: Option<ActorId>,
        /// Why
        reason: Option<String>,
    },
    /// Move ownership to a new holder.
    Transfer {
        /// New holder
        to: Holder,
        /// Free-text reason
        reason: Option<String>,
        /// When ownership moved
        at: DateTime<Utc>,
        /// Replacement ticket code; invalidates the previous holder's tokens
        new_ticket_code: String,
    },
    /// Housekeeping write recording a lapsed validity window.
    Expire,
}

impl TicketTransition {
    /// The status label this transition leads to.
    #[must_use]
    pub const fn target(&self) -> TicketStatusKind {
        match self {
            Self::CheckIn(_) => TicketStatusKind::Used,
            Self::Cancel { .. } => TicketStatusKind::Cancelled,
            Self::Transfer { .. } => TicketStatusKind::Transferred,
            Self::Expire => TicketStatusKind::Expired,
        }
    }

    /// Statuses this transition may start from. Every transition leaves
    /// `valid` or `transferred`; `used`, `cancelled` and `expired` are terminal.
    #[must_use]
    pub const fn allowed_from(&self) -> &'static [TicketStatusKind] {
        LIVE_STATUSES
    }

    /// Whether this transition is legal from `from`.
    #[must_use]
    pub fn is_allowed_from(&self, from: TicketStatusKind) -> bool {
        self.allowed_from().contains(&from)
    }
}

/// An attempted transition that the state machine forbids.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal ticket transition from {from} to {to}")]
pub struct TransitionError {
    /// Status the ticket was in
    pub from: TicketStatusKind,
    /// Status that was requested
    pub to: TicketStatusKind,
}

impl Ticket {
    /// Apply `transition`, returning the next state with its version bumped.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the current status does not permit the
    /// transition; the ticket is never silently corrected.
    pub fn apply(&self, transition: &TicketTransition) -> Result<Self, TransitionError> {
        let from = self.status.kind();
        if !transition.is_allowed_from(from) {
            return Err(TransitionError {
                from,
                to: transition.target(),
            });
        }

        let mut next = self.clone();
        next.version = self.version.next();
        match transition {
            TicketTransition::CheckIn(facts) => {
                next.status = TicketStatus::Used(facts.clone());
            }
            TicketTransition::Cancel { .. } => {
                next.status = TicketStatus::Cancelled;
            }
            TicketTransition::Transfer {
                to,
                reason,
                at,
                new_ticket_code,
            } => {
                next.transfers.push(TransferRecord {
                    from: self.holder.clone(),
                    to: to.clone(),
                    at: *at,
                    reason: reason.clone(),
                });
                next.holder = to.clone();
                next.ticket_code.clone_from(new_ticket_code);
                next.status = TicketStatus::Transferred;
            }
            TicketTransition::Expire => {
                next.status = TicketStatus::Expired;
            }
        }
        Ok(next)
    }
}

/// Why a ticket is not currently scan-eligible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ineligible {
    /// Already checked in
    Used(CheckInFacts),
    /// Cancelled
    Cancelled,
    /// Validity window has not started
    NotYetValid {
        /// Window start
        valid_from: DateTime<Utc>,
    },
    /// Validity window has ended (lazily or by an explicit expire write)
    Lapsed {
        /// Window end, when known
        valid_until: Option<DateTime<Utc>>,
    },
    /// Check-in is switched off for the event
    CheckInDisabled,
    /// Event check-in window has not opened
    WindowNotOpen {
        /// Window start
        opens_at: DateTime<Utc>,
    },
    /// Event check-in window has closed
    WindowClosed {
        /// Window end
        closes_at: DateTime<Utc>,
    },
}

/// The scan-eligibility predicate: status in {valid, transferred}, `now`
/// inside the ticket validity window, and the event check-in window open.
///
/// # Errors
///
/// Returns the first failing condition, status before ticket window before
/// event window.
pub fn scan_eligibility(
    ticket: &Ticket,
    event: &EventSecurityConfig,
    now: DateTime<Utc>,
) -> Result<(), Ineligible> {
    match &ticket.status {
        TicketStatus::Used(facts) => return Err(Ineligible::Used(facts.clone())),
        TicketStatus::Cancelled => return Err(Ineligible::Cancelled),
        TicketStatus::Expired => {
            return Err(Ineligible::Lapsed {
                valid_until: ticket.valid_until,
            });
        }
        TicketStatus::Valid | TicketStatus::Transferred => {}
    }

    if now < ticket.valid_from {
        return Err(Ineligible::NotYetValid {
            valid_from: ticket.valid_from,
        });
    }
    if ticket.effective_status(now) == TicketStatusKind::Expired {
        return Err(Ineligible::Lapsed {
            valid_until: ticket.valid_until,
        });
    }

    if !event.check_in_enabled {
        return Err(Ineligible::CheckInDisabled);
    }
    if let Some(opens_at) = event.opens_at {
        if now < opens_at {
            return Err(Ineligible::WindowNotOpen { opens_at });
        }
    }
    if let Some(closes_at) = event.closes_at {
        if now > closes_at {
            return Err(Ineligible::WindowClosed { closes_at });
        }
    }
    Ok(())
}

/// Generate a fresh random ticket code.
#[must_use]
pub fn generate_ticket_code() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..TICKET_CODE_LEN)
        .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
        .collect()
}
