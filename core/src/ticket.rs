//! The ticket record: one admission right.
//!
//! A [`Ticket`] is the system of record for admission. Tokens are derived from
//! it on demand and never stored; its [`TicketStatus`] is authoritative.
//!
//! # Invariant
//!
//! Check-in facts (used-at, used-by, entry gate, entry device) exist if and
//! only if the ticket is used. The invariant is carried by the type:
//! [`CheckInFacts`] only lives inside [`TicketStatus::Used`].

use crate::ids::{AccountId, ActorId, BookingId, DeviceId, EventId, GateId, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Optimistic concurrency version of a ticket row.
///
/// Every committed transition increments the version by one. Writers present
/// the version they read; a mismatch means someone else committed first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The version of a freshly issued ticket.
    pub const INITIAL: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ticket price in minor currency units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in minor units (cents)
    pub amount_minor: i64,
    /// ISO 4217 currency code
    pub currency: String,
}

impl Price {
    /// Create a price.
    #[must_use]
    pub fn new(amount_minor: i64, currency: impl Into<String>) -> Self {
        Self {
            amount_minor,
            currency: currency.into(),
        }
    }
}

/// Optional reserved seat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Section name, e.g. "Balcony"
    pub section: String,
    /// Seat number within the section (general admission sections have none)
    pub number: Option<String>,
}

/// The person a ticket is issued to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    /// Full name printed on the ticket
    pub name: String,
    /// Contact email
    pub email: String,
    /// Contact phone
    pub phone: Option<String>,
    /// Account currently owning the ticket, if the holder has one
    pub account: Option<AccountId>,
}

impl Holder {
    /// Create a holder with name and email only.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
            account: None,
        }
    }
}

/// One hop in a ticket's ownership lineage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Holder before the transfer
    pub from: Holder,
    /// Holder after the transfer
    pub to: Holder,
    /// When ownership moved
    pub at: DateTime<Utc>,
    /// Free-text reason given by the initiator
    pub reason: Option<String>,
}

/// Facts recorded when a ticket is checked in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInFacts {
    /// When the scan happened (original scan time for offline captures)
    pub used_at: DateTime<Utc>,
    /// Staff account that scanned the ticket
    pub used_by: ActorId,
    /// Gate the holder entered through
    pub gate: Option<GateId>,
    /// Device that captured the scan
    pub device: Option<DeviceId>,
}

/// Headline status of a ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TicketStatus {
    /// Issued and not yet used
    Valid,
    /// Checked in; terminal for scanning
    Used(CheckInFacts),
    /// Refunded or voided; terminal for scanning
    Cancelled,
    /// Ownership moved at least once; still scannable by the current holder
    Transferred,
    /// Explicitly expired by housekeeping
    Expired,
}

impl TicketStatus {
    /// The label of this status without attached facts.
    #[must_use]
    pub const fn kind(&self) -> TicketStatusKind {
        match self {
            Self::Valid => TicketStatusKind::Valid,
            Self::Used(_) => TicketStatusKind::Used,
            Self::Cancelled => TicketStatusKind::Cancelled,
            Self::Transferred => TicketStatusKind::Transferred,
            Self::Expired => TicketStatusKind::Expired,
        }
    }
}

/// Status label, used for storage columns, manifests and log fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatusKind {
    /// See [`TicketStatus::Valid`]
    Valid,
    /// See [`TicketStatus::Used`]
    Used,
    /// See [`TicketStatus::Cancelled`]
    Cancelled,
    /// See [`TicketStatus::Transferred`]
    Transferred,
    /// See [`TicketStatus::Expired`]
    Expired,
}

impl TicketStatusKind {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Used => "used",
            Self::Cancelled => "cancelled",
            Self::Transferred => "transferred",
            Self::Expired => "expired",
        }
    }

    /// Parse status from its database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(Self::Valid),
            "used" => Some(Self::Used),
            "cancelled" => Some(Self::Cancelled),
            "transferred" => Some(Self::Transferred),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Statuses whose holder may still be admitted.
    #[must_use]
    pub const fn is_scannable(self) -> bool {
        matches!(self, Self::Valid | Self::Transferred)
    }
}

impl fmt::Display for TicketStatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One admission right.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Globally unique ticket id
    pub id: TicketId,
    /// Booking that purchased the ticket
    pub booking_id: BookingId,
    /// Event the ticket admits to
    pub event_id: EventId,
    /// Short code bound into every token; rotated on transfer
    pub ticket_code: String,
    /// Ticket type name, e.g. "General Admission" or "VIP"
    pub ticket_type: String,
    /// Price paid
    pub price: Price,
    /// Reserved seat, if any
    pub seat: Option<Seat>,
    /// Current holder
    pub holder: Holder,
    /// Ownership lineage, oldest first
    pub transfers: Vec<TransferRecord>,
    /// Headline status
    pub status: TicketStatus,
    /// Start of the validity window
    pub valid_from: DateTime<Utc>,
    /// End of the validity window; `None` means until the event ends
    pub valid_until: Option<DateTime<Utc>>,
    /// Optimistic concurrency version
    pub version: Version,
}

impl Ticket {
    /// Check-in facts, present only when the ticket is used.
    #[must_use]
    pub const fn check_in_facts(&self) -> Option<&CheckInFacts> {
        match &self.status {
            TicketStatus::Used(facts) => Some(facts),
            _ => None,
        }
    }

    /// Status as observed at `now`, applying time-based expiry lazily.
    ///
    /// A valid or transferred ticket whose validity window has closed reads as
    /// expired without any write.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> TicketStatusKind {
        let kind = self.status.kind();
        match self.valid_until {
            Some(until) if kind.is_scannable() && now > until => TicketStatusKind::Expired,
            _ => kind,
        }
    }
}
