//! Ticket and event builders with sensible defaults.
//!
//! The default event starts at [`event_start`], runs four hours, has general
//! gates `north-1` and `south-1` and the VIP gate `vip-1`, and no check-in
//! window restriction.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use turnstile_core::lifecycle::generate_ticket_code;
use turnstile_core::{
    BookingId, EventId, EventSecurityConfig, GateId, Holder, Price, SigningSecret, Ticket,
    TicketId, TicketStatus, Version,
};

/// Parse an RFC 3339 timestamp.
#[must_use]
pub fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

/// Start of the default fixture event: 2025-06-01 20:00:00 UTC.
#[must_use]
pub fn event_start() -> DateTime<Utc> {
    at("2025-06-01T20:00:00Z")
}

/// A fixed 32-byte secret.
#[must_use]
pub fn test_secret() -> SigningSecret {
    SigningSecret::new(b"turnstile-test-secret-0123456789".to_vec()).unwrap()
}

/// A different fixed secret, for rotation and forgery tests.
#[must_use]
pub fn other_secret() -> SigningSecret {
    SigningSecret::new(b"another-secret-for-forged-tokens".to_vec()).unwrap()
}

/// Builder for [`EventSecurityConfig`].
#[derive(Debug, Clone)]
pub struct EventBuilder {
    config: EventSecurityConfig,
}

impl EventBuilder {
    /// Default fixture event with a fresh id.
    #[must_use]
    pub fn new() -> Self {
        let starts_at = event_start();
        Self {
            config: EventSecurityConfig {
                id: EventId::new(),
                name: "Harbour Lights Live".to_string(),
                secret: test_secret(),
                gates: BTreeSet::from([GateId::new("north-1"), GateId::new("south-1")]),
                vip_gates: BTreeSet::from([GateId::new("vip-1")]),
                check_in_enabled: true,
                opens_at: None,
                closes_at: None,
                starts_at,
                ends_at: Some(starts_at + Duration::hours(4)),
            },
        }
    }

    /// Set the event name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the signing secret.
    #[must_use]
    pub fn secret(mut self, secret: SigningSecret) -> Self {
        self.config.secret = secret;
        self
    }

    /// Toggle check-in.
    #[must_use]
    pub const fn check_in_enabled(mut self, enabled: bool) -> Self {
        self.config.check_in_enabled = enabled;
        self
    }

    /// Restrict the check-in window.
    #[must_use]
    pub const fn window(
        mut self,
        opens_at: Option<DateTime<Utc>>,
        closes_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.config.opens_at = opens_at;
        self.config.closes_at = closes_at;
        self
    }

    /// Set the event end.
    #[must_use]
    pub const fn ends_at(mut self, ends_at: Option<DateTime<Utc>>) -> Self {
        self.config.ends_at = ends_at;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> EventSecurityConfig {
        self.config
    }
}

impl Default for EventBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`Ticket`].
#[derive(Debug, Clone)]
pub struct TicketBuilder {
    ticket: Ticket,
}

impl TicketBuilder {
    /// A valid general-admission ticket for `event`, valid from a week
    /// before the event with no explicit end.
    #[must_use]
    pub fn for_event(event: &EventSecurityConfig) -> Self {
        Self {
            ticket: Ticket {
                id: TicketId::new(),
                booking_id: BookingId::new(),
                event_id: event.id,
                ticket_code: generate_ticket_code(),
                ticket_type: "General Admission".to_string(),
                price: Price::new(4500, "EUR"),
                seat: None,
                holder: Holder::new("Ada Lovelace", "ada@example.com"),
                transfers: Vec::new(),
                status: TicketStatus::Valid,
                valid_from: event.starts_at - Duration::days(7),
                valid_until: None,
                version: Version::INITIAL,
            },
        }
    }

    /// Set the ticket type.
    #[must_use]
    pub fn ticket_type(mut self, ticket_type: impl Into<String>) -> Self {
        self.ticket.ticket_type = ticket_type.into();
        self
    }

    /// Set the holder.
    #[must_use]
    pub fn holder(mut self, name: &str, email: &str) -> Self {
        self.ticket.holder = Holder::new(name, email);
        self
    }

    /// Set the headline status.
    #[must_use]
    pub fn status(mut self, status: TicketStatus) -> Self {
        self.ticket.status = status;
        self
    }

    /// Set the validity window.
    #[must_use]
    pub const fn valid_between(
        mut self,
        valid_from: DateTime<Utc>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        self.ticket.valid_from = valid_from;
        self.ticket.valid_until = valid_until;
        self
    }

    /// Build the ticket.
    #[must_use]
    pub fn build(self) -> Ticket {
        self.ticket
    }
}
