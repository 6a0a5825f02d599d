//! Shared harness for the runtime integration tests.

#![allow(dead_code)]
#![allow(clippy::expect_used)]

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use turnstile_core::token::{self, TokenClaims};
use turnstile_core::{ActorId, EventSecurityConfig, SigningSecret, Ticket};
use turnstile_runtime::{ScanEnvironment, ScanPolicy};
use turnstile_testing::{
    EventBuilder, InMemoryEventDirectory, InMemoryTicketStore, RecordingAuditSink, SteppingClock,
    TicketBuilder, at,
};

/// Thirty minutes before the fixture event starts.
pub fn doors_open() -> DateTime<Utc> {
    at("2025-06-01T19:30:00Z")
}

pub struct Harness {
    pub clock: SteppingClock,
    pub tickets: InMemoryTicketStore,
    pub events: InMemoryEventDirectory,
    pub audit: RecordingAuditSink,
    pub event: EventSecurityConfig,
    pub env: ScanEnvironment,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_event(EventBuilder::new().build())
    }

    pub fn with_event(event: EventSecurityConfig) -> Self {
        Self::with_event_and_policy(event, ScanPolicy::default())
    }

    pub fn with_event_and_policy(event: EventSecurityConfig, policy: ScanPolicy) -> Self {
        let clock = SteppingClock::new(doors_open());
        let tickets = InMemoryTicketStore::new();
        let events = InMemoryEventDirectory::new();
        let audit = RecordingAuditSink::new();
        events.insert(event.clone());

        let env = ScanEnvironment::new(
            Arc::new(tickets.clone()),
            Arc::new(events.clone()),
            Arc::new(audit.clone()),
            Arc::new(clock.clone()),
            policy,
        );
        Self {
            clock,
            tickets,
            events,
            audit,
            event,
            env,
        }
    }

    /// Store a default ticket after applying `customize`.
    pub fn add_ticket(&self, customize: impl FnOnce(TicketBuilder) -> TicketBuilder) -> Ticket {
        let ticket = customize(TicketBuilder::for_event(&self.event)).build();
        self.tickets.insert(ticket.clone());
        ticket
    }

    /// Token for `ticket` issued now under the event secret.
    pub fn token_for(&self, ticket: &Ticket) -> String {
        self.token_with(ticket, &self.event.secret)
    }

    /// Token for `ticket` issued now under an arbitrary secret.
    pub fn token_with(&self, ticket: &Ticket, secret: &SigningSecret) -> String {
        let claims = TokenClaims::for_ticket(ticket, self.now(), Duration::hours(6));
        token::encode(&claims, secret)
    }

    pub fn now(&self) -> DateTime<Utc> {
        use turnstile_core::Clock;
        self.clock.now()
    }

    pub fn stored(&self, ticket: &Ticket) -> Ticket {
        self.tickets.snapshot(ticket.id).expect("ticket stored")
    }
}

pub fn actor() -> ActorId {
    ActorId::new()
}
