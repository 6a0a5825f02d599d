//! Storage seams.
//!
//! The check-in core reads tickets and events and writes ticket transitions
//! through these traits. The only mutual-exclusion mechanism is the
//! compare-and-set in [`TicketStore::persist_transition`]; no external lock
//! manager is involved.
//!
//! # Implementations
//!
//! - `PostgresTicketStore` and friends (in `turnstile-postgres`): production
//! - `InMemoryTicketStore` and friends (in `turnstile-testing`): fast,
//!   deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures instead of using `async fn` so the services
//! can hold `Arc<dyn TicketStore>` and friends.

use crate::event::EventSecurityConfig;
use crate::ids::{BatchId, EventId, PendingCheckInId, TicketId};
use crate::lifecycle::{TicketTransition, TransitionError};
use crate::pending::PendingCheckIn;
use crate::signer::SigningSecret;
use crate::ticket::{Ticket, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by every storage method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors from storage operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency conflict: the row moved past the expected version.
    ///
    /// Internal signal for the coordinator's duplicate-versus-conflict
    /// disambiguation; never surfaced raw to a scanning client.
    #[error("Version conflict on ticket {ticket_id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Ticket being written
        ticket_id: TicketId,
        /// Version the writer read
        expected: Version,
        /// Version currently stored
        actual: Version,
    },

    /// Ticket not found.
    #[error("Ticket not found: {0}")]
    TicketNotFound(TicketId),

    /// Event not found.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// Pending check-in record not found.
    #[error("Pending check-in not found: {0}")]
    PendingNotFound(PendingCheckInId),

    /// The stored status does not permit the requested transition.
    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),

    /// Database connection or query failed.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether retrying the same operation later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Ticket records and the conditional-write transition contract.
pub trait TicketStore: Send + Sync {
    /// Load a ticket. `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: backend failure
    /// - `Corrupt`: the stored row cannot be decoded
    fn get_ticket(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>>;

    /// Apply `transition` to the ticket if and only if its stored version is
    /// still `expected`, as a single atomic compare-and-set.
    ///
    /// Returns the committed ticket (version `expected + 1`).
    ///
    /// # Errors
    ///
    /// - `VersionConflict`: another writer committed first
    /// - `IllegalTransition`: the stored status forbids the transition
    /// - `TicketNotFound`: no such ticket
    /// - `Unavailable`: backend failure
    fn persist_transition(
        &self,
        id: TicketId,
        expected: Version,
        transition: TicketTransition,
    ) -> StoreFuture<'_, Ticket>;

    /// All tickets of an event, in any status.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `Corrupt` as for [`get_ticket`](Self::get_ticket)
    fn tickets_for_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Ticket>>;
}

/// Event security configuration and per-event counters.
pub trait EventDirectory: Send + Sync {
    /// Load an event's security configuration. `Ok(None)` when missing.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `Corrupt`
    fn get_event(&self, id: EventId) -> StoreFuture<'_, Option<EventSecurityConfig>>;

    /// Increment the event's scanned-count counter, returning the new count.
    ///
    /// # Errors
    ///
    /// - `EventNotFound` / `Unavailable`
    fn increment_scanned_count(&self, id: EventId) -> StoreFuture<'_, u64>;

    /// Replace the event's signing secret.
    ///
    /// # Errors
    ///
    /// - `EventNotFound` / `Unavailable`
    fn rotate_secret(&self, id: EventId, secret: SigningSecret) -> StoreFuture<'_, ()>;
}

/// Durable queue of offline-captured check-ins.
pub trait PendingCheckInQueue: Send + Sync {
    /// Append a record in `pending` status.
    ///
    /// # Errors
    ///
    /// - `Unavailable`
    fn enqueue(&self, record: PendingCheckIn) -> StoreFuture<'_, ()>;

    /// Claim up to `limit` pending records of one event for `batch`, moving
    /// them to `processing`. Records claimed by one batch are invisible to
    /// concurrent claims.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `Corrupt`
    fn claim_batch(
        &self,
        event_id: EventId,
        batch: BatchId,
        limit: usize,
    ) -> StoreFuture<'_, Vec<PendingCheckIn>>;

    /// Mark a record `completed`.
    ///
    /// # Errors
    ///
    /// - `PendingNotFound` / `Unavailable`
    fn complete(&self, id: PendingCheckInId) -> StoreFuture<'_, ()>;

    /// Return a record to `pending` after a transient fault, incrementing its
    /// retry count and recording the error.
    ///
    /// # Errors
    ///
    /// - `PendingNotFound` / `Unavailable`
    fn release(&self, id: PendingCheckInId, error: String) -> StoreFuture<'_, ()>;

    /// Mark a record permanently `failed`.
    ///
    /// # Errors
    ///
    /// - `PendingNotFound` / `Unavailable`
    fn fail(&self, id: PendingCheckInId, error: String) -> StoreFuture<'_, ()>;

    /// Events that currently have `pending` records.
    ///
    /// # Errors
    ///
    /// - `Unavailable`
    fn events_with_pending(&self) -> StoreFuture<'_, Vec<EventId>>;
}
