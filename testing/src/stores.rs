//! In-memory storage for fast, deterministic tests.
//!
//! - [`InMemoryTicketStore`]: `HashMap`-backed tickets with the same
//!   compare-and-set contract as the Postgres store
//! - [`InMemoryEventDirectory`]: event configs and scanned counters
//! - [`InMemoryPendingQueue`]: pending check-ins with batch claiming
//! - [`RecordingAuditSink`]: captures audit events for assertions
//!
//! Every store can be switched to "unavailable" to exercise fault paths.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use turnstile_core::{
    AuditEvent, AuditSink, BatchId, EventDirectory, EventId, EventSecurityConfig, OutcomeKind,
    PendingCheckIn, PendingCheckInId, PendingCheckInQueue, PendingStatus, SigningSecret,
    StoreError, StoreFuture, Ticket, TicketId, TicketStore, TicketTransition, Version,
};

fn unavailable() -> StoreError {
    StoreError::Unavailable("injected fault".to_string())
}

/// Counts down injected faults; `0` means healthy.
#[derive(Debug, Default)]
struct FaultInjector(AtomicU32);

impl FaultInjector {
    fn set(&self, n: u32) {
        self.0.store(n, Ordering::SeqCst);
    }

    fn trip(&self) -> Result<(), StoreError> {
        let tripped = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped { Err(unavailable()) } else { Ok(()) }
    }
}

/// In-memory ticket store.
///
/// # Example
///
/// ```
/// use turnstile_testing::{EventBuilder, InMemoryTicketStore, TicketBuilder};
///
/// let event = EventBuilder::new().build();
/// let store = InMemoryTicketStore::new();
/// let ticket = TicketBuilder::for_event(&event).build();
/// store.insert(ticket.clone());
/// assert_eq!(store.snapshot(ticket.id).unwrap().version, ticket.version);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryTicketStore {
    tickets: Arc<RwLock<HashMap<TicketId, Ticket>>>,
    faults: Arc<FaultInjector>,
}

impl InMemoryTicketStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a ticket as-is.
    pub fn insert(&self, ticket: Ticket) {
        self.tickets.write().unwrap().insert(ticket.id, ticket);
    }

    /// Current stored state of a ticket.
    #[must_use]
    pub fn snapshot(&self, id: TicketId) -> Option<Ticket> {
        self.tickets.read().unwrap().get(&id).cloned()
    }

    /// Fail the next `n` operations with `Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.faults.set(n);
    }
}

impl TicketStore for InMemoryTicketStore {
    fn get_ticket(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            self.faults.trip()?;
            Ok(self.tickets.read().unwrap().get(&id).cloned())
        })
    }

    fn persist_transition(
        &self,
        id: TicketId,
        expected: Version,
        transition: TicketTransition,
    ) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            self.faults.trip()?;
            let mut tickets = self.tickets.write().unwrap();
            let current = tickets.get(&id).ok_or(StoreError::TicketNotFound(id))?;
            if current.version != expected {
                return Err(StoreError::VersionConflict {
                    ticket_id: id,
                    expected,
                    actual: current.version,
                });
            }
            let next = current.apply(&transition)?;
            tickets.insert(id, next.clone());
            Ok(next)
        })
    }

    fn tickets_for_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Ticket>> {
        Box::pin(async move {
            self.faults.trip()?;
            Ok(self
                .tickets
                .read()
                .unwrap()
                .values()
                .filter(|t| t.event_id == event_id)
                .cloned()
                .collect())
        })
    }
}

/// In-memory event directory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventDirectory {
    events: Arc<RwLock<HashMap<EventId, EventSecurityConfig>>>,
    scanned: Arc<RwLock<HashMap<EventId, u64>>>,
}

impl InMemoryEventDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an event.
    pub fn insert(&self, event: EventSecurityConfig) {
        self.events.write().unwrap().insert(event.id, event);
    }

    /// Scanned-count counter of an event.
    #[must_use]
    pub fn scanned_count(&self, id: EventId) -> u64 {
        self.scanned.read().unwrap().get(&id).copied().unwrap_or(0)
    }

    /// Current secret of an event.
    #[must_use]
    pub fn secret(&self, id: EventId) -> Option<SigningSecret> {
        self.events.read().unwrap().get(&id).map(|e| e.secret.clone())
    }
}

impl EventDirectory for InMemoryEventDirectory {
    fn get_event(&self, id: EventId) -> StoreFuture<'_, Option<EventSecurityConfig>> {
        Box::pin(async move { Ok(self.events.read().unwrap().get(&id).cloned()) })
    }

    fn increment_scanned_count(&self, id: EventId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            if !self.events.read().unwrap().contains_key(&id) {
                return Err(StoreError::EventNotFound(id));
            }
            let mut scanned = self.scanned.write().unwrap();
            let count = scanned.entry(id).or_insert(0);
            *count += 1;
            Ok(*count)
        })
    }

    fn rotate_secret(&self, id: EventId, secret: SigningSecret) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut events = self.events.write().unwrap();
            let event = events.get_mut(&id).ok_or(StoreError::EventNotFound(id))?;
            event.secret = secret;
            Ok(())
        })
    }
}

/// In-memory pending check-in queue.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPendingQueue {
    records: Arc<Mutex<Vec<PendingCheckIn>>>,
    faults: Arc<FaultInjector>,
}

impl InMemoryPendingQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<PendingCheckIn> {
        self.records.lock().unwrap().clone()
    }

    /// A record by id.
    #[must_use]
    pub fn get(&self, id: PendingCheckInId) -> Option<PendingCheckIn> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Records in `status`.
    #[must_use]
    pub fn with_status(&self, status: PendingStatus) -> Vec<PendingCheckIn> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect()
    }

    /// Fail the next `n` operations with `Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.faults.set(n);
    }

    fn update(
        &self,
        id: PendingCheckInId,
        f: impl FnOnce(&mut PendingCheckIn),
    ) -> Result<(), StoreError> {
        self.faults.trip()?;
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::PendingNotFound(id))?;
        f(record);
        Ok(())
    }
}

impl PendingCheckInQueue for InMemoryPendingQueue {
    fn enqueue(&self, record: PendingCheckIn) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.faults.trip()?;
            self.records.lock().unwrap().push(record);
            Ok(())
        })
    }

    fn claim_batch(
        &self,
        event_id: EventId,
        batch: BatchId,
        limit: usize,
    ) -> StoreFuture<'_, Vec<PendingCheckIn>> {
        Box::pin(async move {
            self.faults.trip()?;
            let mut records = self.records.lock().unwrap();
            let mut candidates: Vec<&mut PendingCheckIn> = records
                .iter_mut()
                .filter(|r| r.event_id == event_id && r.status == PendingStatus::Pending)
                .collect();
            candidates.sort_by(|a, b| a.scanned_at.cmp(&b.scanned_at).then_with(|| a.id.cmp(&b.id)));

            Ok(candidates
                .into_iter()
                .take(limit)
                .map(|r| {
                    r.status = PendingStatus::Processing;
                    r.batch_id = Some(batch);
                    r.clone()
                })
                .collect())
        })
    }

    fn complete(&self, id: PendingCheckInId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.update(id, |r| {
                r.status = PendingStatus::Completed;
                r.last_error = None;
            })
        })
    }

    fn release(&self, id: PendingCheckInId, error: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.update(id, |r| {
                r.status = PendingStatus::Pending;
                r.retry_count += 1;
                r.batch_id = None;
                r.last_error = Some(error);
            })
        })
    }

    fn fail(&self, id: PendingCheckInId, error: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.update(id, |r| {
                r.status = PendingStatus::Failed;
                r.retry_count += 1;
                r.last_error = Some(error);
            })
        })
    }

    fn events_with_pending(&self) -> StoreFuture<'_, Vec<EventId>> {
        Box::pin(async move {
            self.faults.trip()?;
            let mut events: Vec<EventId> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.status == PendingStatus::Pending)
                .map(|r| r.event_id)
                .collect();
            events.sort();
            events.dedup();
            Ok(events)
        })
    }
}

/// Audit sink that keeps every event for assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingAuditSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of events of `kind`.
    #[must_use]
    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.outcome_kind == kind)
            .count()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: AuditEvent) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.events.lock().unwrap().push(event);
            Ok(())
        })
    }
}
