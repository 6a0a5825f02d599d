//! The check-in coordinator: at-most-once `valid → used` under concurrency.
//!
//! Each attempt reads the ticket, decides, and commits with a single
//! compare-and-set on the ticket version. Exactly one concurrent writer
//! wins; the others reload, observe the committed facts and resolve as a
//! duplicate (same actor inside the duplicate window) or as `AlreadyUsed`.
//!
//! The conditional write is the only mutual exclusion. Ordering for a ticket
//! is "earliest committed write wins", not "earliest request arrives".

use crate::admission::check_admission;
use crate::environment::ScanEnvironment;
use crate::error::{Result, TurnstileError};
use crate::metrics::{CheckInMetrics, ValidationMetrics};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::{debug, info, warn};
use turnstile_core::{
    ActorId, AuditEvent, CheckInFacts, CheckInOutcome, DeviceId, EventSecurityConfig, GateId,
    OutcomeKind, RejectionReason, StoreError, Ticket, TicketId, TicketSummary, TicketTransition,
};

/// A check-in request from a scanner, or a replayed offline capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckInRequest {
    /// Ticket to check in
    pub ticket_id: TicketId,
    /// Scanning staff account
    pub actor: ActorId,
    /// Gate of the scan
    pub gate: Option<GateId>,
    /// Device of the scan
    pub device: Option<DeviceId>,
    /// Original scan time; `None` means now. Offline replays set it so every
    /// time-based rule is evaluated at the moment of the scan.
    pub scanned_at: Option<DateTime<Utc>>,
}

impl CheckInRequest {
    /// A live request scanned now.
    #[must_use]
    pub const fn new(ticket_id: TicketId, actor: ActorId) -> Self {
        Self {
            ticket_id,
            actor,
            gate: None,
            device: None,
            scanned_at: None,
        }
    }

    /// Set the gate.
    #[must_use]
    pub fn at_gate(mut self, gate: impl Into<GateId>) -> Self {
        self.gate = Some(gate.into());
        self
    }

    /// Set the device.
    #[must_use]
    pub fn from_device(mut self, device: impl Into<DeviceId>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Evaluate at an earlier scan time.
    #[must_use]
    pub const fn scanned_at(mut self, at: DateTime<Utc>) -> Self {
        self.scanned_at = Some(at);
        self
    }
}

/// Commits check-ins.
#[derive(Clone)]
pub struct CheckInCoordinator {
    env: ScanEnvironment,
}

impl CheckInCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub const fn new(env: ScanEnvironment) -> Self {
        Self { env }
    }

    /// Check a ticket in.
    ///
    /// Safe to retry: a repeat by the same actor inside the duplicate window
    /// returns success with `duplicate: true`.
    ///
    /// # Errors
    ///
    /// Storage faults, and [`TurnstileError::Contention`] when every write
    /// attempt lost to a concurrent writer.
    #[tracing::instrument(
        skip(self, request),
        fields(ticket_id = %request.ticket_id, actor = %request.actor, gate = ?request.gate)
    )]
    pub async fn check_in(&self, request: CheckInRequest) -> Result<CheckInOutcome> {
        let started = Instant::now();
        let outcome = self.commit(&request).await?;
        CheckInMetrics::record_outcome(outcome.kind(), started.elapsed());
        Ok(outcome)
    }

    async fn commit(&self, request: &CheckInRequest) -> Result<CheckInOutcome> {
        let at = request.scanned_at.unwrap_or_else(|| self.env.clock.now());
        let max_attempts = self.env.policy.max_write_attempts.max(1);

        let Some(mut ticket) = self.env.tickets.get_ticket(request.ticket_id).await? else {
            return Ok(CheckInOutcome::Rejected(RejectionReason::NotFound));
        };
        let Some(event) = self.env.events.get_event(ticket.event_id).await? else {
            return Ok(CheckInOutcome::Rejected(RejectionReason::NotFound));
        };

        for attempt in 1..=max_attempts {
            if let Some(facts) = ticket.check_in_facts() {
                return Ok(self.resolve_used(request, &ticket, &event, facts.clone(), at).await);
            }

            if let Err(reason) =
                check_admission(&ticket, &event, request.gate.as_ref(), at, &self.env.policy)
            {
                debug!(reason = reason.kind(), "Check-in refused");
                return Ok(CheckInOutcome::Rejected(reason));
            }

            let facts = CheckInFacts {
                used_at: at,
                used_by: request.actor,
                gate: request.gate.clone(),
                device: request.device.clone(),
            };
            match self
                .env
                .tickets
                .persist_transition(ticket.id, ticket.version, TicketTransition::CheckIn(facts.clone()))
                .await
            {
                Ok(committed) => {
                    return Ok(self.on_committed(request, &committed, &event, facts).await);
                }
                Err(StoreError::VersionConflict { .. } | StoreError::IllegalTransition(_)) => {
                    CheckInMetrics::record_conflict();
                    debug!(attempt, "Lost the conditional write, reloading");
                    match self.env.tickets.get_ticket(request.ticket_id).await? {
                        Some(reloaded) => ticket = reloaded,
                        None => return Ok(CheckInOutcome::Rejected(RejectionReason::NotFound)),
                    }
                }
                Err(StoreError::TicketNotFound(_)) => {
                    return Ok(CheckInOutcome::Rejected(RejectionReason::NotFound));
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(facts) = ticket.check_in_facts() {
            return Ok(self.resolve_used(request, &ticket, &event, facts.clone(), at).await);
        }
        warn!(attempts = max_attempts, "Check-in gave up under contention");
        Err(TurnstileError::Contention {
            ticket_id: request.ticket_id,
            attempts: max_attempts,
        })
    }

    async fn on_committed(
        &self,
        request: &CheckInRequest,
        committed: &Ticket,
        event: &EventSecurityConfig,
        facts: CheckInFacts,
    ) -> CheckInOutcome {
        match self.env.events.increment_scanned_count(event.id).await {
            Ok(count) => debug!(scanned_count = count, "Scanned count incremented"),
            Err(e) => warn!(error = %e, "Failed to increment scanned count"),
        }
        self.emit(request, committed, OutcomeKind::CheckedIn, facts.used_at)
            .await;
        info!(version = %committed.version, "Ticket checked in");

        CheckInOutcome::CheckedIn {
            summary: TicketSummary::new(committed, event),
            facts,
            duplicate: false,
        }
    }

    /// Decide between duplicate and conflict for an already used ticket.
    async fn resolve_used(
        &self,
        request: &CheckInRequest,
        ticket: &Ticket,
        event: &EventSecurityConfig,
        facts: CheckInFacts,
        at: DateTime<Utc>,
    ) -> CheckInOutcome {
        let same_actor = facts.used_by == request.actor;
        let within_window = (at - facts.used_at).abs() <= self.env.policy.duplicate_window;

        if same_actor && within_window {
            debug!(used_at = %facts.used_at, "Repeat scan absorbed as duplicate");
            self.emit(request, ticket, OutcomeKind::Duplicate, at).await;
            return CheckInOutcome::CheckedIn {
                summary: TicketSummary::new(ticket, event),
                facts,
                duplicate: true,
            };
        }

        if same_actor {
            info!(used_at = %facts.used_at, "Ticket re-presented to the same actor outside the duplicate window");
        } else {
            warn!(
                used_by = %facts.used_by,
                used_at = %facts.used_at,
                used_gate = ?facts.gate,
                fraud_signal = true,
                "Ticket already used by another actor"
            );
            ValidationMetrics::record_fraud_signal("already_used");
        }
        self.emit(request, ticket, OutcomeKind::Conflict, at).await;
        CheckInOutcome::Rejected(RejectionReason::AlreadyUsed(facts))
    }

    async fn emit(
        &self,
        request: &CheckInRequest,
        ticket: &Ticket,
        outcome_kind: OutcomeKind,
        timestamp: DateTime<Utc>,
    ) {
        self.env
            .audit(AuditEvent {
                ticket_id: ticket.id,
                event_id: ticket.event_id,
                actor_id: Some(request.actor),
                outcome_kind,
                gate_id: request.gate.clone(),
                device_id: request.device.clone(),
                timestamp,
            })
            .await;
    }
}
