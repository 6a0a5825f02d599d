//! Injected dependencies shared by every service.

use crate::policy::ScanPolicy;
use std::sync::Arc;
use turnstile_core::{AuditEvent, AuditSink, Clock, EventDirectory, TicketStore};

/// Storage, audit sink, clock and policy handed to each service.
///
/// Cloning is cheap: every dependency sits behind an `Arc`.
#[derive(Clone)]
pub struct ScanEnvironment {
    /// Ticket records and the conditional write
    pub tickets: Arc<dyn TicketStore>,
    /// Event security configuration
    pub events: Arc<dyn EventDirectory>,
    /// Destination for audit events
    pub audit: Arc<dyn AuditSink>,
    /// Time source for every time-based rule
    pub clock: Arc<dyn Clock>,
    /// Tunable limits
    pub policy: ScanPolicy,
}

impl ScanEnvironment {
    /// Assemble an environment.
    #[must_use]
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        events: Arc<dyn EventDirectory>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        policy: ScanPolicy,
    ) -> Self {
        Self {
            tickets,
            events,
            audit,
            clock,
            policy,
        }
    }

    /// Emit an audit event. A failing sink is logged; the audited outcome
    /// stands.
    pub(crate) async fn audit(&self, event: AuditEvent) {
        let ticket_id = event.ticket_id;
        let outcome = event.outcome_kind;
        if let Err(e) = self.audit.record(event).await {
            tracing::error!(
                ticket_id = %ticket_id,
                outcome = %outcome,
                error = %e,
                "Failed to record audit event"
            );
        }
    }
}
