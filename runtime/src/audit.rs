//! Default audit sink: structured `tracing` records.

use turnstile_core::{AuditEvent, AuditSink, StoreFuture};

/// Writes each audit event as one `tracing` record on target
/// `turnstile::audit`. Fraud-signal outcomes are logged at `warn`, the rest at
/// `info`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    /// Create the sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if event.outcome_kind.is_fraud_signal() {
                tracing::warn!(
                    target: "turnstile::audit",
                    ticket_id = %event.ticket_id,
                    event_id = %event.event_id,
                    actor_id = ?event.actor_id,
                    outcome = %event.outcome_kind,
                    gate = ?event.gate_id,
                    device = ?event.device_id,
                    timestamp = %event.timestamp,
                    fraud_signal = true,
                    "check-in audit"
                );
            } else {
                tracing::info!(
                    target: "turnstile::audit",
                    ticket_id = %event.ticket_id,
                    event_id = %event.event_id,
                    actor_id = ?event.actor_id,
                    outcome = %event.outcome_kind,
                    gate = ?event.gate_id,
                    device = ?event.device_id,
                    timestamp = %event.timestamp,
                    "check-in audit"
                );
            }
            Ok(())
        })
    }
}
