//! Token validation.
//!
//! `validate` runs the checks in a fixed order, cheapest first, and stops at
//! the first failure:
//!
//! 1. structural decode
//! 2. ticket and event lookup
//! 3. signature under the event secret (fraud signal on failure)
//! 4. token expiry, whatever the ticket's status
//! 5. current ticket code (a transfer supersedes earlier tokens)
//! 6. scan eligibility (status, ticket window, event check-in window)
//! 7. gate authorization
//! 8. event timing (admission lead time, event end)

use crate::admission::check_admission;
use crate::environment::ScanEnvironment;
use crate::error::Result;
use crate::metrics::ValidationMetrics;
use tracing::{debug, info, warn};
use turnstile_core::token::{self, TokenError};
use turnstile_core::{
    AuditEvent, GateId, OutcomeKind, RejectionReason, TicketSummary, Verdict,
};

/// Validates scanned tokens without changing any state.
#[derive(Clone)]
pub struct Validator {
    env: ScanEnvironment,
}

impl Validator {
    /// Create a validator.
    #[must_use]
    pub const fn new(env: ScanEnvironment) -> Self {
        Self { env }
    }

    /// Validate a scanned token, optionally at a specific gate.
    ///
    /// Rejections are returned as [`Verdict::Rejected`].
    ///
    /// # Errors
    ///
    /// Only storage faults propagate.
    #[tracing::instrument(skip(self, token))]
    pub async fn validate(&self, token: &str, gate: Option<&GateId>) -> Result<Verdict> {
        let verdict = self.evaluate(token, gate).await?;
        ValidationMetrics::record_verdict(verdict.kind());
        Ok(verdict)
    }

    async fn evaluate(&self, token: &str, gate: Option<&GateId>) -> Result<Verdict> {
        let unverified = match token::decode(token) {
            Ok(unverified) => unverified,
            Err(e) => {
                debug!(error = %e, "Rejected malformed token");
                return Ok(Verdict::Rejected(RejectionReason::Malformed));
            }
        };
        let ticket_id = unverified.claims().ticket_id;
        let event_id = unverified.claims().event_id;

        let Some(event) = self.env.events.get_event(event_id).await? else {
            debug!(%ticket_id, %event_id, "Token references unknown event");
            return Ok(Verdict::Rejected(RejectionReason::NotFound));
        };
        let ticket = match self.env.tickets.get_ticket(ticket_id).await? {
            Some(ticket) if ticket.event_id == event_id => ticket,
            _ => {
                debug!(%ticket_id, %event_id, "Token references unknown ticket");
                return Ok(Verdict::Rejected(RejectionReason::NotFound));
            }
        };

        let now = self.env.clock.now();
        let claims = match unverified.verify(&event.secret) {
            Ok(claims) => claims,
            Err(TokenError::BadSignature) => {
                warn!(
                    %ticket_id,
                    %event_id,
                    gate = ?gate,
                    fraud_signal = true,
                    "Token signature verification failed"
                );
                ValidationMetrics::record_fraud_signal(RejectionReason::BadSignature.kind());
                self.env
                    .audit(AuditEvent {
                        ticket_id,
                        event_id,
                        actor_id: None,
                        outcome_kind: OutcomeKind::BadSignature,
                        gate_id: gate.cloned(),
                        device_id: None,
                        timestamp: now,
                    })
                    .await;
                return Ok(Verdict::Rejected(RejectionReason::BadSignature));
            }
            Err(e) => {
                debug!(error = %e, "Rejected malformed token");
                return Ok(Verdict::Rejected(RejectionReason::Malformed));
            }
        };

        if claims.is_expired_at(now) {
            debug!(%ticket_id, expired_at = %claims.expires_at, "Token expired");
            return Ok(Verdict::Rejected(RejectionReason::Expired {
                expired_at: claims.expires_at,
            }));
        }

        // A transfer rotates the code; the previous holder's token no
        // longer resolves to this ticket.
        if claims.ticket_code != ticket.ticket_code {
            info!(%ticket_id, "Token carries a superseded ticket code");
            return Ok(Verdict::Rejected(RejectionReason::NotFound));
        }

        if let Err(reason) = check_admission(&ticket, &event, gate, now, &self.env.policy) {
            debug!(%ticket_id, reason = reason.kind(), "Ticket not admissible");
            return Ok(Verdict::Rejected(reason));
        }

        debug!(%ticket_id, "Token admitted");
        Ok(Verdict::Admitted(TicketSummary::new(&ticket, &event)))
    }
}
