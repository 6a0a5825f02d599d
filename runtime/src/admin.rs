//! Administrative ticket transitions: transfer, cancellation, housekeeping
//! expiry.
//!
//! These share the coordinator's conditional write. A transition is checked
//! against the state machine before it is attempted, so an illegal request
//! surfaces as [`TurnstileError::Transition`] instead of a storage fault.

use crate::environment::ScanEnvironment;
use crate::error::{Result, TurnstileError};
use tracing::{debug, info};
use turnstile_core::lifecycle::generate_ticket_code;
use turnstile_core::{
    ActorId, EventId, Holder, StoreError, Ticket, TicketId, TicketStatusKind, TicketTransition,
};

/// Applies administrative transitions to tickets.
#[derive(Clone)]
pub struct TicketAdmin {
    env: ScanEnvironment,
}

impl TicketAdmin {
    /// Create the service.
    #[must_use]
    pub const fn new(env: ScanEnvironment) -> Self {
        Self { env }
    }

    /// Move a ticket to a new holder. The ticket code is rotated, so tokens
    /// issued to the previous holder stop resolving.
    ///
    /// # Errors
    ///
    /// - [`TurnstileError::TicketNotFound`]
    /// - [`TurnstileError::Transition`] if the ticket is used, cancelled or expired
    /// - [`TurnstileError::Contention`], storage faults
    #[tracing::instrument(skip(self, to, reason))]
    pub async fn transfer(
        &self,
        ticket_id: TicketId,
        to: Holder,
        reason: Option<String>,
    ) -> Result<Ticket> {
        let at = self.env.clock.now();
        let new_ticket_code = generate_ticket_code();
        let ticket = self
            .transition(ticket_id, || TicketTransition::Transfer {
                to: to.clone(),
                reason: reason.clone(),
                at,
                new_ticket_code: new_ticket_code.clone(),
            })
            .await?;
        info!(transfers = ticket.transfers.len(), "Ticket transferred");
        Ok(ticket)
    }

    /// Cancel a valid or transferred ticket.
    ///
    /// # Errors
    ///
    /// As for [`transfer`](Self::transfer).
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        ticket_id: TicketId,
        by: Option<ActorId>,
        reason: Option<String>,
    ) -> Result<Ticket> {
        let ticket = self
            .transition(ticket_id, || TicketTransition::Cancel {
                by,
                reason: reason.clone(),
            })
            .await?;
        info!("Ticket cancelled");
        Ok(ticket)
    }

    /// Persist `expired` for every ticket of the event whose validity window
    /// has closed. Tickets that change concurrently are skipped and picked up
    /// by the next sweep. Returns the number of tickets expired.
    ///
    /// # Errors
    ///
    /// Storage faults other than concurrent modification.
    #[tracing::instrument(skip(self))]
    pub async fn expire_lapsed(&self, event_id: EventId) -> Result<usize> {
        let now = self.env.clock.now();
        let lapsed: Vec<Ticket> = self
            .env
            .tickets
            .tickets_for_event(event_id)
            .await?
            .into_iter()
            .filter(|t| {
                t.status.kind().is_scannable() && t.effective_status(now) == TicketStatusKind::Expired
            })
            .collect();

        let mut expired = 0;
        for ticket in lapsed {
            match self
                .env
                .tickets
                .persist_transition(ticket.id, ticket.version, TicketTransition::Expire)
                .await
            {
                Ok(_) => expired += 1,
                Err(
                    StoreError::VersionConflict { .. }
                    | StoreError::IllegalTransition(_)
                    | StoreError::TicketNotFound(_),
                ) => debug!(ticket_id = %ticket.id, "Ticket changed during sweep, skipped"),
                Err(e) => return Err(e.into()),
            }
        }
        info!(expired, "Expiry sweep finished");
        Ok(expired)
    }

    async fn transition(
        &self,
        ticket_id: TicketId,
        build: impl Fn() -> TicketTransition,
    ) -> Result<Ticket> {
        let max_attempts = self.env.policy.max_write_attempts.max(1);
        for attempt in 1..=max_attempts {
            let ticket = self
                .env
                .tickets
                .get_ticket(ticket_id)
                .await?
                .ok_or(TurnstileError::TicketNotFound(ticket_id))?;
            let transition = build();
            ticket.apply(&transition)?;

            match self
                .env
                .tickets
                .persist_transition(ticket_id, ticket.version, transition)
                .await
            {
                Ok(committed) => return Ok(committed),
                Err(StoreError::VersionConflict { .. }) => {
                    debug!(attempt, "Ticket changed concurrently, retrying");
                }
                Err(StoreError::IllegalTransition(e)) => return Err(e.into()),
                Err(StoreError::TicketNotFound(id)) => return Err(TurnstileError::TicketNotFound(id)),
                Err(e) => return Err(e.into()),
            }
        }
        Err(TurnstileError::Contention {
            ticket_id,
            attempts: max_attempts,
        })
    }
}
