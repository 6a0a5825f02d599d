//! Offline reconciliation worker.
//!
//! Claims pending check-ins per event, replays them through the
//! [`CheckInCoordinator`] in scan order at their original scan time, and
//! records each record's fate in the queue:
//!
//! - coordinator returned an outcome (admitted, duplicate or rejected):
//!   `completed`
//! - transient fault after in-place retries: back to `pending` with
//!   `retry_count + 1`, or `failed` once the record's retry budget is spent
//! - permanent fault: `failed`
//!
//! Once a record is requeued, later records for the same ticket in the batch
//! go back to the queue unreplayed so a later scan cannot overtake it.
//!
//! An online check-in committed before the replay wins even if the offline
//! scan happened earlier; committed history is never rewritten.

use crate::coordinator::{CheckInCoordinator, CheckInRequest};
use crate::error::{Result, TurnstileError};
use crate::metrics::ReconcileMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use turnstile_core::pending::sort_for_replay;
use turnstile_core::{
    BatchId, CheckInOutcome, EventId, PendingCheckIn, PendingCheckInId, PendingCheckInQueue,
    TicketId,
};

/// Error recorded on a record returned to the queue because an earlier scan
/// of its ticket was deferred in the same batch.
pub const DEFERRED_BEHIND_EARLIER_SCAN: &str = "earlier scan of this ticket deferred";

/// Reconciler tuning.
#[derive(Clone, Debug)]
pub struct ReconcilerSettings {
    /// Records claimed per event per pass
    pub batch_size: usize,
    /// Replay attempts across passes before a record is marked failed
    pub max_retries: u32,
    /// Sleep between passes
    pub poll_interval: Duration,
    /// In-place retry policy for transient faults within one pass
    pub retry: RetryPolicy,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_retries: 5,
            poll_interval: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// What happened to one replayed record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The coordinator produced a final outcome; the record is completed.
    Applied(CheckInOutcome),
    /// Transient fault; returned to the queue for a later pass.
    Requeued {
        /// Fault description
        error: String,
    },
    /// Permanent fault or retries exhausted; marked failed.
    Failed {
        /// Fault description
        error: String,
    },
}

impl Resolution {
    /// Metric and log label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Applied(outcome) if outcome.is_success() => "applied",
            Self::Applied(_) => "rejected",
            Self::Requeued { .. } => "requeued",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Outcome of one pending record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconciledRecord {
    /// Pending record
    pub pending_id: PendingCheckInId,
    /// Ticket it referred to
    pub ticket_id: TicketId,
    /// Original scan time
    pub scanned_at: DateTime<Utc>,
    /// What happened
    pub resolution: Resolution,
}

/// Result of reconciling one claimed batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReport {
    /// Event reconciled
    pub event_id: EventId,
    /// Claiming batch
    pub batch_id: BatchId,
    /// Per-record outcomes in replay order
    pub records: Vec<ReconciledRecord>,
}

impl BatchReport {
    /// Records whose replay admitted the ticket (first or duplicate).
    #[must_use]
    pub fn admitted(&self) -> usize {
        self.count(|r| matches!(r, Resolution::Applied(o) if o.is_success()))
    }

    /// Records whose replay was rejected by the coordinator.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.count(|r| matches!(r, Resolution::Applied(o) if !o.is_success()))
    }

    /// Records returned to the queue.
    #[must_use]
    pub fn requeued(&self) -> usize {
        self.count(|r| matches!(r, Resolution::Requeued { .. }))
    }

    /// Records marked failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, Resolution::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&Resolution) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.resolution)).count()
    }
}

/// Replays offline check-ins.
pub struct Reconciler {
    queue: Arc<dyn PendingCheckInQueue>,
    coordinator: CheckInCoordinator,
    settings: ReconcilerSettings,
}

impl Reconciler {
    /// Create a reconciler.
    #[must_use]
    pub const fn new(
        queue: Arc<dyn PendingCheckInQueue>,
        coordinator: CheckInCoordinator,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            queue,
            coordinator,
            settings,
        }
    }

    /// Claim and replay one batch of `event_id`'s pending records.
    ///
    /// # Errors
    ///
    /// Queue faults while claiming or recording resolutions. Replay faults
    /// never fail the batch; they are recorded per record.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_event(&self, event_id: EventId) -> Result<BatchReport> {
        let batch_id = BatchId::new();
        let mut claimed = self
            .queue
            .claim_batch(event_id, batch_id, self.settings.batch_size)
            .await?;
        sort_for_replay(&mut claimed);
        debug!(%batch_id, claimed = claimed.len(), "Batch claimed");

        let mut records = Vec::with_capacity(claimed.len());
        let mut deferred: HashSet<TicketId> = HashSet::new();
        for record in claimed {
            let resolution = if deferred.contains(&record.ticket_id) {
                debug!(pending_id = %record.id, ticket_id = %record.ticket_id, "Held behind an earlier scan");
                Resolution::Requeued {
                    error: DEFERRED_BEHIND_EARLIER_SCAN.to_string(),
                }
            } else {
                self.replay(&record).await
            };
            if matches!(resolution, Resolution::Requeued { .. }) {
                deferred.insert(record.ticket_id);
            }
            self.settle(&record, &resolution).await?;
            ReconcileMetrics::record(resolution.label());
            records.push(ReconciledRecord {
                pending_id: record.id,
                ticket_id: record.ticket_id,
                scanned_at: record.scanned_at,
                resolution,
            });
        }

        let report = BatchReport {
            event_id,
            batch_id,
            records,
        };
        info!(
            %batch_id,
            admitted = report.admitted(),
            rejected = report.rejected(),
            requeued = report.requeued(),
            failed = report.failed(),
            "Batch reconciled"
        );
        Ok(report)
    }

    /// One pass over every event with pending records.
    ///
    /// A failing event is logged and skipped; the others still run.
    ///
    /// # Errors
    ///
    /// Queue faults while listing events.
    pub async fn run_once(&self) -> Result<Vec<BatchReport>> {
        let events = self.queue.events_with_pending().await?;
        let mut reports = Vec::with_capacity(events.len());
        for event_id in events {
            match self.reconcile_event(event_id).await {
                Ok(report) => reports.push(report),
                Err(e) => error!(%event_id, error = %e, "Reconciliation failed for event"),
            }
        }
        Ok(reports)
    }

    /// Run passes every `poll_interval` until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = u64::try_from(self.settings.poll_interval.as_millis()).unwrap_or(u64::MAX),
            batch_size = self.settings.batch_size,
            "Reconciler started"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.run_once().await {
                error!(error = %e, "Reconciliation pass failed");
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
        info!("Reconciler stopped");
    }

    async fn replay(&self, record: &PendingCheckIn) -> Resolution {
        let request = CheckInRequest {
            ticket_id: record.ticket_id,
            actor: record.checked_by,
            gate: record.gate.clone(),
            device: record.device.clone(),
            scanned_at: Some(record.scanned_at),
        };

        let result = retry_with_predicate(
            self.settings.retry.clone(),
            || self.coordinator.check_in(request.clone()),
            TurnstileError::is_transient,
        )
        .await;

        match result {
            Ok(outcome) => {
                if !outcome.is_success() {
                    info!(
                        pending_id = %record.id,
                        ticket_id = %record.ticket_id,
                        outcome = outcome.kind(),
                        "Offline admission rejected on replay"
                    );
                }
                Resolution::Applied(outcome)
            }
            Err(e) if e.is_transient() && record.retry_count + 1 < self.settings.max_retries => {
                warn!(pending_id = %record.id, retry_count = record.retry_count, error = %e, "Replay deferred");
                Resolution::Requeued {
                    error: e.to_string(),
                }
            }
            Err(e) => {
                error!(pending_id = %record.id, retry_count = record.retry_count, error = %e, "Replay failed permanently");
                Resolution::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn settle(&self, record: &PendingCheckIn, resolution: &Resolution) -> Result<()> {
        match resolution {
            Resolution::Applied(_) => self.queue.complete(record.id).await?,
            Resolution::Requeued { error } => self.queue.release(record.id, error.clone()).await?,
            Resolution::Failed { error } => self.queue.fail(record.id, error.clone()).await?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_sane() {
        let settings = ReconcilerSettings::default();
        assert_eq!(settings.batch_size, 100);
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
    }
}
