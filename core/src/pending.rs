//! Offline-captured check-ins awaiting reconciliation.

use crate::ids::{ActorId, BatchId, DeviceId, EventId, GateId, PendingCheckInId, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a pending check-in record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    /// Waiting to be claimed
    Pending,
    /// Claimed by a reconciliation batch
    Processing,
    /// Replayed; the outcome is final
    Completed,
    /// Gave up after repeated faults
    Failed,
}

impl PendingStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse status from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A check-in captured while the scanner had no connectivity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCheckIn {
    /// Record id
    pub id: PendingCheckInId,
    /// Scanned ticket
    pub ticket_id: TicketId,
    /// Event of the ticket
    pub event_id: EventId,
    /// Staff account that scanned
    pub checked_by: ActorId,
    /// Gate of the scan
    pub gate: Option<GateId>,
    /// Device of the scan
    pub device: Option<DeviceId>,
    /// Original scan time on the device
    pub scanned_at: DateTime<Utc>,
    /// Number of failed replay attempts
    pub retry_count: u32,
    /// Lifecycle status
    pub status: PendingStatus,
    /// Batch that claimed the record
    pub batch_id: Option<BatchId>,
    /// Last replay fault, for operators
    pub last_error: Option<String>,
}

impl PendingCheckIn {
    /// A new record in `pending` status.
    #[must_use]
    pub fn new(
        ticket_id: TicketId,
        event_id: EventId,
        checked_by: ActorId,
        gate: Option<GateId>,
        device: Option<DeviceId>,
        scanned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PendingCheckInId::new(),
            ticket_id,
            event_id,
            checked_by,
            gate,
            device,
            scanned_at,
            retry_count: 0,
            status: PendingStatus::Pending,
            batch_id: None,
            last_error: None,
        }
    }
}

/// Sort records into replay order: earliest scan first, ties broken by id so
/// the order is total.
pub fn sort_for_replay(records: &mut [PendingCheckIn]) {
    records.sort_by(|a, b| a.scanned_at.cmp(&b.scanned_at).then_with(|| a.id.cmp(&b.id)));
}
