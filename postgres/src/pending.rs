//! Durable queue of offline-captured check-ins.

use crate::store_error;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use turnstile_core::{
    ActorId, BatchId, DeviceId, EventId, GateId, PendingCheckIn, PendingCheckInId,
    PendingCheckInQueue, PendingStatus, StoreError, StoreFuture, TicketId,
};
use uuid::Uuid;

/// `PostgreSQL` pending check-in queue.
///
/// Claims use `FOR UPDATE SKIP LOCKED`, so concurrent reconcilers never
/// claim the same record.
#[derive(Clone, Debug)]
pub struct PostgresPendingQueue {
    pool: PgPool,
}

impl PostgresPendingQueue {
    /// Create a queue over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load one record regardless of status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] or [`StoreError::Corrupt`].
    pub async fn get(&self, id: PendingCheckInId) -> Result<Option<PendingCheckIn>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, ticket_id, event_id, checked_by, gate_id, device_id, scanned_at,
                   retry_count, status, batch_id, last_error
            FROM pending_check_ins
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(pending_from_row).transpose()
    }

    /// Records that gave up after repeated faults, for operator review.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] or [`StoreError::Corrupt`].
    pub async fn failed(&self, event_id: EventId) -> Result<Vec<PendingCheckIn>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, ticket_id, event_id, checked_by, gate_id, device_id, scanned_at,
                   retry_count, status, batch_id, last_error
            FROM pending_check_ins
            WHERE event_id = $1 AND status = 'failed'
            ORDER BY scanned_at, id
            ",
        )
        .bind(event_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(pending_from_row).collect()
    }

    async fn settle(
        &self,
        id: PendingCheckInId,
        status: PendingStatus,
        error: Option<String>,
        bump_retries: bool,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE pending_check_ins
            SET status = $2,
                last_error = COALESCE($3, last_error),
                retry_count = retry_count + CASE WHEN $4 THEN 1 ELSE 0 END,
                batch_id = CASE WHEN $2 = 'pending' THEN NULL ELSE batch_id END,
                updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(error)
        .bind(bump_retries)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PendingNotFound(id));
        }
        Ok(())
    }
}

impl PendingCheckInQueue for PostgresPendingQueue {
    fn enqueue(&self, record: PendingCheckIn) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let retry_count = i32::try_from(record.retry_count).map_err(|_| {
                StoreError::Corrupt(format!("retry count out of range: {}", record.retry_count))
            })?;

            sqlx::query(
                r"
                INSERT INTO pending_check_ins (
                    id, ticket_id, event_id, checked_by, gate_id, device_id, scanned_at,
                    retry_count, status, batch_id, last_error
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ",
            )
            .bind(record.id.as_uuid())
            .bind(record.ticket_id.as_uuid())
            .bind(record.event_id.as_uuid())
            .bind(record.checked_by.as_uuid())
            .bind(record.gate.as_ref().map(GateId::as_str))
            .bind(record.device.as_ref().map(DeviceId::as_str))
            .bind(record.scanned_at)
            .bind(retry_count)
            .bind(record.status.as_str())
            .bind(record.batch_id.map(|b| *b.as_uuid()))
            .bind(record.last_error.as_deref())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

            tracing::debug!(
                pending_id = %record.id,
                ticket_id = %record.ticket_id,
                "Offline check-in queued"
            );
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
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = sqlx::query(
                r"
                UPDATE pending_check_ins
                SET status = 'processing', batch_id = $2, updated_at = now()
                WHERE id IN (
                    SELECT id FROM pending_check_ins
                    WHERE event_id = $1 AND status = 'pending'
                    ORDER BY scanned_at, id
                    LIMIT $3
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING id, ticket_id, event_id, checked_by, gate_id, device_id, scanned_at,
                          retry_count, status, batch_id, last_error
                ",
            )
            .bind(event_id.as_uuid())
            .bind(batch.as_uuid())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

            // RETURNING carries no ordering guarantee.
            let mut claimed = rows
                .iter()
                .map(pending_from_row)
                .collect::<Result<Vec<_>, _>>()?;
            turnstile_core::pending::sort_for_replay(&mut claimed);
            Ok(claimed)
        })
    }

    fn complete(&self, id: PendingCheckInId) -> StoreFuture<'_, ()> {
        Box::pin(self.settle(id, PendingStatus::Completed, None, false))
    }

    fn release(&self, id: PendingCheckInId, error: String) -> StoreFuture<'_, ()> {
        Box::pin(self.settle(id, PendingStatus::Pending, Some(error), true))
    }

    fn fail(&self, id: PendingCheckInId, error: String) -> StoreFuture<'_, ()> {
        Box::pin(self.settle(id, PendingStatus::Failed, Some(error), true))
    }

    fn events_with_pending(&self) -> StoreFuture<'_, Vec<EventId>> {
        Box::pin(async move {
            let ids: Vec<Uuid> = sqlx::query_scalar(
                r"
                SELECT DISTINCT event_id
                FROM pending_check_ins
                WHERE status = 'pending'
                ORDER BY event_id
                ",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

            Ok(ids.into_iter().map(EventId::from_uuid).collect())
        })
    }
}

fn pending_from_row(row: &PgRow) -> Result<PendingCheckIn, StoreError> {
    let label: String = row.try_get("status").map_err(store_error)?;
    let status = PendingStatus::parse(&label)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown pending status: {label}")))?;
    let retry_count: i32 = row.try_get("retry_count").map_err(store_error)?;
    let gate: Option<String> = row.try_get("gate_id").map_err(store_error)?;
    let device: Option<String> = row.try_get("device_id").map_err(store_error)?;
    let batch: Option<Uuid> = row.try_get("batch_id").map_err(store_error)?;

    Ok(PendingCheckIn {
        id: PendingCheckInId::from_uuid(row.try_get("id").map_err(store_error)?),
        ticket_id: TicketId::from_uuid(row.try_get("ticket_id").map_err(store_error)?),
        event_id: EventId::from_uuid(row.try_get("event_id").map_err(store_error)?),
        checked_by: ActorId::from_uuid(row.try_get("checked_by").map_err(store_error)?),
        gate: gate.map(GateId::new),
        device: device.map(DeviceId::new),
        scanned_at: row.try_get("scanned_at").map_err(store_error)?,
        retry_count: u32::try_from(retry_count)
            .map_err(|_| StoreError::Corrupt(format!("negative retry count: {retry_count}")))?,
        status,
        batch_id: batch.map(BatchId::from_uuid),
        last_error: row.try_get("last_error").map_err(store_error)?,
    })
}
