//! Activity log of terminal scan outcomes.

use crate::store_error;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use turnstile_core::{
    ActorId, AuditEvent, AuditSink, DeviceId, EventId, GateId, OutcomeKind, StoreError,
    StoreFuture, TicketId,
};
use uuid::Uuid;

/// `PostgreSQL` audit sink. Every recorded outcome becomes one row of
/// `check_in_audit`.
#[derive(Clone, Debug)]
pub struct PostgresAuditLog {
    pool: PgPool,
}

impl PostgresAuditLog {
    /// Create a log over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Audited outcomes of one event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] or [`StoreError::Corrupt`].
    pub async fn for_event(&self, event_id: EventId) -> Result<Vec<AuditEvent>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT ticket_id, event_id, actor_id, outcome_kind, gate_id, device_id, occurred_at
            FROM check_in_audit
            WHERE event_id = $1
            ORDER BY occurred_at, id
            ",
        )
        .bind(event_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(audit_from_row).collect()
    }

    /// Number of fraud signals recorded against one event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`].
    pub async fn fraud_signals(&self, event_id: EventId) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM check_in_audit
            WHERE event_id = $1 AND outcome_kind IN ('conflict', 'bad_signature')
            ",
        )
        .bind(event_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        crate::from_db_i64(count, "fraud signal count")
    }
}

impl AuditSink for PostgresAuditLog {
    fn record(&self, event: AuditEvent) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO check_in_audit (
                    ticket_id, event_id, actor_id, outcome_kind, gate_id, device_id, occurred_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(event.ticket_id.as_uuid())
            .bind(event.event_id.as_uuid())
            .bind(event.actor_id.map(|a| *a.as_uuid()))
            .bind(event.outcome_kind.as_str())
            .bind(event.gate_id.as_ref().map(GateId::as_str))
            .bind(event.device_id.as_ref().map(DeviceId::as_str))
            .bind(event.timestamp)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

            if event.outcome_kind.is_fraud_signal() {
                tracing::warn!(
                    ticket_id = %event.ticket_id,
                    event_id = %event.event_id,
                    outcome = %event.outcome_kind,
                    "Fraud signal recorded"
                );
            }
            Ok(())
        })
    }
}

fn audit_from_row(row: &PgRow) -> Result<AuditEvent, StoreError> {
    let label: String = row.try_get("outcome_kind").map_err(store_error)?;
    let outcome_kind = OutcomeKind::parse(&label)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown outcome kind: {label}")))?;
    let actor: Option<Uuid> = row.try_get("actor_id").map_err(store_error)?;
    let gate: Option<String> = row.try_get("gate_id").map_err(store_error)?;
    let device: Option<String> = row.try_get("device_id").map_err(store_error)?;

    Ok(AuditEvent {
        ticket_id: TicketId::from_uuid(row.try_get("ticket_id").map_err(store_error)?),
        event_id: EventId::from_uuid(row.try_get("event_id").map_err(store_error)?),
        actor_id: actor.map(ActorId::from_uuid),
        outcome_kind,
        gate_id: gate.map(GateId::new),
        device_id: device.map(DeviceId::new),
        timestamp: row.try_get("occurred_at").map_err(store_error)?,
    })
}
