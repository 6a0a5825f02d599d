//! Event security configuration and the scanned-count counter.

use crate::{from_db_i64, store_error};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::BTreeSet;
use turnstile_core::{
    EventDirectory, EventId, EventSecurityConfig, GateId, SigningSecret, StoreError, StoreFuture,
};
use uuid::Uuid;

/// `PostgreSQL` event directory.
#[derive(Clone, Debug)]
pub struct PostgresEventDirectory {
    pool: PgPool,
}

impl PostgresEventDirectory {
    /// Create a directory over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace an event's security configuration. The scanned
    /// count of an existing event is kept.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the write fails.
    pub async fn upsert_event(&self, event: &EventSecurityConfig) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO event_security (
                id, name, signing_secret, gates, vip_gates, check_in_enabled,
                opens_at, closes_at, starts_at, ends_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                signing_secret = EXCLUDED.signing_secret,
                gates = EXCLUDED.gates,
                vip_gates = EXCLUDED.vip_gates,
                check_in_enabled = EXCLUDED.check_in_enabled,
                opens_at = EXCLUDED.opens_at,
                closes_at = EXCLUDED.closes_at,
                starts_at = EXCLUDED.starts_at,
                ends_at = EXCLUDED.ends_at
            ",
        )
        .bind(event.id.as_uuid())
        .bind(&event.name)
        .bind(event.secret.expose_bytes())
        .bind(gate_labels(&event.gates))
        .bind(gate_labels(&event.vip_gates))
        .bind(event.check_in_enabled)
        .bind(event.opens_at)
        .bind(event.closes_at)
        .bind(event.starts_at)
        .bind(event.ends_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        tracing::debug!(event_id = %event.id, "Event security configuration saved");
        Ok(())
    }

    /// When the secret was last rotated, if ever.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EventNotFound`] for an unknown event.
    pub async fn secret_rotated_at(&self, id: EventId) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT secret_rotated_at FROM event_security WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;
        row.ok_or(StoreError::EventNotFound(id))
    }
}

impl EventDirectory for PostgresEventDirectory {
    fn get_event(&self, id: EventId) -> StoreFuture<'_, Option<EventSecurityConfig>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT id, name, signing_secret, gates, vip_gates, check_in_enabled,
                       opens_at, closes_at, starts_at, ends_at
                FROM event_security
                WHERE id = $1
                ",
            )
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

            row.as_ref().map(event_from_row).transpose()
        })
    }

    fn increment_scanned_count(&self, id: EventId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let count: Option<i64> = sqlx::query_scalar(
                r"
                UPDATE event_security
                SET scanned_count = scanned_count + 1
                WHERE id = $1
                RETURNING scanned_count
                ",
            )
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

            let count = count.ok_or(StoreError::EventNotFound(id))?;
            from_db_i64(count, "scanned count")
        })
    }

    fn rotate_secret(&self, id: EventId, secret: SigningSecret) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE event_security
                SET signing_secret = $2, secret_rotated_at = now()
                WHERE id = $1
                ",
            )
            .bind(id.as_uuid())
            .bind(secret.expose_bytes())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::EventNotFound(id));
            }
            Ok(())
        })
    }
}

fn gate_labels(gates: &BTreeSet<GateId>) -> Vec<String> {
    gates.iter().map(|g| g.as_str().to_string()).collect()
}

fn event_from_row(row: &PgRow) -> Result<EventSecurityConfig, StoreError> {
    let id: Uuid = row.try_get("id").map_err(store_error)?;
    let secret: Vec<u8> = row.try_get("signing_secret").map_err(store_error)?;
    let secret = SigningSecret::new(secret)
        .map_err(|e| StoreError::Corrupt(format!("signing secret of event {id}: {e}")))?;
    let gates: Vec<String> = row.try_get("gates").map_err(store_error)?;
    let vip_gates: Vec<String> = row.try_get("vip_gates").map_err(store_error)?;

    Ok(EventSecurityConfig {
        id: EventId::from_uuid(id),
        name: row.try_get("name").map_err(store_error)?,
        secret,
        gates: gates.into_iter().map(GateId::new).collect(),
        vip_gates: vip_gates.into_iter().map(GateId::new).collect(),
        check_in_enabled: row.try_get("check_in_enabled").map_err(store_error)?,
        opens_at: row.try_get("opens_at").map_err(store_error)?,
        closes_at: row.try_get("closes_at").map_err(store_error)?,
        starts_at: row.try_get("starts_at").map_err(store_error)?,
        ends_at: row.try_get("ends_at").map_err(store_error)?,
    })
}
