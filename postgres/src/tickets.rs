//! Ticket rows and the version-guarded conditional write.

use crate::{from_db_i64, store_error, to_db_i64};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use std::collections::HashMap;
use turnstile_core::{
    AccountId, ActorId, BookingId, CheckInFacts, DeviceId, EventId, GateId, Holder, Price, Seat,
    StoreError, StoreFuture, Ticket, TicketId, TicketStatus, TicketStatusKind, TicketStore,
    TicketTransition, Version,
};
use turnstile_core::ticket::TransferRecord;
use uuid::Uuid;

const TICKET_COLUMNS: &str = "id, booking_id, event_id, ticket_code, ticket_type, price_minor, \
     currency, seat_section, seat_number, holder_name, holder_email, holder_phone, \
     holder_account, status, valid_from, valid_until, used_at, used_by, entry_gate, \
     entry_device, version";

/// `PostgreSQL` ticket store.
///
/// [`persist_transition`](TicketStore::persist_transition) reads the row,
/// applies the state machine, and writes the result with
/// `UPDATE ... WHERE id = $1 AND version = $2`. A concurrent commit makes the
/// update match zero rows, which is reported as a version conflict; no row
/// lock is held between the read and the write.
#[derive(Clone, Debug)]
pub struct PostgresTicketStore {
    pool: PgPool,
}

impl PostgresTicketStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a ticket and its transfer lineage, as issued by the booking
    /// system.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the insert fails, including on a
    /// duplicate id.
    pub async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), StoreError> {
        let facts = ticket.check_in_facts();
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        sqlx::query(
            r"
            INSERT INTO tickets (
                id, booking_id, event_id, ticket_code, ticket_type, price_minor, currency,
                seat_section, seat_number, holder_name, holder_email, holder_phone,
                holder_account, status, valid_from, valid_until, used_at, used_by,
                entry_gate, entry_device, version
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21
            )
            ",
        )
        .bind(ticket.id.as_uuid())
        .bind(ticket.booking_id.as_uuid())
        .bind(ticket.event_id.as_uuid())
        .bind(&ticket.ticket_code)
        .bind(&ticket.ticket_type)
        .bind(ticket.price.amount_minor)
        .bind(&ticket.price.currency)
        .bind(ticket.seat.as_ref().map(|s| s.section.as_str()))
        .bind(ticket.seat.as_ref().and_then(|s| s.number.as_deref()))
        .bind(&ticket.holder.name)
        .bind(&ticket.holder.email)
        .bind(ticket.holder.phone.as_deref())
        .bind(ticket.holder.account.map(|a| *a.as_uuid()))
        .bind(ticket.status.kind().as_str())
        .bind(ticket.valid_from)
        .bind(ticket.valid_until)
        .bind(facts.map(|f| f.used_at))
        .bind(facts.map(|f| *f.used_by.as_uuid()))
        .bind(facts.and_then(|f| f.gate.as_ref()).map(GateId::as_str))
        .bind(facts.and_then(|f| f.device.as_ref()).map(DeviceId::as_str))
        .bind(to_db_i64(ticket.version.value(), "version")?)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        for transfer in &ticket.transfers {
            insert_transfer(&mut tx, ticket.id, transfer).await?;
        }
        tx.commit().await.map_err(store_error)?;

        tracing::debug!(ticket_id = %ticket.id, event_id = %ticket.event_id, "Ticket inserted");
        Ok(())
    }

    async fn conditional_write(
        &self,
        id: TicketId,
        expected: Version,
        transition: TicketTransition,
    ) -> Result<Ticket, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let current = fetch_ticket(&mut tx, id)
            .await?
            .ok_or(StoreError::TicketNotFound(id))?;
        if current.version != expected {
            return Err(StoreError::VersionConflict {
                ticket_id: id,
                expected,
                actual: current.version,
            });
        }
        let next = current.apply(&transition)?;
        let facts = next.check_in_facts();

        let updated = sqlx::query(
            r"
            UPDATE tickets
            SET ticket_code = $3,
                holder_name = $4,
                holder_email = $5,
                holder_phone = $6,
                holder_account = $7,
                status = $8,
                used_at = $9,
                used_by = $10,
                entry_gate = $11,
                entry_device = $12,
                version = $13,
                updated_at = now()
            WHERE id = $1 AND version = $2
            ",
        )
        .bind(id.as_uuid())
        .bind(to_db_i64(expected.value(), "version")?)
        .bind(&next.ticket_code)
        .bind(&next.holder.name)
        .bind(&next.holder.email)
        .bind(next.holder.phone.as_deref())
        .bind(next.holder.account.map(|a| *a.as_uuid()))
        .bind(next.status.kind().as_str())
        .bind(facts.map(|f| f.used_at))
        .bind(facts.map(|f| *f.used_by.as_uuid()))
        .bind(facts.and_then(|f| f.gate.as_ref()).map(GateId::as_str))
        .bind(facts.and_then(|f| f.device.as_ref()).map(DeviceId::as_str))
        .bind(to_db_i64(next.version.value(), "version")?)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        if updated.rows_affected() == 0 {
            drop(tx);
            let actual = self.current_version(id).await?;
            tracing::debug!(ticket_id = %id, %expected, %actual, "Conditional write lost");
            return Err(StoreError::VersionConflict {
                ticket_id: id,
                expected,
                actual,
            });
        }

        if matches!(transition, TicketTransition::Transfer { .. }) {
            if let Some(record) = next.transfers.last() {
                insert_transfer(&mut tx, id, record).await?;
            }
        }
        tx.commit().await.map_err(store_error)?;
        Ok(next)
    }

    async fn current_version(&self, id: TicketId) -> Result<Version, StoreError> {
        let version: Option<i64> = sqlx::query_scalar("SELECT version FROM tickets WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        let version = version.ok_or(StoreError::TicketNotFound(id))?;
        Ok(Version::new(from_db_i64(version, "version")?))
    }
}

impl TicketStore for PostgresTicketStore {
    fn get_ticket(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(store_error)?;
            fetch_ticket(&mut conn, id).await
        })
    }

    fn persist_transition(
        &self,
        id: TicketId,
        expected: Version,
        transition: TicketTransition,
    ) -> StoreFuture<'_, Ticket> {
        Box::pin(self.conditional_write(id, expected, transition))
    }

    fn tickets_for_event(&self, event_id: EventId) -> StoreFuture<'_, Vec<Ticket>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(store_error)?;
            let rows = sqlx::query(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE event_id = $1 ORDER BY id"
            ))
            .bind(event_id.as_uuid())
            .fetch_all(&mut *conn)
            .await
            .map_err(store_error)?;

            let ids: Vec<Uuid> = rows
                .iter()
                .map(|row| row.try_get::<Uuid, _>("id"))
                .collect::<Result<_, _>>()
                .map_err(store_error)?;
            let mut transfers = fetch_transfers(&mut conn, &ids).await?;

            rows.iter()
                .map(|row| {
                    let id: Uuid = row.try_get("id").map_err(store_error)?;
                    ticket_from_row(row, transfers.remove(&id).unwrap_or_default())
                })
                .collect()
        })
    }
}

async fn fetch_ticket(conn: &mut PgConnection, id: TicketId) -> Result<Option<Ticket>, StoreError> {
    let row = sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"))
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(store_error)?;
    let Some(row) = row else {
        return Ok(None);
    };

    let mut transfers = fetch_transfers(conn, &[*id.as_uuid()]).await?;
    ticket_from_row(&row, transfers.remove(id.as_uuid()).unwrap_or_default()).map(Some)
}

async fn fetch_transfers(
    conn: &mut PgConnection,
    ticket_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<TransferRecord>>, StoreError> {
    let rows = sqlx::query(
        r"
        SELECT ticket_id, from_holder, to_holder, reason, transferred_at
        FROM ticket_transfers
        WHERE ticket_id = ANY($1)
        ORDER BY id
        ",
    )
    .bind(ticket_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(store_error)?;

    let mut by_ticket: HashMap<Uuid, Vec<TransferRecord>> = HashMap::new();
    for row in rows {
        let ticket_id: Uuid = row.try_get("ticket_id").map_err(store_error)?;
        let Json(from) = row.try_get::<Json<Holder>, _>("from_holder").map_err(store_error)?;
        let Json(to) = row.try_get::<Json<Holder>, _>("to_holder").map_err(store_error)?;
        by_ticket.entry(ticket_id).or_default().push(TransferRecord {
            from,
            to,
            at: row.try_get("transferred_at").map_err(store_error)?,
            reason: row.try_get("reason").map_err(store_error)?,
        });
    }
    Ok(by_ticket)
}

async fn insert_transfer(
    conn: &mut PgConnection,
    ticket_id: TicketId,
    transfer: &TransferRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        r"
        INSERT INTO ticket_transfers (ticket_id, from_holder, to_holder, reason, transferred_at)
        VALUES ($1, $2, $3, $4, $5)
        ",
    )
    .bind(ticket_id.as_uuid())
    .bind(Json(&transfer.from))
    .bind(Json(&transfer.to))
    .bind(transfer.reason.as_deref())
    .bind(transfer.at)
    .execute(&mut *conn)
    .await
    .map_err(store_error)?;
    Ok(())
}

fn ticket_from_row(row: &PgRow, transfers: Vec<TransferRecord>) -> Result<Ticket, StoreError> {
    let label: String = row.try_get("status").map_err(store_error)?;
    let kind = TicketStatusKind::parse(&label)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown ticket status: {label}")))?;

    let status = match kind {
        TicketStatusKind::Valid => TicketStatus::Valid,
        TicketStatusKind::Cancelled => TicketStatus::Cancelled,
        TicketStatusKind::Transferred => TicketStatus::Transferred,
        TicketStatusKind::Expired => TicketStatus::Expired,
        TicketStatusKind::Used => {
            let used_at: Option<DateTime<Utc>> = row.try_get("used_at").map_err(store_error)?;
            let used_by: Option<Uuid> = row.try_get("used_by").map_err(store_error)?;
            let (Some(used_at), Some(used_by)) = (used_at, used_by) else {
                return Err(StoreError::Corrupt(
                    "used ticket without check-in facts".to_string(),
                ));
            };
            let gate: Option<String> = row.try_get("entry_gate").map_err(store_error)?;
            let device: Option<String> = row.try_get("entry_device").map_err(store_error)?;
            TicketStatus::Used(CheckInFacts {
                used_at,
                used_by: ActorId::from_uuid(used_by),
                gate: gate.map(GateId::new),
                device: device.map(DeviceId::new),
            })
        }
    };

    let seat_section: Option<String> = row.try_get("seat_section").map_err(store_error)?;
    let seat_number: Option<String> = row.try_get("seat_number").map_err(store_error)?;
    let holder_account: Option<Uuid> = row.try_get("holder_account").map_err(store_error)?;
    let version: i64 = row.try_get("version").map_err(store_error)?;

    Ok(Ticket {
        id: TicketId::from_uuid(row.try_get("id").map_err(store_error)?),
        booking_id: BookingId::from_uuid(row.try_get("booking_id").map_err(store_error)?),
        event_id: EventId::from_uuid(row.try_get("event_id").map_err(store_error)?),
        ticket_code: row.try_get("ticket_code").map_err(store_error)?,
        ticket_type: row.try_get("ticket_type").map_err(store_error)?,
        price: Price {
            amount_minor: row.try_get("price_minor").map_err(store_error)?,
            currency: row.try_get("currency").map_err(store_error)?,
        },
        seat: seat_section.map(|section| Seat {
            section,
            number: seat_number,
        }),
        holder: Holder {
            name: row.try_get("holder_name").map_err(store_error)?,
            email: row.try_get("holder_email").map_err(store_error)?,
            phone: row.try_get("holder_phone").map_err(store_error)?,
            account: holder_account.map(AccountId::from_uuid),
        },
        transfers,
        status,
        valid_from: row.try_get("valid_from").map_err(store_error)?,
        valid_until: row.try_get("valid_until").map_err(store_error)?,
        version: Version::new(from_db_i64(version, "version")?),
    })
}
