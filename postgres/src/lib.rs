//! `PostgreSQL` storage for the Turnstile check-in core.
//!
//! This crate implements the storage traits from `turnstile-core` on top of
//! sqlx:
//!
//! - [`PostgresTicketStore`]: tickets with a version-guarded conditional write
//! - [`PostgresEventDirectory`]: event security configuration and counters
//! - [`PostgresPendingQueue`]: offline check-ins, claimed with
//!   `FOR UPDATE SKIP LOCKED`
//! - [`PostgresAuditLog`]: terminal scan outcomes for the activity log
//!
//! # Example
//!
//! ```ignore
//! use turnstile_postgres::{PostgresTicketStore, connect, migrate};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("postgres://localhost/turnstile", 10).await?;
//!     migrate(&pool).await?;
//!     let tickets = PostgresTicketStore::new(pool);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod audit;
mod events;
mod pending;
mod tickets;

pub use audit::PostgresAuditLog;
pub use events::PostgresEventDirectory;
pub use pending::PostgresPendingQueue;
pub use tickets::PostgresTicketStore;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use turnstile_core::StoreError;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the database cannot be reached.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Unavailable(format!("Failed to connect: {e}")))
}

/// Run the bundled migrations.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Unavailable(format!("Migration failed: {e}")))
}

/// Classify a sqlx error: undecodable rows are corrupt, everything else is
/// the database being unavailable.
pub(crate) fn store_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Corrupt(e.to_string()),
        _ => StoreError::Unavailable(e.to_string()),
    }
}

/// Convert an unsigned counter for a `BIGINT` column.
pub(crate) fn to_db_i64(value: u64, what: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{what} out of range: {value}")))
}

/// Convert a `BIGINT` column back to an unsigned counter.
pub(crate) fn from_db_i64(value: i64, what: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {what}: {value}")))
}
