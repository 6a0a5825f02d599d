//! Explicit signing-secret rotation.
//!
//! Rotating an event's secret invalidates every outstanding token and the
//! manifests built from it. It is never done implicitly.

use crate::environment::ScanEnvironment;
use crate::error::{Result, TurnstileError};
use crate::metrics::IssuanceMetrics;
use chrono::{DateTime, Utc};
use turnstile_core::{EventId, SigningSecret, StoreError};

/// What a rotation affected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotationReport {
    /// Event whose secret changed
    pub event_id: EventId,
    /// Tickets still scannable at rotation time; their tokens no longer verify
    pub invalidated_tickets: usize,
    /// When the rotation happened
    pub rotated_at: DateTime<Utc>,
}

/// Replace `event_id`'s signing secret with `secret`.
///
/// Scanners holding a manifest for the event must be re-provisioned, and
/// holders of unused tickets need freshly issued tokens.
///
/// # Errors
///
/// - [`TurnstileError::EventNotFound`] if the event does not exist
/// - storage faults
#[tracing::instrument(skip(env, secret))]
pub async fn rotate_event_secret(
    env: &ScanEnvironment,
    event_id: EventId,
    secret: SigningSecret,
) -> Result<RotationReport> {
    if env.events.get_event(event_id).await?.is_none() {
        return Err(TurnstileError::EventNotFound(event_id));
    }

    let now = env.clock.now();
    let invalidated_tickets = env
        .tickets
        .tickets_for_event(event_id)
        .await?
        .iter()
        .filter(|t| t.effective_status(now).is_scannable())
        .count();

    env.events
        .rotate_secret(event_id, secret)
        .await
        .map_err(|e| match e {
            StoreError::EventNotFound(id) => TurnstileError::EventNotFound(id),
            other => other.into(),
        })?;

    IssuanceMetrics::record_rotation();
    tracing::warn!(
        invalidated_tickets,
        "Event signing secret rotated; outstanding tokens and manifests are invalid"
    );

    Ok(RotationReport {
        event_id,
        invalidated_tickets,
        rotated_at: now,
    })
}
