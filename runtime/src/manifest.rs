//! Offline manifest export.

use crate::environment::ScanEnvironment;
use crate::error::{Result, TurnstileError};
use crate::metrics::ManifestMetrics;
use turnstile_core::manifest::{self, ManifestBlob};
use turnstile_core::EventId;

/// Builds signed manifests for offline scanners.
#[derive(Clone)]
pub struct ManifestService {
    env: ScanEnvironment,
}

impl ManifestService {
    /// Create a manifest service.
    #[must_use]
    pub const fn new(env: ScanEnvironment) -> Self {
        Self { env }
    }

    /// Snapshot every scan-eligible ticket of `event_id` into a signed,
    /// compressed blob. Regenerated from scratch on every call.
    ///
    /// # Errors
    ///
    /// - [`TurnstileError::EventNotFound`] if the event does not exist
    /// - storage and manifest encoding faults
    #[tracing::instrument(skip(self))]
    pub async fn build_manifest(&self, event_id: EventId) -> Result<ManifestBlob> {
        let event = self
            .env
            .events
            .get_event(event_id)
            .await?
            .ok_or(TurnstileError::EventNotFound(event_id))?;
        let tickets = self.env.tickets.tickets_for_event(event_id).await?;

        let document = manifest::project(&event, &tickets, self.env.clock.now());
        let blob = manifest::seal(&document, &event.secret)?;

        ManifestMetrics::record_built(blob.size);
        tracing::info!(
            tickets = tickets.len(),
            entries = document.entries.len(),
            size = blob.size,
            "Manifest built"
        );
        Ok(blob)
    }
}
