//! Disconnected scanning against a provisioned manifest.
//!
//! A scanner loads a manifest blob and the event secret while online. While
//! offline it validates tokens (or bare short hashes) locally, applies the
//! event timing and gate rules carried by the manifest, blocks repeat scans
//! on this device, and appends a [`PendingCheckIn`] for every admission. The
//! reconciler replays those records later, earliest scan first.

use crate::admission::EventTiming;
use crate::error::{Result, TurnstileError};
use crate::policy::ScanPolicy;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use turnstile_core::manifest::{self, ManifestBlob, ManifestDocument, ManifestEntry};
use turnstile_core::signer;
use turnstile_core::token::{self, TokenError};
use turnstile_core::{
    ActorId, CheckInFacts, Clock, DeviceId, EventId, GateId, PendingCheckIn,
    PendingCheckInId, PendingCheckInQueue, RejectionReason, SigningSecret, TicketClass,
};

/// Result of an offline scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OfflineVerdict {
    /// Admitted locally.
    Admitted {
        /// Manifest entry of the ticket
        entry: ManifestEntry,
        /// Pending record queued for reconciliation
        pending: PendingCheckInId,
    },
    /// Rejected locally.
    Rejected(RejectionReason),
}

struct Loaded {
    document: ManifestDocument,
    secret: SigningSecret,
    entries: HashMap<String, ManifestEntry>,
    admitted: HashMap<String, CheckInFacts>,
}

/// An offline-capable scanner bound to one device, actor and gate.
pub struct OfflineScanner {
    device: DeviceId,
    actor: ActorId,
    gate: Option<GateId>,
    clock: Arc<dyn Clock>,
    queue: Arc<dyn PendingCheckInQueue>,
    policy: ScanPolicy,
    loaded: Mutex<Option<Loaded>>,
}

impl OfflineScanner {
    /// Create a scanner with no manifest loaded.
    #[must_use]
    pub fn new(
        device: DeviceId,
        actor: ActorId,
        gate: Option<GateId>,
        clock: Arc<dyn Clock>,
        queue: Arc<dyn PendingCheckInQueue>,
    ) -> Self {
        Self {
            device,
            actor,
            gate,
            clock,
            queue,
            policy: ScanPolicy::default(),
            loaded: Mutex::new(None),
        }
    }

    /// Use `policy` for the admission lead time instead of the default.
    #[must_use]
    pub fn with_policy(mut self, policy: ScanPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Verify and load a manifest, replacing any previous one. Local repeat
    /// tracking is reset.
    ///
    /// Returns the number of admissible tickets.
    ///
    /// # Errors
    ///
    /// [`TurnstileError::Manifest`] if the blob fails size, checksum,
    /// signature or layout checks; nothing is loaded in that case.
    pub fn load_manifest(&self, blob: &ManifestBlob, secret: SigningSecret) -> Result<usize> {
        let document = manifest::open(blob, &secret)?;
        let entries: HashMap<String, ManifestEntry> = document
            .entries
            .iter()
            .map(|e| (e.ticket_hash.clone(), e.clone()))
            .collect();
        let count = entries.len();
        tracing::info!(
            event_id = %document.event.id,
            entries = count,
            generated_at = %document.generated_at,
            "Manifest loaded"
        );

        *self.lock()? = Some(Loaded {
            document,
            secret,
            entries,
            admitted: HashMap::new(),
        });
        Ok(count)
    }

    /// Event of the loaded manifest.
    ///
    /// # Errors
    ///
    /// [`TurnstileError::Internal`] if the scanner state is poisoned.
    pub fn event_id(&self) -> Result<Option<EventId>> {
        Ok(self.lock()?.as_ref().map(|l| l.document.event.id))
    }

    /// Validate a scanned token against the manifest and queue a pending
    /// check-in on admission.
    ///
    /// # Errors
    ///
    /// [`TurnstileError::ManifestNotLoaded`] without a manifest, or a queue
    /// fault while appending the pending record.
    pub async fn scan_token(&self, token: &str) -> Result<OfflineVerdict> {
        let now = self.clock.now();
        let decision = {
            let mut guard = self.lock()?;
            let loaded = guard.as_mut().ok_or(TurnstileError::ManifestNotLoaded)?;
            self.evaluate_token(loaded, token, now)
        };
        self.finish(decision, now).await
    }

    /// Admit a ticket by its printed short hash alone.
    ///
    /// The same timing, gate and repeat rules apply as for a token, and an
    /// admission queues a pending check-in for the entry's ticket.
    ///
    /// # Errors
    ///
    /// [`TurnstileError::ManifestNotLoaded`] without a manifest, or a queue
    /// fault while appending the pending record.
    pub async fn scan_short_hash(&self, short_hash: &str) -> Result<OfflineVerdict> {
        let now = self.clock.now();
        let decision = {
            let mut guard = self.lock()?;
            let loaded = guard.as_mut().ok_or(TurnstileError::ManifestNotLoaded)?;
            let hash = short_hash.trim().to_ascii_lowercase();
            EventTiming::from(&loaded.document.event)
                .check(now, &self.policy)
                .and_then(|()| self.admit(loaded, &hash, now))
        };
        self.finish(decision, now).await
    }

    async fn finish(
        &self,
        decision: std::result::Result<(ManifestEntry, EventId), RejectionReason>,
        now: DateTime<Utc>,
    ) -> Result<OfflineVerdict> {
        let (entry, event_id) = match decision {
            Ok(admitted) => admitted,
            Err(reason) => return Ok(OfflineVerdict::Rejected(reason)),
        };
        let record = PendingCheckIn::new(
            entry.ticket_id,
            event_id,
            self.actor,
            self.gate.clone(),
            Some(self.device.clone()),
            now,
        );
        let pending = record.id;
        if let Err(e) = self.queue.enqueue(record).await {
            // Not captured, so the ticket may be scanned again on this device.
            if let Some(loaded) = self.lock()?.as_mut() {
                loaded.admitted.remove(&entry.ticket_hash);
            }
            return Err(e.into());
        }
        Ok(OfflineVerdict::Admitted { entry, pending })
    }

    fn evaluate_token(
        &self,
        loaded: &mut Loaded,
        token: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<(ManifestEntry, EventId), RejectionReason> {
        let unverified = token::decode(token).map_err(|_| RejectionReason::Malformed)?;
        let event_id = loaded.document.event.id;
        let ticket_id = unverified.claims().ticket_id;
        if unverified.claims().event_id != event_id {
            debug!("Token belongs to another event");
            return Err(RejectionReason::NotFound);
        }

        let claims = match unverified.verify(&loaded.secret) {
            Ok(claims) => claims,
            Err(TokenError::BadSignature) => {
                warn!(
                    %ticket_id,
                    device = %self.device,
                    fraud_signal = true,
                    "Offline token signature verification failed"
                );
                return Err(RejectionReason::BadSignature);
            }
            Err(_) => return Err(RejectionReason::Malformed),
        };
        if claims.is_expired_at(now) {
            return Err(RejectionReason::Expired {
                expired_at: claims.expires_at,
            });
        }
        EventTiming::from(&loaded.document.event).check(now, &self.policy)?;

        let hash = signer::ticket_hash(&claims.ticket_id, &claims.ticket_code, &event_id, &loaded.secret);
        self.admit(loaded, &hash, now)
    }

    /// Resolve a manifest entry, then gate authorization, then the local
    /// repeat guard. Marks the ticket admitted on this device on success.
    fn admit(
        &self,
        loaded: &mut Loaded,
        hash: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<(ManifestEntry, EventId), RejectionReason> {
        let Some(entry) = loaded.entries.get(hash).cloned() else {
            return Err(RejectionReason::NotFound);
        };
        if let Some(gate) = &self.gate {
            if !gate_admits(&loaded.document, gate, entry.ticket_class) {
                return Err(RejectionReason::GateNotAuthorized { gate: gate.clone() });
            }
        }
        if let Some(facts) = loaded.admitted.get(hash) {
            debug!(ticket_hash = hash, "Repeat scan blocked locally");
            return Err(RejectionReason::AlreadyUsed(facts.clone()));
        }
        loaded.admitted.insert(
            hash.to_string(),
            CheckInFacts {
                used_at: now,
                used_by: self.actor,
                gate: self.gate.clone(),
                device: Some(self.device.clone()),
            },
        );
        Ok((entry, loaded.document.event.id))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Loaded>>> {
        self.loaded
            .lock()
            .map_err(|_| TurnstileError::Internal("Offline scanner state poisoned".into()))
    }
}

fn gate_admits(document: &ManifestDocument, gate: &GateId, class: TicketClass) -> bool {
    if document.event.vip_gates.contains(gate) {
        class == TicketClass::Vip
    } else {
        document.event.gates.contains(gate)
    }
}

