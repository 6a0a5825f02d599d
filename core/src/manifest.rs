//! Offline manifest byte layout.
//!
//! ```text
//! payload   = zlib(canonical_json(document))
//! checksum  = hex(sha256(payload))
//! signature = base64url_nopad(hmac_sha256(event_secret, payload))
//! size      = len(payload)
//! ```
//!
//! The document lists every scan-eligible ticket as `{c, h, i, n, s, t}`:
//! gate class (`G` general, `V` VIP), short ticket hash, ticket id, holder
//! name, status code (`V` valid, `T` transferred) and abbreviated type. The
//! event block carries the gate layout and every timing rule a scanner needs
//! to decide admission on its own. Contact details and the secret never
//! appear. Manifests are regenerated, never patched.

use crate::event::{EventSecurityConfig, TicketClass};
use crate::ids::{EventId, GateId, TicketId};
use crate::signer::{self, SigningSecret};
use crate::ticket::{Ticket, TicketStatusKind};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Read, Write};
use thiserror::Error;

/// Current document layout version.
pub const MANIFEST_VERSION: u32 = 2;

/// Errors building or opening a manifest.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// Declared size differs from the payload length.
    #[error("manifest size mismatch: declared {declared}, actual {actual}")]
    SizeMismatch {
        /// Size in the blob header
        declared: usize,
        /// Actual payload length
        actual: usize,
    },

    /// Payload bytes do not hash to the declared checksum.
    #[error("manifest checksum mismatch")]
    ChecksumMismatch,

    /// Payload was not signed with the expected event secret.
    #[error("manifest signature does not verify")]
    BadSignature,

    /// Compression or decompression failed.
    #[error("manifest compression error: {0}")]
    Compression(String),

    /// The decompressed document is not a valid manifest.
    #[error("manifest layout error: {0}")]
    Layout(String),

    /// The document declares a layout version this build cannot read.
    #[error("unsupported manifest version {0}")]
    UnsupportedVersion(u32),
}

/// Status code carried by a manifest entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    /// Valid
    #[serde(rename = "V")]
    Valid,
    /// Transferred, valid for its current holder
    #[serde(rename = "T")]
    Transferred,
}

/// One scan-eligible ticket. Field names are single letters to keep the
/// payload small; declaration order is the canonical key order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Gate class of the full ticket type
    #[serde(rename = "c")]
    pub ticket_class: TicketClass,
    /// Short ticket hash
    #[serde(rename = "h")]
    pub ticket_hash: String,
    /// Ticket id, carried into pending check-ins
    #[serde(rename = "i")]
    pub ticket_id: TicketId,
    /// Holder name
    #[serde(rename = "n")]
    pub holder_name: String,
    /// Status code
    #[serde(rename = "s")]
    pub status: StatusCode,
    /// Abbreviated ticket type
    #[serde(rename = "t")]
    pub type_abbrev: String,
}

/// Event metadata embedded in the manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEvent {
    /// Master switch for check-in
    pub check_in_enabled: bool,
    /// Check-in window end
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub closes_at: Option<DateTime<Utc>>,
    /// Event end
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub ends_at: Option<DateTime<Utc>>,
    /// General gates
    pub gates: Vec<GateId>,
    /// Event id
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Check-in window start
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub opens_at: Option<DateTime<Utc>>,
    /// Event start
    #[serde(with = "chrono::serde::ts_seconds")]
    pub starts_at: DateTime<Utc>,
    /// VIP-restricted gates
    pub vip_gates: Vec<GateId>,
}

/// The decompressed manifest document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDocument {
    /// Scan-eligible tickets, sorted by hash
    pub entries: Vec<ManifestEntry>,
    /// Event metadata
    pub event: ManifestEvent,
    /// Snapshot time
    #[serde(with = "chrono::serde::ts_seconds")]
    pub generated_at: DateTime<Utc>,
    /// Layout version
    pub version: u32,
}

impl ManifestDocument {
    /// Index entries by ticket hash.
    #[must_use]
    pub fn index(&self) -> HashMap<&str, &ManifestEntry> {
        self.entries
            .iter()
            .map(|e| (e.ticket_hash.as_str(), e))
            .collect()
    }
}

/// A signed, compressed manifest ready for transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestBlob {
    /// zlib-compressed canonical JSON document
    pub payload: Vec<u8>,
    /// base64url HMAC-SHA-256 over `payload`
    pub signature: String,
    /// Lowercase hex SHA-256 of `payload`
    pub checksum: String,
    /// Length of `payload` in bytes
    pub size: usize,
}

/// Abbreviate a ticket type: initials for multi-word names, otherwise the
/// first three characters, uppercased. `"General Admission"` → `"GA"`,
/// `"VIP"` → `"VIP"`, `"Student"` → `"STU"`.
#[must_use]
pub fn abbreviate_type(ticket_type: &str) -> String {
    let words: Vec<&str> = ticket_type.split_whitespace().collect();
    if words.len() > 1 {
        words
            .iter()
            .filter_map(|w| w.chars().next())
            .flat_map(char::to_uppercase)
            .collect()
    } else {
        ticket_type
            .trim()
            .chars()
            .take(3)
            .flat_map(char::to_uppercase)
            .collect()
    }
}

/// Project the scan-eligible tickets of `event` into a manifest document.
///
/// Tickets lazily expired at `generated_at` are left out along with used and
/// cancelled ones, as are tickets of other events.
#[must_use]
pub fn project(
    event: &EventSecurityConfig,
    tickets: &[Ticket],
    generated_at: DateTime<Utc>,
) -> ManifestDocument {
    let mut entries: Vec<ManifestEntry> = tickets
        .iter()
        .filter(|t| t.event_id == event.id)
        .filter_map(|t| {
            let status = match t.effective_status(generated_at) {
                TicketStatusKind::Valid => StatusCode::Valid,
                TicketStatusKind::Transferred => StatusCode::Transferred,
                _ => return None,
            };
            Some(ManifestEntry {
                ticket_class: TicketClass::of(&t.ticket_type),
                ticket_hash: signer::ticket_hash(&t.id, &t.ticket_code, &event.id, &event.secret),
                ticket_id: t.id,
                holder_name: t.holder.name.clone(),
                status,
                type_abbrev: abbreviate_type(&t.ticket_type),
            })
        })
        .collect();
    entries.sort_by(|a, b| a.ticket_hash.cmp(&b.ticket_hash));

    ManifestDocument {
        entries,
        event: ManifestEvent {
            check_in_enabled: event.check_in_enabled,
            closes_at: event.closes_at,
            ends_at: event.ends_at,
            gates: event.gates.iter().cloned().collect(),
            id: event.id,
            name: event.name.clone(),
            opens_at: event.opens_at,
            starts_at: event.starts_at,
            vip_gates: event.vip_gates.iter().cloned().collect(),
        },
        generated_at,
        version: MANIFEST_VERSION,
    }
}

/// Compress, checksum and sign a document.
///
/// # Errors
///
/// Returns [`ManifestError::Layout`] if the document cannot be serialized and
/// [`ManifestError::Compression`] if compression fails.
pub fn seal(
    document: &ManifestDocument,
    secret: &SigningSecret,
) -> Result<ManifestBlob, ManifestError> {
    let json = serde_json::to_vec(document).map_err(|e| ManifestError::Layout(e.to_string()))?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| ManifestError::Compression(e.to_string()))?;
    let payload = encoder
        .finish()
        .map_err(|e| ManifestError::Compression(e.to_string()))?;

    Ok(ManifestBlob {
        signature: signer::sign(&payload, secret).to_base64(),
        checksum: checksum(&payload),
        size: payload.len(),
        payload,
    })
}

/// Verify and decompress a blob: size, then checksum, then signature, then
/// layout. Nothing is decompressed before the integrity checks pass.
///
/// # Errors
///
/// The first failing check, as a [`ManifestError`].
pub fn open(blob: &ManifestBlob, secret: &SigningSecret) -> Result<ManifestDocument, ManifestError> {
    if blob.size != blob.payload.len() {
        return Err(ManifestError::SizeMismatch {
            declared: blob.size,
            actual: blob.payload.len(),
        });
    }
    if !constant_time_eq::constant_time_eq(checksum(&blob.payload).as_bytes(), blob.checksum.as_bytes()) {
        return Err(ManifestError::ChecksumMismatch);
    }
    let signature = URL_SAFE_NO_PAD
        .decode(&blob.signature)
        .map_err(|_| ManifestError::BadSignature)?;
    if !signer::verify(&blob.payload, &signature, secret) {
        return Err(ManifestError::BadSignature);
    }

    let mut json = Vec::new();
    ZlibDecoder::new(blob.payload.as_slice())
        .read_to_end(&mut json)
        .map_err(|e| ManifestError::Compression(e.to_string()))?;
    let document: ManifestDocument =
        serde_json::from_slice(&json).map_err(|e| ManifestError::Layout(e.to_string()))?;
    if document.version != MANIFEST_VERSION {
        return Err(ManifestError::UnsupportedVersion(document.version));
    }
    Ok(document)
}

/// Lowercase hex SHA-256.
#[must_use]
pub fn checksum(payload: &[u8]) -> String {
    format!("{:x}", Sha256::digest(payload))
}
