//! Keyed signatures over token and manifest payloads.
//!
//! HMAC-SHA-256 with an event-scoped secret. The secret is passed explicitly
//! on every call; there is no process-wide signing key. Verification compares
//! in constant time.

use crate::ids::{EventId, TicketId};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::fmt::Write as _;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// Length of the short ticket hash in hex characters (64 bits).
pub const TICKET_HASH_LEN: usize = 16;

/// Length of an HMAC-SHA-256 tag in bytes.
pub const SIGNATURE_LEN: usize = 32;

/// Errors raised by secret handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    /// The event has no usable secret configured.
    #[error("signing secret is missing")]
    MissingSecret,

    /// The configured secret is too short to be safe.
    #[error("signing secret must be at least {min} bytes, got {actual}")]
    SecretTooShort {
        /// Minimum length
        min: usize,
        /// Provided length
        actual: usize,
    },

    /// The secret is not valid base64.
    #[error("signing secret is not valid base64")]
    InvalidEncoding,
}

/// Event-scoped signing key.
///
/// `Debug` never prints the key material and there is no `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    /// Wrap raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::MissingSecret`] for an empty key and
    /// [`SigningError::SecretTooShort`] below [`MIN_SECRET_LEN`] bytes.
    pub fn new(bytes: Vec<u8>) -> Result<Self, SigningError> {
        match bytes.len() {
            0 => Err(SigningError::MissingSecret),
            n if n < MIN_SECRET_LEN => Err(SigningError::SecretTooShort {
                min: MIN_SECRET_LEN,
                actual: n,
            }),
            _ => Ok(Self(bytes)),
        }
    }

    /// Parse a base64url (unpadded) encoded key, the form used in configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidEncoding`] for bad base64, otherwise the
    /// same errors as [`SigningSecret::new`].
    pub fn from_base64(encoded: &str) -> Result<Self, SigningError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|_| SigningError::InvalidEncoding)?;
        Self::new(bytes)
    }

    /// Generate a fresh random 32-byte secret.
    #[must_use]
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Raw key bytes, for persistence by the event directory.
    #[must_use]
    pub fn expose_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Keyed MAC state. The key is normalized to one block the way HMAC
    /// defines it: hashed when longer than a block, then zero-padded.
    fn mac(&self) -> HmacSha256 {
        let mut block = Key::<HmacSha256>::default();
        if self.0.len() > block.len() {
            let digest = <Sha256 as sha2::Digest>::digest(&self.0);
            block[..digest.len()].copy_from_slice(&digest);
        } else {
            block[..self.0.len()].copy_from_slice(&self.0);
        }
        <HmacSha256 as KeyInit>::new(&block)
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// A detached HMAC-SHA-256 signature.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    /// Signature bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Encode as unpadded base64url (43 characters).
    #[must_use]
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }
}

/// Sign `payload` with `secret`.
#[must_use]
pub fn sign(payload: &[u8], secret: &SigningSecret) -> Signature {
    let mut mac = secret.mac();
    mac.update(payload);
    let mut out = [0u8; SIGNATURE_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Signature(out)
}

/// Verify a signature over `payload`.
///
/// Accepts any byte slice as the candidate signature so callers never need
/// to pre-validate its length; a wrong length simply fails. The comparison
/// is constant-time.
#[must_use]
pub fn verify(payload: &[u8], signature: &[u8], secret: &SigningSecret) -> bool {
    let expected = sign(payload, secret);
    constant_time_eq::constant_time_eq(expected.as_bytes(), signature)
}

/// Short one-way ticket hash used by offline manifests and printed short codes.
///
/// Keyed with the event secret so the set of valid hashes cannot be
/// enumerated without it. Truncated to [`TICKET_HASH_LEN`] hex characters;
/// collisions are possible in principle and accepted for compactness.
#[must_use]
pub fn ticket_hash(
    ticket_id: &TicketId,
    ticket_code: &str,
    event_id: &EventId,
    secret: &SigningSecret,
) -> String {
    let material = format!("{ticket_id}:{ticket_code}:{event_id}");
    let tag = sign(material.as_bytes(), secret);
    let mut out = String::with_capacity(TICKET_HASH_LEN);
    for byte in &tag.as_bytes()[..TICKET_HASH_LEN / 2] {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
