//! The token codec: what goes into a QR code.
//!
//! Layout, outermost first:
//!
//! ```text
//! base64url_nopad( canonical_json(claims) "." base64url_nopad(hmac_sha256) )
//! ```
//!
//! Canonical JSON is compact with lexicographically sorted keys and Unix-second
//! timestamps. Decoding never trusts anything: [`decode`] yields an
//! [`UnverifiedToken`], and only [`UnverifiedToken::verify`] produces
//! [`VerifiedClaims`].

use crate::ids::{EventId, TicketId};
use crate::signer::{self, SIGNATURE_LEN, SigningSecret};
use crate::ticket::Ticket;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use thiserror::Error;

/// Separator between the payload and the signature inside the outer base64.
pub const SEPARATOR: u8 = b'.';

/// Number of random bytes in a nonce.
pub const NONCE_LEN: usize = 16;

/// Decode and verification failures.
///
/// `Base64` and `Structure` are both reported to callers as a malformed
/// token; `BadSignature` is a fraud signal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The outer transport encoding is not base64url.
    #[error("token is not valid base64url")]
    Base64,

    /// The decoded bytes do not have the expected shape.
    #[error("malformed token structure: {0}")]
    Structure(String),

    /// The signature does not match the payload under the given secret.
    #[error("token signature does not verify")]
    BadSignature,
}

/// Per-token random value. Two tokens for the same ticket never share one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    /// Generate a fresh nonce from [`NONCE_LEN`] random bytes.
    #[must_use]
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wrap an existing nonce string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The encoded nonce.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The facts a token asserts about a ticket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenClaims {
    /// Ticket the token admits
    pub ticket_id: TicketId,
    /// Event the ticket belongs to
    pub event_id: EventId,
    /// Ticket code at issuance; stale after a transfer
    pub ticket_code: String,
    /// Ticket type name
    pub ticket_type: String,
    /// Issuance time (second precision)
    pub issued_at: DateTime<Utc>,
    /// Token expiry (second precision), independent of the ticket window
    pub expires_at: DateTime<Utc>,
    /// Replay-detection nonce
    pub nonce: Nonce,
}

impl TokenClaims {
    /// Claims for a fresh token for `ticket`, valid for `ttl` from `issued_at`.
    ///
    /// Timestamps are truncated to whole seconds, the precision of the wire
    /// form, so claims compare equal after a round trip. Expiry saturates at
    /// the latest representable instant.
    #[must_use]
    pub fn for_ticket(ticket: &Ticket, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        let issued_at = truncate_to_seconds(issued_at);
        Self {
            ticket_id: ticket.id,
            event_id: ticket.event_id,
            ticket_code: ticket.ticket_code.clone(),
            ticket_type: ticket.ticket_type.clone(),
            issued_at,
            expires_at: truncate_to_seconds(
                issued_at
                    .checked_add_signed(ttl)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ),
            nonce: Nonce::generate(),
        }
    }

    /// Whether the token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The canonical byte form the signature is computed over.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let wire = WireClaims::from(self);
        // A struct of strings and integers always serializes.
        serde_json::to_vec(&wire).unwrap_or_default()
    }
}

/// Wire form. Fields are declared in lexicographic order; serde_json emits
/// struct fields in declaration order, which makes this the canonical order.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireClaims {
    event_id: EventId,
    expires_at: i64,
    issued_at: i64,
    nonce: Nonce,
    ticket_code: String,
    ticket_id: TicketId,
    ticket_type: String,
}

impl From<&TokenClaims> for WireClaims {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            event_id: claims.event_id,
            expires_at: claims.expires_at.timestamp(),
            issued_at: claims.issued_at.timestamp(),
            nonce: claims.nonce.clone(),
            ticket_code: claims.ticket_code.clone(),
            ticket_id: claims.ticket_id,
            ticket_type: claims.ticket_type.clone(),
        }
    }
}

impl TryFrom<WireClaims> for TokenClaims {
    type Error = TokenError;

    fn try_from(wire: WireClaims) -> Result<Self, Self::Error> {
        let ts = |secs: i64, field: &str| {
            DateTime::<Utc>::from_timestamp(secs, 0)
                .ok_or_else(|| TokenError::Structure(format!("{field} out of range")))
        };
        Ok(Self {
            ticket_id: wire.ticket_id,
            event_id: wire.event_id,
            ticket_code: wire.ticket_code,
            ticket_type: wire.ticket_type,
            issued_at: ts(wire.issued_at, "issued_at")?,
            expires_at: ts(wire.expires_at, "expires_at")?,
            nonce: wire.nonce,
        })
    }
}

/// Sign `claims` with the event secret and produce the QR string.
#[must_use]
pub fn encode(claims: &TokenClaims, secret: &SigningSecret) -> String {
    let payload = claims.canonical_bytes();
    let signature = signer::sign(&payload, secret).to_base64();

    let mut inner = payload;
    inner.push(SEPARATOR);
    inner.extend_from_slice(signature.as_bytes());
    URL_SAFE_NO_PAD.encode(inner)
}

/// A structurally valid token whose signature has not been checked.
///
/// The claims may be peeked at to locate the ticket and event, but nothing
/// in them is trustworthy until [`verify`](Self::verify) succeeds.
#[derive(Clone, Debug)]
pub struct UnverifiedToken {
    claims: TokenClaims,
    signature: Vec<u8>,
}

impl UnverifiedToken {
    /// Untrusted claims, for lookup only.
    #[must_use]
    pub const fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// Check the signature over the canonical form of the claims.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::BadSignature`] when the signature was not
    /// produced by `secret` over these claims.
    pub fn verify(self, secret: &SigningSecret) -> Result<VerifiedClaims, TokenError> {
        let payload = self.claims.canonical_bytes();
        if signer::verify(&payload, &self.signature, secret) {
            Ok(VerifiedClaims(self.claims))
        } else {
            Err(TokenError::BadSignature)
        }
    }
}

/// Claims whose signature has been verified against the event secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedClaims(TokenClaims);

impl VerifiedClaims {
    /// Unwrap into the plain claims.
    #[must_use]
    pub fn into_inner(self) -> TokenClaims {
        self.0
    }
}

impl Deref for VerifiedClaims {
    type Target = TokenClaims;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Decode a QR string into an unverified token.
///
/// # Errors
///
/// [`TokenError::Base64`] when the transport encoding is wrong,
/// [`TokenError::Structure`] when the payload or signature is malformed.
pub fn decode(token: &str) -> Result<UnverifiedToken, TokenError> {
    let inner = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| TokenError::Base64)?;

    let split = inner
        .iter()
        .rposition(|b| *b == SEPARATOR)
        .ok_or_else(|| TokenError::Structure("missing signature separator".to_string()))?;
    let (payload, signature) = (&inner[..split], &inner[split + 1..]);

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenError::Structure("signature is not base64url".to_string()))?;
    if signature.len() != SIGNATURE_LEN {
        return Err(TokenError::Structure(format!(
            "signature must be {SIGNATURE_LEN} bytes, got {}",
            signature.len()
        )));
    }

    let wire: WireClaims =
        serde_json::from_slice(payload).map_err(|e| TokenError::Structure(e.to_string()))?;

    Ok(UnverifiedToken {
        claims: TokenClaims::try_from(wire)?,
        signature,
    })
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(seed: u8) -> SigningSecret {
        SigningSecret::new(vec![seed; 32]).unwrap()
    }

    fn claims() -> TokenClaims {
        TokenClaims {
            ticket_id: TicketId::new(),
            event_id: EventId::new(),
            ticket_code: "K7Q2M9XP".to_string(),
            ticket_type: "General Admission".to_string(),
            issued_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            expires_at: DateTime::<Utc>::from_timestamp(1_700_021_600, 0).unwrap(),
            nonce: Nonce::generate(),
        }
    }

    #[test]
    fn encode_decode_verify_round_trip() {
        let original = claims();
        let token = encode(&original, &secret(1));
        let verified = decode(&token).unwrap().verify(&secret(1)).unwrap();
        assert_eq!(verified.into_inner(), original);
    }

    #[test]
    fn canonical_form_has_sorted_keys() {
        let bytes = claims().canonical_bytes();
        let text = String::from_utf8(bytes).unwrap();
        let keys = [
            "\"event_id\"",
            "\"expires_at\"",
            "\"issued_at\"",
            "\"nonce\"",
            "\"ticket_code\"",
            "\"ticket_id\"",
            "\"ticket_type\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|k| text.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{text}");
    }

    #[test]
    fn verification_is_independent_of_received_key_order() {
        let original = claims();
        let sig = signer::sign(&original.canonical_bytes(), &secret(1)).to_base64();
        let reordered = format!(
            r#"{{"ticket_type":"{}","ticket_id":"{}","ticket_code":"{}","nonce":"{}","issued_at":{},"expires_at":{},"event_id":"{}"}}.{}"#,
            original.ticket_type,
            original.ticket_id,
            original.ticket_code,
            original.nonce,
            original.issued_at.timestamp(),
            original.expires_at.timestamp(),
            original.event_id,
            sig
        );
        let token = URL_SAFE_NO_PAD.encode(reordered);
        assert!(decode(&token).unwrap().verify(&secret(1)).is_ok());
    }

    #[test]
    fn distinguishes_base64_from_structure_failures() {
        assert_eq!(decode("not base64 !!").unwrap_err(), TokenError::Base64);

        let no_separator = URL_SAFE_NO_PAD.encode(b"{}");
        assert!(matches!(
            decode(&no_separator),
            Err(TokenError::Structure(_))
        ));

        let bad_json = URL_SAFE_NO_PAD.encode(format!(
            "{{\"x\":1}}.{}",
            URL_SAFE_NO_PAD.encode([0u8; 32])
        ));
        assert!(matches!(decode(&bad_json), Err(TokenError::Structure(_))));
    }

    #[test]
    fn wrong_secret_is_bad_signature() {
        let token = encode(&claims(), &secret(1));
        assert_eq!(
            decode(&token).unwrap().verify(&secret(2)).unwrap_err(),
            TokenError::BadSignature
        );
    }

    #[test]
    fn tampered_claims_fail_verification() {
        let token = encode(&claims(), &secret(1));
        let mut inner = URL_SAFE_NO_PAD.decode(&token).unwrap();
        let text = String::from_utf8(inner.clone()).unwrap();
        let pos = text.find("General").unwrap();
        inner[pos] = b'g';
        let tampered = URL_SAFE_NO_PAD.encode(inner);
        assert_eq!(
            decode(&tampered).unwrap().verify(&secret(1)).unwrap_err(),
            TokenError::BadSignature
        );
    }

    #[test]
    fn nonces_differ() {
        assert_ne!(Nonce::generate(), Nonce::generate());
    }

    #[test]
    fn expiry_is_inclusive_of_the_deadline() {
        let c = claims();
        assert!(!c.is_expired_at(c.expires_at - Duration::seconds(1)));
        assert!(c.is_expired_at(c.expires_at));
    }
}
