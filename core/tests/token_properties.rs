//! Property-based tests for the token codec and signer.

#![allow(clippy::expect_used)]

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use turnstile_core::signer::{self, SigningSecret};
use turnstile_core::token::{self, Nonce, TokenClaims, TokenError};
use turnstile_core::{EventId, TicketId};
use uuid::Uuid;

// ============================================================================
// Custom Strategies
// ============================================================================

fn arb_uuid() -> impl Strategy<Value = Uuid> {
    any::<[u8; 16]>().prop_map(Uuid::from_bytes)
}

fn arb_time() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_000_000_000).prop_map(|s| DateTime::<Utc>::from_timestamp(s, 0).expect("in range"))
}

fn arb_secret() -> impl Strategy<Value = SigningSecret> {
    prop::collection::vec(any::<u8>(), 16..64)
        .prop_map(|bytes| SigningSecret::new(bytes).expect("long enough"))
}

fn arb_claims() -> impl Strategy<Value = TokenClaims> {
    (
        arb_uuid(),
        arb_uuid(),
        "[A-Z2-9]{6,12}",
        prop_oneof![
            Just("General Admission".to_string()),
            Just("VIP".to_string()),
            ".{0,40}",
        ],
        arb_time(),
        0i64..(30 * 24 * 3600),
        "[A-Za-z0-9_-]{22}",
    )
        .prop_map(|(ticket, event, code, ticket_type, issued_at, ttl, nonce)| TokenClaims {
            ticket_id: TicketId::from_uuid(ticket),
            event_id: EventId::from_uuid(event),
            ticket_code: code,
            ticket_type,
            issued_at,
            expires_at: issued_at + chrono::Duration::seconds(ttl),
            nonce: Nonce::new(nonce),
        })
}

// ============================================================================
// Codec Properties
// ============================================================================

proptest! {
    #[test]
    fn decode_reproduces_encoded_claims(claims in arb_claims(), secret in arb_secret()) {
        let encoded = token::encode(&claims, &secret);
        let decoded = token::decode(&encoded).expect("decodes");
        prop_assert_eq!(decoded.claims(), &claims);
        let verified = decoded.verify(&secret).expect("verifies");
        prop_assert_eq!(verified.into_inner(), claims);
    }

    #[test]
    fn signature_fails_under_any_other_secret(
        claims in arb_claims(),
        secret in arb_secret(),
        other in arb_secret(),
    ) {
        prop_assume!(secret != other);
        let encoded = token::encode(&claims, &secret);
        let result = token::decode(&encoded).expect("decodes").verify(&other);
        prop_assert_eq!(result.err(), Some(TokenError::BadSignature));
    }

    #[test]
    fn arbitrary_strings_never_verify(input in ".{0,200}", secret in arb_secret()) {
        if let Ok(unverified) = token::decode(&input) {
            prop_assert!(unverified.verify(&secret).is_err());
        }
    }

    #[test]
    fn signatures_are_deterministic(payload in prop::collection::vec(any::<u8>(), 0..256), secret in arb_secret()) {
        let a = signer::sign(&payload, &secret);
        let b = signer::sign(&payload, &secret);
        prop_assert_eq!(a, b);
        prop_assert!(signer::verify(&payload, a.as_bytes(), &secret));
    }
}
