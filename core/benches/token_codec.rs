//! Token codec benchmarks
//!
//! Scan latency is dominated by storage round trips; these numbers confirm
//! that decode + verify stays in the low microseconds.
//!
//! Run with: `cargo bench -p turnstile-core`

#![allow(missing_docs)]
#![allow(clippy::expect_used)]

use chrono::{Duration, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use turnstile_core::signer::{self, SigningSecret};
use turnstile_core::token::{self, Nonce, TokenClaims};
use turnstile_core::{EventId, TicketId};

fn claims() -> TokenClaims {
    let issued_at = Utc::now();
    TokenClaims {
        ticket_id: TicketId::new(),
        event_id: EventId::new(),
        ticket_code: "K7Q2M9XPAB".to_string(),
        ticket_type: "General Admission".to_string(),
        issued_at,
        expires_at: issued_at + Duration::hours(6),
        nonce: Nonce::generate(),
    }
}

fn bench_encode(c: &mut Criterion) {
    let secret = SigningSecret::generate();
    let claims = claims();
    c.bench_function("token_encode", |b| {
        b.iter(|| token::encode(black_box(&claims), black_box(&secret)));
    });
}

fn bench_decode_verify(c: &mut Criterion) {
    let secret = SigningSecret::generate();
    let encoded = token::encode(&claims(), &secret);
    c.bench_function("token_decode_verify", |b| {
        b.iter(|| {
            token::decode(black_box(&encoded))
                .expect("decodes")
                .verify(black_box(&secret))
                .expect("verifies")
        });
    });
}

fn bench_ticket_hash(c: &mut Criterion) {
    let secret = SigningSecret::generate();
    let ticket = TicketId::new();
    let event = EventId::new();
    c.bench_function("ticket_hash", |b| {
        b.iter(|| signer::ticket_hash(black_box(&ticket), "K7Q2M9XPAB", black_box(&event), &secret));
    });
}

criterion_group!(benches, bench_encode, bench_decode_verify, bench_ticket_hash);
criterion_main!(benches);
