//! Validator behavior: verdict ordering, fraud signals, gates and windows.

#![allow(clippy::expect_used, clippy::panic)]

mod common;

use chrono::Duration;
use common::Harness;
use turnstile_core::verdict::{EventWindowViolation, TicketWindowViolation};
use turnstile_core::{
    CheckInFacts, GateId, OutcomeKind, RejectionReason, TicketStatus, TicketStatusKind, Verdict,
};
use turnstile_runtime::{TicketAdmin, Validator};
use turnstile_testing::{EventBuilder, at, other_secret};

fn rejection(verdict: Verdict) -> RejectionReason {
    match verdict {
        Verdict::Rejected(reason) => reason,
        Verdict::Admitted(summary) => panic!("expected rejection, admitted {summary:?}"),
    }
}

#[tokio::test]
async fn valid_token_is_admitted_with_summary() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t.holder("Grace Hopper", "grace@example.com"));
    let token = h.token_for(&ticket);

    let verdict = Validator::new(h.env.clone())
        .validate(&token, Some(&GateId::new("north-1")))
        .await
        .expect("validate");

    let Verdict::Admitted(summary) = verdict else {
        panic!("expected admission, got {verdict:?}");
    };
    assert_eq!(summary.ticket_id, ticket.id);
    assert_eq!(summary.holder_name, "Grace Hopper");
    assert_eq!(summary.event_name, h.event.name);
    assert_eq!(summary.status, TicketStatusKind::Valid);
    // Validation never writes.
    assert_eq!(h.stored(&ticket).version, ticket.version);
}

#[tokio::test]
async fn forged_signature_is_a_fraud_signal_and_audited() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t);
    let forged = h.token_with(&ticket, &other_secret());

    let verdict = Validator::new(h.env.clone())
        .validate(&forged, None)
        .await
        .expect("validate");

    let reason = rejection(verdict);
    assert_eq!(reason, RejectionReason::BadSignature);
    assert!(reason.is_fraud_signal());
    assert_eq!(h.audit.count(OutcomeKind::BadSignature), 1);
    let audited = &h.audit.events()[0];
    assert_eq!(audited.ticket_id, ticket.id);
    assert_eq!(audited.actor_id, None);
}

#[tokio::test]
async fn garbage_is_malformed() {
    let h = Harness::new();
    let validator = Validator::new(h.env.clone());

    for token in ["", "not a token", "bm90LWEtdG9rZW4", "%%%"] {
        let verdict = validator.validate(token, None).await.expect("validate");
        assert_eq!(rejection(verdict), RejectionReason::Malformed, "token {token:?}");
    }
    assert!(h.audit.events().is_empty());
}

#[tokio::test]
async fn unknown_ticket_and_unknown_event_are_not_found() {
    let h = Harness::new();
    let unsaved = turnstile_testing::TicketBuilder::for_event(&h.event).build();
    let validator = Validator::new(h.env.clone());

    let verdict = validator
        .validate(&h.token_for(&unsaved), None)
        .await
        .expect("validate");
    assert_eq!(rejection(verdict), RejectionReason::NotFound);

    let elsewhere = EventBuilder::new().build();
    let foreign = turnstile_testing::TicketBuilder::for_event(&elsewhere).build();
    h.tickets.insert(foreign.clone());
    let verdict = validator
        .validate(&h.token_for(&foreign), None)
        .await
        .expect("validate");
    assert_eq!(rejection(verdict), RejectionReason::NotFound);
}

#[tokio::test]
async fn expired_token_is_rejected_even_for_a_valid_ticket() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t);
    let token = h.token_for(&ticket);

    h.clock.advance(Duration::hours(6));
    let verdict = Validator::new(h.env.clone())
        .validate(&token, None)
        .await
        .expect("validate");

    assert!(matches!(rejection(verdict), RejectionReason::Expired { .. }));
}

#[tokio::test]
async fn expired_token_reports_expiry_for_used_and_transferred_tickets() {
    let h = Harness::new();
    let used = h.add_ticket(|t| {
        t.status(TicketStatus::Used(CheckInFacts {
            used_at: at("2025-06-01T19:10:00Z"),
            used_by: common::actor(),
            gate: None,
            device: None,
        }))
    });
    let moved = h.add_ticket(|t| t);
    let used_token = h.token_for(&used);
    let moved_token = h.token_for(&moved);

    TicketAdmin::new(h.env.clone())
        .transfer(
            moved.id,
            turnstile_core::Holder::new("Dorothy Vaughan", "dv@example.com"),
            None,
        )
        .await
        .expect("transfer");

    h.clock.advance(Duration::hours(7));
    let validator = Validator::new(h.env.clone());
    for token in [used_token, moved_token] {
        let verdict = validator.validate(&token, None).await.expect("validate");
        assert!(matches!(rejection(verdict), RejectionReason::Expired { .. }));
    }
}

#[tokio::test]
async fn used_ticket_reports_the_original_check_in() {
    let h = Harness::new();
    let facts = CheckInFacts {
        used_at: at("2025-06-01T19:10:00Z"),
        used_by: common::actor(),
        gate: Some(GateId::new("south-1")),
        device: None,
    };
    let ticket = h.add_ticket(|t| t.status(TicketStatus::Used(facts.clone())));

    let verdict = Validator::new(h.env.clone())
        .validate(&h.token_for(&ticket), None)
        .await
        .expect("validate");

    assert_eq!(rejection(verdict), RejectionReason::AlreadyUsed(facts));
}

#[tokio::test]
async fn cancelled_ticket_is_rejected() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t.status(TicketStatus::Cancelled));

    let verdict = Validator::new(h.env.clone())
        .validate(&h.token_for(&ticket), None)
        .await
        .expect("validate");

    assert_eq!(rejection(verdict), RejectionReason::Cancelled);
}

#[tokio::test]
async fn vip_gate_admits_only_vip_tickets() {
    let h = Harness::new();
    let general = h.add_ticket(|t| t);
    let vip = h.add_ticket(|t| t.ticket_type("VIP Lounge"));
    let vip_gate = GateId::new("vip-1");
    let validator = Validator::new(h.env.clone());

    let verdict = validator
        .validate(&h.token_for(&general), Some(&vip_gate))
        .await
        .expect("validate");
    assert_eq!(
        rejection(verdict),
        RejectionReason::GateNotAuthorized {
            gate: vip_gate.clone()
        }
    );

    let verdict = validator
        .validate(&h.token_for(&vip), Some(&vip_gate))
        .await
        .expect("validate");
    assert!(verdict.is_admitted());

    // VIP tickets may still use general gates.
    let verdict = validator
        .validate(&h.token_for(&vip), Some(&GateId::new("north-1")))
        .await
        .expect("validate");
    assert!(verdict.is_admitted());
}

#[tokio::test]
async fn unknown_gate_is_not_authorized() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t);

    let verdict = Validator::new(h.env.clone())
        .validate(&h.token_for(&ticket), Some(&GateId::new("loading-dock")))
        .await
        .expect("validate");

    assert!(matches!(
        rejection(verdict),
        RejectionReason::GateNotAuthorized { .. }
    ));
}

#[tokio::test]
async fn event_and_ticket_windows_are_enforced() {
    let disabled = Harness::with_event(EventBuilder::new().check_in_enabled(false).build());
    let ticket = disabled.add_ticket(|t| t);
    let verdict = Validator::new(disabled.env.clone())
        .validate(&disabled.token_for(&ticket), None)
        .await
        .expect("validate");
    assert_eq!(
        rejection(verdict),
        RejectionReason::EventWindow(EventWindowViolation::CheckInDisabled)
    );

    let closed = Harness::with_event(
        EventBuilder::new()
            .window(None, Some(at("2025-06-01T19:00:00Z")))
            .build(),
    );
    let ticket = closed.add_ticket(|t| t);
    let verdict = Validator::new(closed.env.clone())
        .validate(&closed.token_for(&ticket), None)
        .await
        .expect("validate");
    assert!(matches!(
        rejection(verdict),
        RejectionReason::EventWindow(EventWindowViolation::Closed { .. })
    ));

    let h = Harness::new();
    let lapsed = h.add_ticket(|t| {
        t.valid_between(at("2025-05-01T00:00:00Z"), Some(at("2025-06-01T19:00:00Z")))
    });
    let verdict = Validator::new(h.env.clone())
        .validate(&h.token_for(&lapsed), None)
        .await
        .expect("validate");
    assert!(matches!(
        rejection(verdict),
        RejectionReason::TicketWindow(TicketWindowViolation::Lapsed { .. })
    ));
}

#[tokio::test]
async fn scans_before_the_admission_lead_time_are_too_early() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t);
    h.clock.set(at("2025-06-01T17:00:00Z"));

    let verdict = Validator::new(h.env.clone())
        .validate(&h.token_for(&ticket), None)
        .await
        .expect("validate");

    assert!(matches!(
        rejection(verdict),
        RejectionReason::EventWindow(EventWindowViolation::TooEarly { .. })
    ));
}

#[tokio::test]
async fn transfer_invalidates_the_previous_holders_token() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t);
    let old_token = h.token_for(&ticket);

    let transferred = TicketAdmin::new(h.env.clone())
        .transfer(
            ticket.id,
            turnstile_core::Holder::new("Katherine Johnson", "kj@example.com"),
            Some("gift".to_string()),
        )
        .await
        .expect("transfer");
    assert_eq!(transferred.status.kind(), TicketStatusKind::Transferred);
    assert_ne!(transferred.ticket_code, ticket.ticket_code);

    let validator = Validator::new(h.env.clone());
    let verdict = validator.validate(&old_token, None).await.expect("validate");
    assert_eq!(rejection(verdict), RejectionReason::NotFound);

    let verdict = validator
        .validate(&h.token_for(&transferred), None)
        .await
        .expect("validate");
    let Verdict::Admitted(summary) = verdict else {
        panic!("new holder should be admitted, got {verdict:?}");
    };
    assert_eq!(summary.holder_name, "Katherine Johnson");
    assert_eq!(summary.status, TicketStatusKind::Transferred);
}
