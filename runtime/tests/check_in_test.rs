//! Check-in coordinator: at-most-once commits, duplicate absorption, conflict
//! reporting and behavior under concurrency.

#![allow(clippy::expect_used, clippy::panic)]

mod common;

use chrono::Duration;
use common::{Harness, actor};
use futures::future::join_all;
use std::sync::Arc;
use turnstile_core::{
    CheckInFacts, CheckInOutcome, OutcomeKind, RejectionReason, TicketStatus, TicketStatusKind,
};
use turnstile_runtime::{
    CheckInCoordinator, CheckInRequest, ScanPolicy, TicketAdmin, TurnstileError,
};
use turnstile_testing::{EventBuilder, at};

#[tokio::test]
async fn first_check_in_commits_facts_and_counts() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t);
    let staff = actor();

    let outcome = CheckInCoordinator::new(h.env.clone())
        .check_in(
            CheckInRequest::new(ticket.id, staff)
                .at_gate("north-1")
                .from_device("scanner-7"),
        )
        .await
        .expect("check in");

    let CheckInOutcome::CheckedIn {
        facts, duplicate, ..
    } = outcome
    else {
        panic!("expected check-in, got {outcome:?}");
    };
    assert!(!duplicate);
    assert_eq!(facts.used_by, staff);
    assert_eq!(facts.used_at, h.now());

    let stored = h.stored(&ticket);
    assert_eq!(stored.version, ticket.version.next());
    assert_eq!(stored.check_in_facts(), Some(&facts));
    assert_eq!(h.events.scanned_count(h.event.id), 1);
    assert_eq!(h.audit.count(OutcomeKind::CheckedIn), 1);
}

#[tokio::test]
async fn same_actor_repeat_inside_window_is_a_duplicate_success() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t);
    let staff = actor();
    let coordinator = CheckInCoordinator::new(h.env.clone());

    let first = coordinator
        .check_in(CheckInRequest::new(ticket.id, staff))
        .await
        .expect("first");
    h.clock.advance(Duration::minutes(2));
    let second = coordinator
        .check_in(CheckInRequest::new(ticket.id, staff))
        .await
        .expect("second");

    assert!(first.is_success() && !first.is_duplicate());
    assert!(second.is_success() && second.is_duplicate());
    // One transition, one count.
    assert_eq!(h.stored(&ticket).version, ticket.version.next());
    assert_eq!(h.events.scanned_count(h.event.id), 1);
    assert_eq!(h.audit.count(OutcomeKind::Duplicate), 1);
}

#[tokio::test]
async fn same_actor_outside_window_is_already_used() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t);
    let staff = actor();
    let coordinator = CheckInCoordinator::new(h.env.clone());

    coordinator
        .check_in(CheckInRequest::new(ticket.id, staff))
        .await
        .expect("first");
    h.clock.advance(Duration::minutes(10));
    let outcome = coordinator
        .check_in(CheckInRequest::new(ticket.id, staff))
        .await
        .expect("second");

    assert!(matches!(
        outcome,
        CheckInOutcome::Rejected(RejectionReason::AlreadyUsed(_))
    ));
}

#[tokio::test]
async fn different_actor_gets_the_original_facts() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t);
    let (first_staff, second_staff) = (actor(), actor());
    let coordinator = CheckInCoordinator::new(h.env.clone());

    coordinator
        .check_in(CheckInRequest::new(ticket.id, first_staff).at_gate("south-1"))
        .await
        .expect("first");
    let outcome = coordinator
        .check_in(CheckInRequest::new(ticket.id, second_staff).at_gate("north-1"))
        .await
        .expect("second");

    let CheckInOutcome::Rejected(RejectionReason::AlreadyUsed(facts)) = outcome else {
        panic!("expected conflict, got {outcome:?}");
    };
    assert_eq!(facts.used_by, first_staff);
    assert_eq!(facts.gate.as_ref().map(|g| g.as_str()), Some("south-1"));
    assert_eq!(h.audit.count(OutcomeKind::Conflict), 1);
}

#[tokio::test]
async fn unknown_ticket_is_not_found() {
    let h = Harness::new();
    let unsaved = turnstile_testing::TicketBuilder::for_event(&h.event).build();

    let outcome = CheckInCoordinator::new(h.env.clone())
        .check_in(CheckInRequest::new(unsaved.id, actor()))
        .await
        .expect("check in");

    assert_eq!(outcome, CheckInOutcome::Rejected(RejectionReason::NotFound));
}

#[tokio::test]
async fn cancelled_and_disabled_tickets_never_transition() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t);
    TicketAdmin::new(h.env.clone())
        .cancel(ticket.id, None, Some("refund".to_string()))
        .await
        .expect("cancel");

    let outcome = CheckInCoordinator::new(h.env.clone())
        .check_in(CheckInRequest::new(ticket.id, actor()))
        .await
        .expect("check in");
    assert_eq!(outcome, CheckInOutcome::Rejected(RejectionReason::Cancelled));
    assert_eq!(h.stored(&ticket).status, TicketStatus::Cancelled);

    let disabled = Harness::with_event(EventBuilder::new().check_in_enabled(false).build());
    let ticket = disabled.add_ticket(|t| t);
    let outcome = CheckInCoordinator::new(disabled.env.clone())
        .check_in(CheckInRequest::new(ticket.id, actor()))
        .await
        .expect("check in");
    assert!(!outcome.is_success());
    assert_eq!(disabled.stored(&ticket).status, TicketStatus::Valid);
}

#[tokio::test]
async fn lapsed_tickets_never_succeed() {
    let h = Harness::new();
    let until = at("2025-06-01T21:00:00Z");
    let ticket = h.add_ticket(|t| t.valid_between(at("2025-05-01T00:00:00Z"), Some(until)));
    let coordinator = CheckInCoordinator::new(h.env.clone());

    for offset in [1, 30, 90] {
        h.clock.set(until + Duration::minutes(offset));
        let outcome = coordinator
            .check_in(CheckInRequest::new(ticket.id, actor()))
            .await
            .expect("check in");
        assert!(!outcome.is_success(), "succeeded {offset} minutes after expiry");
    }
    assert_eq!(
        h.stored(&ticket).effective_status(h.now()),
        TicketStatusKind::Expired
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_actors_produce_exactly_one_success() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t);
    let coordinator = Arc::new(CheckInCoordinator::new(h.env.clone()));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let request = CheckInRequest::new(ticket.id, actor());
            tokio::spawn(async move { coordinator.check_in(request).await })
        })
        .collect();

    let outcomes: Vec<CheckInOutcome> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task").expect("check in"))
        .collect();

    let successes = outcomes.iter().filter(|o| o.is_success()).count();
    let winner = h.stored(&ticket).check_in_facts().cloned().expect("used");
    let conflicts: Vec<&CheckInFacts> = outcomes
        .iter()
        .filter_map(|o| match o {
            CheckInOutcome::Rejected(RejectionReason::AlreadyUsed(facts)) => Some(facts),
            _ => None,
        })
        .collect();
    assert_eq!(successes, 1);
    assert_eq!(conflicts.len(), 31);
    for facts in conflicts {
        assert_eq!(facts, &winner);
    }
    assert_eq!(h.stored(&ticket).version, ticket.version.next());
    assert_eq!(h.events.scanned_count(h.event.id), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_retries_by_one_actor_are_idempotent() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t);
    let staff = actor();
    let coordinator = Arc::new(CheckInCoordinator::new(h.env.clone()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let request = CheckInRequest::new(ticket.id, staff).at_gate("north-1");
            tokio::spawn(async move { coordinator.check_in(request).await })
        })
        .collect();

    let outcomes: Vec<CheckInOutcome> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task").expect("check in"))
        .collect();

    assert!(outcomes.iter().all(CheckInOutcome::is_success));
    assert_eq!(outcomes.iter().filter(|o| !o.is_duplicate()).count(), 1);
    assert_eq!(h.stored(&ticket).version, ticket.version.next());
}

#[tokio::test]
async fn storage_faults_propagate_as_errors() {
    let h = Harness::new();
    let ticket = h.add_ticket(|t| t);
    h.tickets.fail_next(1);

    let err = CheckInCoordinator::new(h.env.clone())
        .check_in(CheckInRequest::new(ticket.id, actor()))
        .await
        .expect_err("fault");

    assert!(matches!(err, TurnstileError::Store(_)));
    assert!(err.is_transient());
    assert_eq!(h.stored(&ticket).status, TicketStatus::Valid);
}

#[tokio::test]
async fn replays_evaluate_rules_at_the_scan_time() {
    let policy = ScanPolicy::default();
    let h = Harness::with_event_and_policy(EventBuilder::new().build(), policy);
    let ticket = h.add_ticket(|t| t);
    let scanned_at = at("2025-06-01T20:15:00Z");

    // The event ended long ago; the scan itself happened during the event.
    h.clock.set(at("2025-06-02T09:00:00Z"));
    let outcome = CheckInCoordinator::new(h.env.clone())
        .check_in(CheckInRequest::new(ticket.id, actor()).scanned_at(scanned_at))
        .await
        .expect("check in");

    let CheckInOutcome::CheckedIn { facts, .. } = outcome else {
        panic!("expected check-in, got {outcome:?}");
    };
    assert_eq!(facts.used_at, scanned_at);
}
