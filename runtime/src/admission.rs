//! Admission rules shared by the validator, the coordinator and the offline
//! scanner.
//!
//! Evaluated after the token (if any) has been trusted: scan eligibility,
//! then gate authorization, then event-level timing.

use crate::policy::ScanPolicy;
use chrono::{DateTime, Utc};
use turnstile_core::lifecycle::scan_eligibility;
use turnstile_core::manifest::ManifestEvent;
use turnstile_core::verdict::EventWindowViolation;
use turnstile_core::{EventSecurityConfig, GateId, RejectionReason, Ticket};

/// The timing slice of an event, from the system of record or a manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventTiming {
    /// Master switch for check-in
    pub check_in_enabled: bool,
    /// Check-in window start
    pub opens_at: Option<DateTime<Utc>>,
    /// Check-in window end
    pub closes_at: Option<DateTime<Utc>>,
    /// Event start
    pub starts_at: DateTime<Utc>,
    /// Event end
    pub ends_at: Option<DateTime<Utc>>,
}

impl From<&EventSecurityConfig> for EventTiming {
    fn from(event: &EventSecurityConfig) -> Self {
        Self {
            check_in_enabled: event.check_in_enabled,
            opens_at: event.opens_at,
            closes_at: event.closes_at,
            starts_at: event.starts_at,
            ends_at: event.ends_at,
        }
    }
}

impl From<&ManifestEvent> for EventTiming {
    fn from(event: &ManifestEvent) -> Self {
        Self {
            check_in_enabled: event.check_in_enabled,
            opens_at: event.opens_at,
            closes_at: event.closes_at,
            starts_at: event.starts_at,
            ends_at: event.ends_at,
        }
    }
}

impl EventTiming {
    /// Every event-level timing rule: check-in switch, check-in window,
    /// admission lead time and event end.
    ///
    /// # Errors
    ///
    /// The first failing rule.
    pub fn check(&self, at: DateTime<Utc>, policy: &ScanPolicy) -> Result<(), RejectionReason> {
        if !self.check_in_enabled {
            return Err(RejectionReason::EventWindow(
                EventWindowViolation::CheckInDisabled,
            ));
        }
        if let Some(opens_at) = self.opens_at {
            if at < opens_at {
                return Err(RejectionReason::EventWindow(
                    EventWindowViolation::NotYetOpen { opens_at },
                ));
            }
        }
        if let Some(closes_at) = self.closes_at {
            if at > closes_at {
                return Err(RejectionReason::EventWindow(EventWindowViolation::Closed {
                    closes_at,
                }));
            }
        }
        self.check_schedule(at, policy)
    }

    /// Admission lead time before start, and event end.
    ///
    /// # Errors
    ///
    /// [`EventWindowViolation::TooEarly`] or [`EventWindowViolation::EventEnded`].
    pub fn check_schedule(
        &self,
        at: DateTime<Utc>,
        policy: &ScanPolicy,
    ) -> Result<(), RejectionReason> {
        let admits_from = self.starts_at - policy.admission_lead_time;
        if at < admits_from {
            return Err(RejectionReason::EventWindow(EventWindowViolation::TooEarly {
                admits_from,
            }));
        }
        if let Some(ended_at) = self.ends_at {
            if at > ended_at {
                return Err(RejectionReason::EventWindow(
                    EventWindowViolation::EventEnded { ended_at },
                ));
            }
        }
        Ok(())
    }
}

/// Check whether `ticket` may be admitted at `at`, optionally through `gate`.
///
/// # Errors
///
/// Returns the first failing rule as a [`RejectionReason`].
pub fn check_admission(
    ticket: &Ticket,
    event: &EventSecurityConfig,
    gate: Option<&GateId>,
    at: DateTime<Utc>,
    policy: &ScanPolicy,
) -> Result<(), RejectionReason> {
    scan_eligibility(ticket, event, at)?;

    if let Some(gate) = gate {
        if !event.admits_at_gate(gate, &ticket.ticket_type) {
            return Err(RejectionReason::GateNotAuthorized { gate: gate.clone() });
        }
    }

    EventTiming::from(event).check_schedule(at, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn timing() -> EventTiming {
        let starts_at = DateTime::parse_from_rfc3339("2025-06-01T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        EventTiming {
            check_in_enabled: true,
            opens_at: None,
            closes_at: None,
            starts_at,
            ends_at: Some(starts_at + Duration::hours(4)),
        }
    }

    #[test]
    fn open_event_admits_inside_its_schedule() {
        let t = timing();
        assert_eq!(t.check(t.starts_at, &ScanPolicy::default()), Ok(()));
    }

    #[test]
    fn switch_wins_over_schedule() {
        let t = EventTiming {
            check_in_enabled: false,
            ..timing()
        };
        assert_eq!(
            t.check(t.starts_at, &ScanPolicy::default()),
            Err(RejectionReason::EventWindow(
                EventWindowViolation::CheckInDisabled
            ))
        );
    }

    #[test]
    fn lead_time_and_end_bound_the_schedule() {
        let t = timing();
        let policy = ScanPolicy::default();
        let too_early = t.starts_at - policy.admission_lead_time - Duration::seconds(1);
        assert!(matches!(
            t.check(too_early, &policy),
            Err(RejectionReason::EventWindow(EventWindowViolation::TooEarly { .. }))
        ));
        let after_end = t.starts_at + Duration::hours(5);
        assert!(matches!(
            t.check(after_end, &policy),
            Err(RejectionReason::EventWindow(EventWindowViolation::EventEnded { .. }))
        ));
    }

    #[test]
    fn check_in_window_closes_admission() {
        let t = EventTiming {
            closes_at: Some(timing().starts_at + Duration::hours(1)),
            ..timing()
        };
        assert!(matches!(
            t.check(t.starts_at + Duration::hours(2), &ScanPolicy::default()),
            Err(RejectionReason::EventWindow(EventWindowViolation::Closed { .. }))
        ));
    }
}
