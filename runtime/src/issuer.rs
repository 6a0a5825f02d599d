//! Token issuance with per ticket and requester throttling.
//!
//! Tokens are derived from a ticket on demand and never stored. Issuance is
//! throttled per ticket+requester over a rolling hour to blunt scraping and
//! signature-guessing; the limit protects resources and has no bearing on
//! check-in correctness.

use crate::environment::ScanEnvironment;
use crate::error::{Result, TurnstileError};
use crate::metrics::IssuanceMetrics;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use turnstile_core::signer;
use turnstile_core::token::{self, TokenClaims};
use turnstile_core::{ActorId, Clock, Ticket};

/// Sliding-window rate limiter.
pub trait RateLimiter: Send + Sync {
    /// Record an attempt for `key` if fewer than `max_attempts` were recorded
    /// within `window`. Returns `true` when the attempt is allowed.
    ///
    /// # Errors
    ///
    /// Returns error if the limiter's backing store fails.
    fn check_and_record(
        &self,
        key: &str,
        max_attempts: u32,
        window: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// In-process sliding-window limiter.
///
/// Every call prunes timestamps older than the window across all keys and
/// drops keys left empty, so the map only holds recently active keys. State
/// is per process; replicas each enforce their own window.
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    clock: Arc<dyn Clock>,
    attempts: Arc<Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>>,
}

impl InMemoryRateLimiter {
    /// Create a limiter reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            attempts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of keys with attempts inside the last window seen.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.attempts.lock().map_or(0, |attempts| attempts.len())
    }
}

impl RateLimiter for InMemoryRateLimiter {
    async fn check_and_record(&self, key: &str, max_attempts: u32, window: Duration) -> Result<bool> {
        let now = self.clock.now();
        let mut attempts = self
            .attempts
            .lock()
            .map_err(|_| TurnstileError::Internal("Rate limiter mutex poisoned".into()))?;

        let window_start = now - window;
        attempts.retain(|_, timestamps| {
            while timestamps.front().is_some_and(|ts| *ts <= window_start) {
                timestamps.pop_front();
            }
            !timestamps.is_empty()
        });

        let count = attempts.get(key).map_or(0, VecDeque::len);
        if count >= max_attempts as usize {
            tracing::debug!(key, count, "Rate limit reached");
            return Ok(false);
        }
        attempts.entry(key.to_string()).or_default().push_back(now);
        Ok(true)
    }
}

/// What the issuer hands back to the ticket-delivery layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedToken {
    /// String to embed in the QR code
    pub qr_payload: String,
    /// Short hash for printed fallbacks and manifest lookups
    pub short_hash: String,
    /// Token expiry
    pub expires_at: DateTime<Utc>,
}

/// Issues signed tokens for scannable tickets.
pub struct TokenIssuer<R: RateLimiter> {
    env: ScanEnvironment,
    limiter: R,
}

impl<R: RateLimiter> TokenIssuer<R> {
    /// Create an issuer.
    #[must_use]
    pub const fn new(env: ScanEnvironment, limiter: R) -> Self {
        Self { env, limiter }
    }

    /// Issue a fresh token for `ticket` on behalf of `requested_by`.
    ///
    /// # Errors
    ///
    /// - [`TurnstileError::NotIssuable`] if the ticket is used, cancelled or expired
    /// - [`TurnstileError::RateLimited`] if the hourly limit is reached
    /// - [`TurnstileError::EventNotFound`] if the ticket's event is missing
    /// - storage faults
    #[tracing::instrument(skip(self, ticket), fields(ticket_id = %ticket.id))]
    pub async fn issue(&self, ticket: &Ticket, requested_by: ActorId) -> Result<IssuedToken> {
        let now = self.env.clock.now();
        let status = ticket.effective_status(now);
        if !status.is_scannable() {
            return Err(TurnstileError::NotIssuable {
                ticket_id: ticket.id,
                status,
            });
        }

        let key = format!("{}:{requested_by}", ticket.id);
        let allowed = self
            .limiter
            .check_and_record(&key, self.env.policy.issuance_limit_per_hour, Duration::hours(1))
            .await?;
        if !allowed {
            IssuanceMetrics::record_rate_limited();
            tracing::warn!(%requested_by, "Token issuance rate limited");
            return Err(TurnstileError::RateLimited {
                ticket_id: ticket.id,
            });
        }

        let event = self
            .env
            .events
            .get_event(ticket.event_id)
            .await?
            .ok_or(TurnstileError::EventNotFound(ticket.event_id))?;

        let claims = TokenClaims::for_ticket(ticket, now, self.env.policy.token_ttl);
        let issued = IssuedToken {
            qr_payload: token::encode(&claims, &event.secret),
            short_hash: signer::ticket_hash(&ticket.id, &ticket.ticket_code, &event.id, &event.secret),
            expires_at: claims.expires_at,
        };
        IssuanceMetrics::record_issued();
        tracing::debug!(expires_at = %issued.expires_at, "Token issued");
        Ok(issued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstile_core::SystemClock;

    #[tokio::test]
    async fn limiter_allows_up_to_max_then_blocks() {
        let limiter = InMemoryRateLimiter::new(Arc::new(SystemClock));
        for _ in 0..3 {
            assert!(limiter.check_and_record("k", 3, Duration::hours(1)).await.unwrap());
        }
        assert!(!limiter.check_and_record("k", 3, Duration::hours(1)).await.unwrap());
        assert!(limiter.check_and_record("other", 3, Duration::hours(1)).await.unwrap());
    }

    #[tokio::test]
    async fn idle_keys_are_dropped_once_their_window_passes() {
        let clock = turnstile_testing::SteppingClock::new(Utc::now());
        let limiter = InMemoryRateLimiter::new(Arc::new(clock.clone()));
        for n in 0..50 {
            let key = format!("ticket-{n}:staff");
            assert!(limiter.check_and_record(&key, 3, Duration::hours(1)).await.unwrap());
        }
        assert_eq!(limiter.tracked_keys(), 50);

        clock.advance(Duration::hours(1) + Duration::seconds(1));
        assert!(limiter.check_and_record("fresh", 3, Duration::hours(1)).await.unwrap());
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn refused_attempts_do_not_create_keys() {
        let limiter = InMemoryRateLimiter::new(Arc::new(SystemClock));
        assert!(!limiter.check_and_record("k", 0, Duration::hours(1)).await.unwrap());
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
