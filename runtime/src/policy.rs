//! Scan policy: the tunable limits of validation, check-in and issuance.
//!
//! Loads from environment variables with sensible defaults.

use chrono::Duration;
use std::env;

/// Default token lifetime: six hours.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 6 * 3600;
/// Default duplicate-scan window: five minutes.
pub const DEFAULT_DUPLICATE_WINDOW_SECS: i64 = 5 * 60;
/// Default admission lead time before event start: two hours.
pub const DEFAULT_ADMISSION_LEAD_SECS: i64 = 2 * 3600;
/// Default number of optimistic write attempts per check-in.
pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 5;
/// Default tokens per ticket and requester per rolling hour.
pub const DEFAULT_ISSUANCE_LIMIT: u32 = 10;

/// Limits applied by the validator, the coordinator and the token issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPolicy {
    /// Lifetime of an issued token
    pub token_ttl: Duration,
    /// Same-actor repeat scans inside this window are duplicates, not conflicts
    pub duplicate_window: Duration,
    /// Earliest admission before event start
    pub admission_lead_time: Duration,
    /// Optimistic write attempts before giving up with a contention fault
    pub max_write_attempts: u32,
    /// Tokens per ticket and requester per rolling hour
    pub issuance_limit_per_hour: u32,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            token_ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
            duplicate_window: Duration::seconds(DEFAULT_DUPLICATE_WINDOW_SECS),
            admission_lead_time: Duration::seconds(DEFAULT_ADMISSION_LEAD_SECS),
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
            issuance_limit_per_hour: DEFAULT_ISSUANCE_LIMIT,
        }
    }
}

impl ScanPolicy {
    /// Load the policy from `TURNSTILE_*` environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `TURNSTILE_TOKEN_TTL_SECS` | 21600 |
    /// | `TURNSTILE_DUPLICATE_WINDOW_SECS` | 300 |
    /// | `TURNSTILE_ADMISSION_LEAD_SECS` | 7200 |
    /// | `TURNSTILE_MAX_WRITE_ATTEMPTS` | 5 |
    /// | `TURNSTILE_ISSUANCE_LIMIT_PER_HOUR` | 10 |
    ///
    /// Unparseable, negative or out-of-range values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load the policy through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secs = |key: &str, default: i64| {
            lookup(key)
                .and_then(|s| s.parse().ok())
                .filter(|v: &i64| *v >= 0)
                .and_then(Duration::try_seconds)
                .unwrap_or_else(|| Duration::seconds(default))
        };
        Self {
            token_ttl: secs("TURNSTILE_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS),
            duplicate_window: secs(
                "TURNSTILE_DUPLICATE_WINDOW_SECS",
                DEFAULT_DUPLICATE_WINDOW_SECS,
            ),
            admission_lead_time: secs("TURNSTILE_ADMISSION_LEAD_SECS", DEFAULT_ADMISSION_LEAD_SECS),
            max_write_attempts: lookup("TURNSTILE_MAX_WRITE_ATTEMPTS")
                .and_then(|s| s.parse().ok())
                .filter(|v: &u32| *v > 0)
                .unwrap_or(DEFAULT_MAX_WRITE_ATTEMPTS),
            issuance_limit_per_hour: lookup("TURNSTILE_ISSUANCE_LIMIT_PER_HOUR")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_ISSUANCE_LIMIT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let policy = ScanPolicy::default();
        assert_eq!(policy.token_ttl, Duration::hours(6));
        assert_eq!(policy.duplicate_window, Duration::minutes(5));
        assert_eq!(policy.admission_lead_time, Duration::hours(2));
        assert_eq!(policy.max_write_attempts, 5);
        assert_eq!(policy.issuance_limit_per_hour, 10);
    }

    #[test]
    fn lookup_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            ("TURNSTILE_TOKEN_TTL_SECS", "600"),
            ("TURNSTILE_DUPLICATE_WINDOW_SECS", "not-a-number"),
            ("TURNSTILE_MAX_WRITE_ATTEMPTS", "0"),
            ("TURNSTILE_ISSUANCE_LIMIT_PER_HOUR", "3"),
        ]
        .into_iter()
        .collect();
        let policy = ScanPolicy::from_lookup(|k| vars.get(k).map(ToString::to_string));
        assert_eq!(policy.token_ttl, Duration::minutes(10));
        assert_eq!(policy.duplicate_window, Duration::minutes(5));
        assert_eq!(policy.max_write_attempts, DEFAULT_MAX_WRITE_ATTEMPTS);
        assert_eq!(policy.issuance_limit_per_hour, 3);
    }

    #[test]
    fn out_of_range_durations_fall_back() {
        let huge = i64::MAX.to_string();
        let policy = ScanPolicy::from_lookup(|k| {
            (k == "TURNSTILE_TOKEN_TTL_SECS" || k == "TURNSTILE_ADMISSION_LEAD_SECS")
                .then(|| huge.clone())
        });
        assert_eq!(policy.token_ttl, Duration::seconds(DEFAULT_TOKEN_TTL_SECS));
        assert_eq!(
            policy.admission_lead_time,
            Duration::seconds(DEFAULT_ADMISSION_LEAD_SECS)
        );
    }
}
