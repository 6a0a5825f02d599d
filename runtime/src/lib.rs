//! # Turnstile Runtime
//!
//! Orchestration of the ticket check-in core.
//!
//! ## Core Components
//!
//! - **Validator**: decode → verify → state/time/gate checks → [`Verdict`]
//! - **Check-in Coordinator**: at-most-once `valid → used` with duplicate
//!   absorption and optimistic-write retry
//! - **Token Issuer**: rate-limited token generation for scannable tickets
//! - **Manifest Service**: signed offline snapshots per event
//! - **Offline Scanner**: local validation against a manifest with pending
//!   check-in capture
//! - **Reconciler**: replays pending check-ins in scan order
//!
//! Every service takes a [`ScanEnvironment`]: storage traits, an audit sink,
//! a clock and a [`ScanPolicy`].
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_runtime::{CheckInCoordinator, CheckInRequest, ScanEnvironment, Validator};
//!
//! let env = ScanEnvironment::new(tickets, events, audit, clock, ScanPolicy::default());
//! let verdict = Validator::new(env.clone()).validate(&qr_payload, Some(&gate)).await?;
//! if verdict.is_admitted() {
//!     let outcome = CheckInCoordinator::new(env)
//!         .check_in(CheckInRequest::new(ticket_id, actor).at_gate("north-1"))
//!         .await?;
//! }
//! ```
//!
//! [`Verdict`]: turnstile_core::Verdict

/// Shared scan-time admission rules
pub mod admission;

/// Administrative ticket transitions
pub mod admin;

/// Default tracing audit sink
pub mod audit;

/// The check-in coordinator
pub mod coordinator;

/// Injected dependencies
pub mod environment;

/// Runtime error types
pub mod error;

/// Token issuance and rate limiting
pub mod issuer;

/// Offline manifest export
pub mod manifest;

/// Prometheus metrics for observability
pub mod metrics;

/// Offline scanning
pub mod offline;

/// Tunable limits
pub mod policy;

/// Offline reconciliation worker
pub mod reconciler;

/// Retry logic with exponential backoff
pub mod retry;

/// Signing-secret rotation
pub mod rotation;

/// The validator
pub mod validator;

pub use admin::TicketAdmin;
pub use audit::TracingAuditSink;
pub use coordinator::{CheckInCoordinator, CheckInRequest};
pub use environment::ScanEnvironment;
pub use error::{Result, TurnstileError};
pub use issuer::{InMemoryRateLimiter, IssuedToken, RateLimiter, TokenIssuer};
pub use manifest::ManifestService;
pub use offline::{OfflineScanner, OfflineVerdict};
pub use policy::ScanPolicy;
pub use reconciler::{BatchReport, ReconciledRecord, Reconciler, ReconcilerSettings, Resolution};
pub use retry::RetryPolicy;
pub use rotation::{RotationReport, rotate_event_secret};
pub use validator::Validator;
