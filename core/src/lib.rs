//! # Turnstile Core
//!
//! Pure domain types for the ticket security and check-in subsystem.
//!
//! ## Components (leaves first)
//!
//! - **Token Codec** ([`token`]): the signed bytes embedded in a QR code
//! - **Signer/Verifier** ([`signer`]): event-scoped HMAC-SHA-256
//! - **Ticket State Machine** ([`ticket`], [`lifecycle`]): status lifecycle and
//!   the scan-eligibility predicate
//! - **Verdicts** ([`verdict`]): closed rejection and outcome types
//! - **Offline Manifest** ([`manifest`]): compressed, signed snapshot layout
//!
//! Orchestration (validation, check-in, reconciliation) lives in
//! `turnstile-runtime`; this crate performs no I/O. Storage is reached only
//! through the traits in [`store`] and [`audit`].

pub mod audit;
pub mod environment;
pub mod event;
pub mod ids;
pub mod lifecycle;
pub mod manifest;
pub mod pending;
pub mod signer;
pub mod store;
pub mod ticket;
pub mod token;
pub mod verdict;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub use audit::{AuditEvent, AuditSink, OutcomeKind};
pub use environment::{Clock, SystemClock};
pub use event::{EventSecurityConfig, GateKind, TicketClass};
pub use ids::{
    AccountId, ActorId, BatchId, BookingId, DeviceId, EventId, GateId, PendingCheckInId, TicketId,
};
pub use lifecycle::{Ineligible, TicketTransition, TransitionError};
pub use manifest::{ManifestBlob, ManifestDocument, ManifestError};
pub use pending::{PendingCheckIn, PendingStatus};
pub use signer::{SigningError, SigningSecret};
pub use store::{EventDirectory, PendingCheckInQueue, StoreError, StoreFuture, TicketStore};
pub use ticket::{CheckInFacts, Holder, Price, Seat, Ticket, TicketStatus, TicketStatusKind, Version};
pub use token::{TokenClaims, TokenError, UnverifiedToken, VerifiedClaims};
pub use verdict::{CheckInOutcome, RejectionReason, TicketSummary, Verdict};
