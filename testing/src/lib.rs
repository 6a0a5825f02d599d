//! # Turnstile Testing
//!
//! Testing utilities for the Turnstile check-in core.
//!
//! This crate provides:
//! - In-memory implementations of every storage trait, with fault injection
//! - Fixed and stepping clocks
//! - A recording audit sink
//! - Ticket and event fixture builders
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_testing::{EventBuilder, InMemoryTicketStore, TicketBuilder, test_clock};
//!
//! #[tokio::test]
//! async fn checks_in_once() {
//!     let event = EventBuilder::new().build();
//!     let tickets = InMemoryTicketStore::new();
//!     tickets.insert(TicketBuilder::for_event(&event).build());
//!     // build a ScanEnvironment and drive the coordinator...
//! }
//! ```

/// Deterministic clocks
pub mod clock;

/// Ticket and event builders
pub mod fixtures;

/// In-memory storage implementations
pub mod stores;

// Re-export commonly used items
pub use clock::{FixedClock, SteppingClock, test_clock};
pub use fixtures::{EventBuilder, TicketBuilder, at, event_start, other_secret, test_secret};
pub use stores::{
    InMemoryEventDirectory, InMemoryPendingQueue, InMemoryTicketStore, RecordingAuditSink,
};
