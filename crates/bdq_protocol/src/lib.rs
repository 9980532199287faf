//! Canonical types shared across the BDQ assessment pipeline.
//!
//! Everything that crosses a crate boundary lives here: test types, outcome
//! statuses, the `Outcome` value itself, the fatal-error taxonomy, canonical
//! default values, and the idempotency-key hashing the task-queue adapter
//! keys on.
//!
//! The engine and every adapter agree on these definitions; nothing in this
//! crate does I/O.

pub mod defaults;
pub mod idempotency;
pub mod types;

// Re-export types for convenience
pub use types::{
    JobErrorKind, Outcome, OutcomeStatus, Proposal, ResultLabel, ResultValue, TestType,
};

pub use idempotency::{hash_parts, job_idempotency_key};
