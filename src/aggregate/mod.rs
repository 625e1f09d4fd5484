//! Interval-windowed log aggregation.
//!
//! Reconciles the paginated remote event stream into fixed monthly buckets
//! per subject and reconstructs time-bounded tenure windows from role-change
//! events. Pure logic lives here; all remote access goes through the
//! [`crate::source::EventSource`] seam.

use thiserror::Error;

use crate::source::SourceError;

pub mod counter;
pub mod fetch;
pub mod membership;
pub mod orchestrate;
pub mod window;

pub use counter::count_by_month;
pub use fetch::drain_pages;
pub use membership::reconstruct_windows;
pub use orchestrate::{AuditReport, Orchestrator, RoleReport, SubjectOutcome};
pub use window::reporting_interval;

/// Failures surfaced while aggregating one subject. A single subject's
/// failure never aborts the batch; the orchestrator records the outcome and
/// moves on.
#[derive(Error, Debug)]
pub enum AggregateError {
    /// The event source failed; accumulated partial results were discarded.
    #[error("fetch failed: {0}")]
    Fetch(#[from] SourceError),

    /// The rights-log sequence for a subject broke the alternating
    /// add/remove invariant, or carried a timestamp outside the interval.
    #[error("inconsistent rights log for {subject}: {detail}")]
    DataConsistency { subject: String, detail: String },

    /// An event reached the counter with a month outside the configured
    /// interval. A caller bug, not a remote condition.
    #[error("contract violation: {detail}")]
    ContractViolation { detail: String },
}
