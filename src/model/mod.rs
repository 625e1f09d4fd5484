//! Core data model for the audit report.

pub mod types;

pub use types::*;
