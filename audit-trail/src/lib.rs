//! Audit Trail Consolidation
//!
//! Merges the per-component JSONL audit logs into one chronologically
//! ordered, queryable stream and computes summary statistics across the
//! whole trail.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod consolidator;
pub mod error;

// Re-exports
pub use consolidator::{AuditConsolidator, AuditQuery, AuditSummary, ConsolidatedEntry};
pub use error::{Error, Result};
