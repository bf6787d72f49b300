//! Error types for audit consolidation

use thiserror::Error;

/// Result type for consolidator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Consolidator errors.
///
/// Malformed individual log lines are skipped, never surfaced as errors;
/// only I/O-level failures reach the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Log directory or file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
