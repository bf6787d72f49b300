//! Error types for the security gate pipeline

use thiserror::Error;

/// Result type for gate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Gate pipeline errors.
///
/// A blocked payment is not an error: blocks are reported through
/// [`crate::types::ValidationReport`]. These variants cover the pipeline's
/// own failure modes.
#[derive(Error, Debug)]
pub enum Error {
    /// Wallet/storage error
    #[error("Wallet error: {0}")]
    Wallet(#[from] wallet_core::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
