//! Error types for webhook processing
//!
//! Two delivery-level failures exist: a bad signature and an unparseable
//! payload. Both fail closed with no stored record, so the processor
//! retries the delivery. Everything else resolves to a recorded outcome.

use thiserror::Error;

/// Result type for webhook operations
pub type Result<T> = std::result::Result<T, Error>;

/// Webhook processing errors
#[derive(Error, Debug)]
pub enum Error {
    /// Signature header missing, malformed, stale, or wrong
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// Payload is not a well-formed processor event
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    /// The event was recorded but its ledger effect could not be applied
    /// and needs manual review
    #[error("Reconciliation required for event {event_id}: {detail}")]
    Reconciliation {
        /// External event id
        event_id: String,
        /// What went wrong
        detail: String,
    },

    /// Wallet/storage error
    #[error("Wallet error: {0}")]
    Wallet(#[from] wallet_core::Error),
}
