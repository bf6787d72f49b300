//! Webhook Event Processor
//!
//! Turns at-least-once webhook deliveries from the payment processor into
//! exactly-once ledger mutations. Signature verification fails closed,
//! event content failures are recorded and acknowledged, and the external
//! event id deduplicates redeliveries by returning the original outcome.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod error;
pub mod event;
pub mod processor;
pub mod signature;

// Re-exports
pub use error::{Error, Result};
pub use event::{EventData, EventObject, ProcessorEvent};
pub use processor::{WebhookOutcome, WebhookProcessor};
pub use signature::SignatureVerifier;
