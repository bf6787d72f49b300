//! Payment Security Gates
//!
//! Ordered validation pipeline every wallet payment passes through before
//! any money moves. Five gates run in a fixed sequence and short-circuit on
//! the first block; every run leaves its full per-gate trace in the audit
//! log.
//!
//! The pipeline fails closed: an unconfigured processor, an unverifiable
//! balance, or a gate that cannot determine its answer all block the
//! payment. There is no administrative bypass for the human confirmation
//! gate.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod error;
pub mod intents;
pub mod limits;
pub mod pipeline;
pub mod processor;
pub mod types;

// Re-exports
pub use error::{Error, Result};
pub use intents::IntentService;
pub use limits::LimitConfig;
pub use pipeline::SecurityPipeline;
pub use processor::ProcessorConfig;
pub use types::{
    BlockReason, GateKind, GateResult, PaymentValidationRequest, ValidationReport,
};
