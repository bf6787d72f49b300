//! Credit Wallet Core
//!
//! Per-user, multi-currency credit ledger funding four independent spending
//! pools, settled through an external payment processor.
//!
//! # Architecture
//!
//! - **Closed pool enumeration**: four credit pools, anything else rejected
//!   at the boundary
//! - **Append-only ledger**: every credit/debit attempt writes exactly one
//!   transaction; folding the history reconstructs the balance
//! - **Per-(user, pool) locking**: read-modify-write runs in a keyed
//!   critical section, never under a global lock
//! - **Idempotent consumption**: external event ids are applied at most once
//!
//! # Invariants
//!
//! - Balance >= 0 for every (user, pool) at all times
//! - `updated_at` strictly increases with every mutation
//! - Fold of Success transactions over zero == stored balance

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod audit;
pub mod config;
pub mod error;
pub mod locks;
pub mod service;
pub mod storage;
pub mod types;

// Re-exports
pub use audit::{AuditSource, AuditWriter};
pub use config::Config;
pub use error::{Error, Result};
pub use locks::KeyedLocks;
pub use service::WalletLedger;
pub use storage::Storage;
pub use types::{
    Balance, CreditPool, Currency, LedgerTransaction, Operation, PaymentIntentRecord, TxOutcome,
    TxSource, UserId, Wallet, WebhookEventRecord, WebhookStatus,
};
