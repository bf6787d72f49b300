//! Error types for the wallet ledger

use crate::types::CreditPool;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for wallet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wallet ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Amount was zero or negative
    #[error("Invalid amount {0}: must be positive")]
    InvalidAmount(Decimal),

    /// Pool identifier is not one of the enumerated kinds
    #[error("Invalid credit pool: {0}")]
    InvalidPool(String),

    /// Debit would take the balance below zero
    #[error("Insufficient funds in {pool}: available {available}, required {required}")]
    InsufficientFunds {
        /// Pool being debited
        pool: CreditPool,
        /// Current balance
        available: Decimal,
        /// Requested debit amount
        required: Decimal,
    },

    /// External event id was already applied to the ledger
    #[error("Duplicate event: {0} already applied")]
    DuplicateEvent(String),

    /// Payment intent not found
    #[error("Payment intent not found: {0}")]
    IntentNotFound(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
