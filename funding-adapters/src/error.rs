//! Error types for ad-account funding

use thiserror::Error;
use wallet_core::CreditPool;

/// Result type for funding operations
pub type Result<T> = std::result::Result<T, Error>;

/// Funding adapter errors
#[derive(Error, Debug)]
pub enum Error {
    /// External account reference failed format or existence validation
    #[error("Invalid {platform} account reference: {detail}")]
    InvalidAccountRef {
        /// Platform the reference was checked against
        platform: CreditPool,
        /// What failed
        detail: String,
    },

    /// Requested currency does not match the pool's fixed currency
    #[error("Currency {requested} does not match {pool} pool currency {expected}")]
    CurrencyMismatch {
        /// Currency the caller asked for
        requested: String,
        /// Pool being funded
        pool: CreditPool,
        /// The pool's fixed currency
        expected: String,
    },

    /// No connector registered for the requested pool
    #[error("No funding connector for pool {0}")]
    NoConnector(CreditPool),

    /// HTTP-level failure reaching the ad platform
    #[error("Connection error: {0}")]
    Connection(String),

    /// The ad platform rejected the request
    #[error("Ad platform API error ({status_code}): {message}")]
    PlatformApi {
        /// HTTP status
        status_code: u16,
        /// Response body
        message: String,
    },

    /// The wallet debit succeeded but the downstream funding call failed;
    /// a compensating credit restored the balance
    #[error("Downstream funding failed for {platform}: {detail}")]
    DownstreamFundingFailed {
        /// Platform that failed
        platform: CreditPool,
        /// Downstream failure detail
        detail: String,
    },

    /// Gate pipeline error
    #[error("Validation error: {0}")]
    Gates(#[from] security_gates::Error),

    /// Wallet/storage error
    #[error("Wallet error: {0}")]
    Wallet(#[from] wallet_core::Error),
}
