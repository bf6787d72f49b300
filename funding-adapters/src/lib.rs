//! Ad-Account Funding Adapters
//!
//! Bridges wallet credit into Facebook and Google ad accounts. Every
//! funding request passes the security gate pipeline, debits the wallet,
//! pushes funds through a platform connector, and compensates the wallet
//! with an equal credit when the downstream call fails.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod connector;
pub mod error;
pub mod facebook;
pub mod funding;
pub mod google;
pub mod types;

// Re-exports
pub use connector::AdPlatformConnector;
pub use error::{Error, Result};
pub use facebook::{FacebookAdsConnector, FacebookConfig};
pub use funding::FundingService;
pub use google::{GoogleAdsConnector, GoogleConfig};
pub use types::{AccountInfo, FundingOutcome, FundingReceipt, FundingRequest};
