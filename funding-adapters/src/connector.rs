//! Ad-platform connector interface

use crate::{
    types::{AccountInfo, FundingReceipt},
    Result,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use wallet_core::CreditPool;

/// One ad platform's funding API
#[async_trait]
pub trait AdPlatformConnector: Send + Sync {
    /// Pool this connector funds
    fn platform(&self) -> CreditPool;

    /// Connector name for logs and audit entries
    fn name(&self) -> &str;

    /// Local format check on an account reference, before any network call
    fn validate_account_ref(&self, account_ref: &str) -> Result<()>;

    /// Remote existence/status check
    async fn validate_account(&self, account_ref: &str) -> Result<AccountInfo>;

    /// Push funds into the account. Timeouts and API rejections are
    /// failures; the caller issues the compensating credit.
    async fn add_funds(&self, account_ref: &str, amount: Decimal) -> Result<FundingReceipt>;
}
