//! Funding request and response types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use security_gates::{BlockReason, GateResult};
use serde::{Deserialize, Serialize};
use wallet_core::{Balance, CreditPool, Currency, UserId};

/// A user-initiated request to move wallet credit into an ad account
#[derive(Debug, Clone)]
pub struct FundingRequest {
    /// Requesting user
    pub user_id: UserId,
    /// Pool to draw from; also selects the connector
    pub pool: CreditPool,
    /// Amount to transfer
    pub amount: Decimal,
    /// Requested currency, must match the pool's fixed currency
    pub currency: Currency,
    /// Ad-platform account to top up
    pub external_account_id: String,
    /// Confirmed payment intent, when the confirmation step already ran
    pub intent_id: Option<String>,
}

/// Remote account details returned by a connector's existence check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Platform account reference
    pub account_ref: String,
    /// Display name, when the platform returns one
    pub name: Option<String>,
    /// Platform-side account status string
    pub status: Option<String>,
}

/// Proof of a completed downstream funding call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingReceipt {
    /// Platform that was funded
    pub platform: CreditPool,
    /// Account that was topped up
    pub external_account_id: String,
    /// Amount transferred
    pub amount: Decimal,
    /// Currency of the transfer
    pub currency: Currency,
    /// Platform-side reference for the transfer
    pub platform_ref: String,
    /// Completion time
    pub completed_at: DateTime<Utc>,
}

/// Terminal result of a funding request
#[derive(Debug, Clone)]
pub enum FundingOutcome {
    /// The confirmation gate blocked; the caller must surface the summary
    /// and collect an explicit confirmation for the intent
    ConfirmationRequired {
        /// Intent the user must confirm
        intent_id: String,
        /// Human-readable payment summary
        summary: String,
    },
    /// A gate other than confirmation blocked the request
    Blocked {
        /// Why
        reason: BlockReason,
        /// Per-gate trace
        gate_results: Vec<GateResult>,
    },
    /// The wallet was debited and the ad account topped up
    Funded {
        /// Downstream proof
        receipt: FundingReceipt,
        /// Wallet balance after the debit
        wallet_balance: Balance,
    },
}
