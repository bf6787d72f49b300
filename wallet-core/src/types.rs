//! Core types for the credit wallet
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)
//! - A closed pool enumeration (invalid pools rejected at the boundary)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// User identifier (opaque, assigned by the platform front door)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO 4217 currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Currency {
    /// Brazilian Real
    BRL,
    /// US Dollar
    USD,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::BRL => "BRL",
            Currency::USD => "USD",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BRL" => Some(Currency::BRL),
            "USD" => Some(Currency::USD),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One of the four independently tracked credit pools a user holds.
///
/// The enumeration is closed: any other pool string is rejected at the
/// boundary with `InvalidPool`, so a mistyped pool can never be silently
/// treated as a missing balance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum CreditPool {
    /// Platform-internal AI credit
    Internal = 1,
    /// LLM provider credit
    LlmProvider = 2,
    /// Facebook Ads funding account
    FacebookAds = 3,
    /// Google Ads funding account
    GoogleAds = 4,
}

impl CreditPool {
    /// All pool kinds, in canonical order
    pub const ALL: [CreditPool; 4] = [
        CreditPool::Internal,
        CreditPool::LlmProvider,
        CreditPool::FacebookAds,
        CreditPool::GoogleAds,
    ];

    /// Stable identifier used in storage keys and audit entries
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditPool::Internal => "INTERNAL",
            CreditPool::LlmProvider => "LLM_PROVIDER",
            CreditPool::FacebookAds => "FACEBOOK_ADS",
            CreditPool::GoogleAds => "GOOGLE_ADS",
        }
    }

    /// The currency a pool is denominated in. Fixed per pool, never changes.
    pub fn currency(&self) -> Currency {
        match self {
            CreditPool::Internal => Currency::BRL,
            CreditPool::LlmProvider => Currency::USD,
            CreditPool::FacebookAds => Currency::BRL,
            CreditPool::GoogleAds => Currency::BRL,
        }
    }

    /// Parse a pool identifier, rejecting anything outside the enumeration
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INTERNAL" => Ok(CreditPool::Internal),
            "LLM_PROVIDER" => Ok(CreditPool::LlmProvider),
            "FACEBOOK_ADS" => Ok(CreditPool::FacebookAds),
            "GOOGLE_ADS" => Ok(CreditPool::GoogleAds),
            other => Err(crate::Error::InvalidPool(other.to_string())),
        }
    }
}

impl fmt::Display for CreditPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Balance record held inside a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Current amount, always >= 0
    pub amount: Decimal,

    /// Currency, fixed for the pool kind
    pub currency: Currency,

    /// Last mutation timestamp, strictly increasing
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// Zeroed balance for a pool
    pub fn zero(pool: CreditPool) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency: pool.currency(),
            updated_at: Utc::now(),
        }
    }
}

/// Per-user wallet mapping every credit pool to a balance record.
///
/// Pure invariant holder: mutation happens only through the ledger service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Owning user
    pub user_id: UserId,

    /// One entry per pool kind, always all four present
    pub balances: BTreeMap<CreditPool, Balance>,
}

impl Wallet {
    /// Create a wallet with all pools zeroed
    pub fn new(user_id: UserId) -> Self {
        let balances = CreditPool::ALL
            .iter()
            .map(|&pool| (pool, Balance::zero(pool)))
            .collect();
        Self { user_id, balances }
    }

    /// Balance for a pool. Every enumerated pool is always present.
    pub fn balance(&self, pool: CreditPool) -> &Balance {
        self.balances
            .get(&pool)
            .expect("wallet invariant: every pool kind has an entry")
    }

    /// Mutable balance access, for the ledger service only
    pub(crate) fn balance_mut(&mut self, pool: CreditPool) -> &mut Balance {
        self.balances
            .get_mut(&pool)
            .expect("wallet invariant: every pool kind has an entry")
    }
}

/// Ledger operation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Balance increase
    Add,
    /// Balance decrease
    Deduct,
}

/// Origin of a ledger mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxSource {
    /// Processor webhook (payment_succeeded / charge_refunded)
    Webhook,
    /// Operator-initiated adjustment
    Manual,
    /// Compensating credit after a failed downstream call
    Refund,
    /// Ad-platform funding adapter debit
    FundingAdapter,
}

impl TxSource {
    /// Stable identifier for audit entries
    pub fn as_str(&self) -> &'static str {
        match self {
            TxSource::Webhook => "webhook",
            TxSource::Manual => "manual",
            TxSource::Refund => "refund",
            TxSource::FundingAdapter => "funding-adapter",
        }
    }
}

/// Outcome of a ledger operation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOutcome {
    /// Balance was mutated
    Success,
    /// Operation was rejected; balance unchanged
    Error,
}

/// Append-only audit record for a credit/debit attempt.
///
/// The sequence of Success transactions for a (user, pool), folded over a
/// zero starting balance, reconstructs the current stored balance. This is
/// the central correctness property of the subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Transaction id (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// When the operation was attempted
    pub timestamp: DateTime<Utc>,

    /// Owning user
    pub user_id: UserId,

    /// Add or Deduct
    pub operation: Operation,

    /// Pool affected
    pub pool: CreditPool,

    /// Amount requested
    pub amount: Decimal,

    /// Balance after the operation (unchanged for Error outcomes)
    pub resulting_balance: Decimal,

    /// External processor transaction/event id, if any
    pub external_id: Option<String>,

    /// Origin of the mutation
    pub source: TxSource,

    /// Success or Error
    pub outcome: TxOutcome,

    /// Error detail for Error outcomes
    pub error: Option<String>,

    /// Human-readable description
    pub description: String,
}

/// Processing status of a webhook event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookStatus {
    /// Event verified and applied to the ledger
    Applied,
    /// Event id seen before; original outcome returned, no mutation
    Deduplicated,
    /// Event rejected (bad signature, malformed or incomplete payload)
    Rejected,
    /// Event recorded for observability only, no mutation
    Recorded,
}

/// Processed-event record, keyed by external event id.
///
/// The external event id is the idempotency key for the whole webhook
/// pipeline: reprocessing returns the recorded outcome without re-mutating
/// the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    /// External event id (unique key)
    pub event_id: String,

    /// Processor event type
    pub event_type: String,

    /// Processing outcome
    pub status: WebhookStatus,

    /// When the event was processed
    pub processed_at: DateTime<Utc>,

    /// Processor-side transaction reference (payment intent or charge id)
    pub transaction_ref: Option<String>,

    /// Linked ledger transaction, if a mutation occurred
    pub ledger_transaction_id: Option<Uuid>,

    /// Outcome detail (error message, reconciliation note)
    pub detail: Option<String>,
}

/// Payment intent awaiting explicit human confirmation.
///
/// The confirmation gate blocks until `confirmed_at` is set by a separate,
/// user-facing confirmation action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentRecord {
    /// Processor payment-intent id
    pub intent_id: String,

    /// Requesting user
    pub user_id: UserId,

    /// Pool to be credited once the processor confirms
    pub pool: CreditPool,

    /// Charge amount
    pub amount: Decimal,

    /// Charge currency
    pub currency: Currency,

    /// When the intent was created
    pub created_at: DateTime<Utc>,

    /// Set only by an explicit user confirmation action
    pub confirmed_at: Option<DateTime<Utc>>,
}
