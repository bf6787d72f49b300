//! Gate pipeline types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use wallet_core::{CreditPool, UserId};

/// One check in the ordered validation pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateKind {
    /// Gate 1: payment-processor integration is configured
    ProcessorAvailability,
    /// Gate 2: global minimum, per-operation maximum, pool balance cap
    AmountLimits,
    /// Gate 3: no negative balance across any pool
    BalanceConsistency,
    /// Gate 4: explicit user confirmation for the payment intent
    HumanConfirmation,
    /// Gate 5: processor webhook corroborated the charge
    WebhookConfirmation,
}

impl GateKind {
    /// Stable identifier used in audit entries
    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::ProcessorAvailability => "processor_availability",
            GateKind::AmountLimits => "amount_limits",
            GateKind::BalanceConsistency => "balance_consistency",
            GateKind::HumanConfirmation => "human_confirmation",
            GateKind::WebhookConfirmation => "webhook_confirmation",
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a gate blocked a payment
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockReason {
    /// Processor keys unconfigured or placeholders
    #[error("Payment processor unavailable: {0}")]
    ProcessorUnavailable(String),

    /// An amount bound was violated; names the specific bound
    #[error("Payment limit exceeded: {0}")]
    LimitExceeded(String),

    /// A negative pool balance was detected, or consistency could not be
    /// verified
    #[error("Balance inconsistency: {0}")]
    BalanceInconsistent(String),

    /// Awaiting an explicit user confirmation for this payment intent
    #[error("Payment requires explicit user confirmation (intent: {intent_id})")]
    RequiresConfirmation {
        /// Intent the user must confirm
        intent_id: String,
    },

    /// Awaiting processor webhook corroboration for this transaction
    #[error("Awaiting processor webhook confirmation (transaction: {transaction_ref})")]
    AwaitingWebhook {
        /// Processor transaction reference
        transaction_ref: String,
    },
}

impl BlockReason {
    /// Remaining step the caller must take to unblock, user-facing
    pub fn remaining_step(&self) -> &'static str {
        match self {
            BlockReason::ProcessorUnavailable(_) => "configure the payment processor",
            BlockReason::LimitExceeded(_) => "adjust the payment amount",
            BlockReason::BalanceInconsistent(_) => "contact support for balance review",
            BlockReason::RequiresConfirmation { .. } => "confirm the payment",
            BlockReason::AwaitingWebhook { .. } => "await processor confirmation",
        }
    }
}

/// Result of evaluating one gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    /// Which gate ran
    pub gate: GateKind,
    /// Whether the gate passed
    pub passed: bool,
    /// Pass message or block reason text
    pub reason: String,
}

/// A payment under validation
#[derive(Debug, Clone)]
pub struct PaymentValidationRequest {
    /// Requesting user
    pub user_id: UserId,

    /// Pool the payment targets
    pub pool: CreditPool,

    /// Payment amount
    pub amount: Decimal,

    /// Payment intent, once one exists. Absent means the confirmation gate
    /// blocks immediately.
    pub intent_id: Option<String>,

    /// Whether the processor charge was already submitted. The webhook
    /// confirmation gate only applies afterwards.
    pub charge_submitted: bool,
}

/// Outcome of a full pipeline run.
///
/// Gates short-circuit: `gate_results` contains entries only for gates that
/// actually ran, and the first blocking gate's reason is the one reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True if any gate blocked
    pub blocked: bool,

    /// First blocking gate's reason, if blocked
    pub reason: Option<BlockReason>,

    /// Per-gate trace, in evaluation order
    pub gate_results: Vec<GateResult>,
}

impl ValidationReport {
    /// A payment may proceed only when nothing blocked
    pub fn passed(&self) -> bool {
        !self.blocked
    }
}
