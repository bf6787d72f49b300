//! Ordered five-gate validation pipeline
//!
//! Gates run in a fixed order and short-circuit on the first block:
//!
//! 1. Processor availability
//! 2. Amount limits
//! 3. Balance consistency
//! 4. Human confirmation
//! 5. Webhook confirmation (only once a charge was submitted)
//!
//! Every run, blocked or not, appends its full per-gate trace to the audit
//! log. Ambiguity fails closed: if a gate cannot determine its answer, the
//! payment blocks.

use crate::{
    intents::IntentService,
    limits::LimitConfig,
    processor::ProcessorConfig,
    types::{BlockReason, GateKind, GateResult, PaymentValidationRequest, ValidationReport},
    Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use wallet_core::{AuditSource, WalletLedger};

/// The validation pipeline, shared by payment entry points
#[derive(Debug)]
pub struct SecurityPipeline {
    ledger: Arc<WalletLedger>,
    intents: IntentService,
    limits: LimitConfig,
    processor: ProcessorConfig,
}

impl SecurityPipeline {
    /// Create the pipeline
    pub fn new(ledger: Arc<WalletLedger>, limits: LimitConfig, processor: ProcessorConfig) -> Self {
        let intents = IntentService::new(ledger.storage().clone());
        Self {
            ledger,
            intents,
            limits,
            processor,
        }
    }

    /// Intent service handle, for confirmation endpoints
    pub fn intents(&self) -> &IntentService {
        &self.intents
    }

    /// Run every applicable gate against a payment, stopping at the first
    /// block. The returned report carries the trace of gates that ran.
    pub async fn validate(&self, request: &PaymentValidationRequest) -> Result<ValidationReport> {
        let mut results = Vec::new();

        let reason = match self.run_gates(request, &mut results).await {
            Ok(reason) => reason,
            Err((gate, err)) => Some(fail_closed(&mut results, gate, err)),
        };

        let report = ValidationReport {
            blocked: reason.is_some(),
            reason,
            gate_results: results,
        };

        self.append_audit(request, &report)?;

        if report.blocked {
            tracing::warn!(
                user_id = %request.user_id,
                pool = %request.pool,
                amount = %request.amount,
                reason = %report.reason.as_ref().map(|r| r.to_string()).unwrap_or_default(),
                "Payment blocked"
            );
        } else {
            tracing::info!(
                user_id = %request.user_id,
                pool = %request.pool,
                amount = %request.amount,
                "Payment passed all gates"
            );
        }

        Ok(report)
    }

    async fn run_gates(
        &self,
        request: &PaymentValidationRequest,
        results: &mut Vec<GateResult>,
    ) -> std::result::Result<Option<BlockReason>, (GateKind, crate::Error)> {
        if let Some(reason) = self.gate_processor_availability(results) {
            return Ok(Some(reason));
        }
        if let Some(reason) = self
            .gate_amount_limits(request, results)
            .await
            .map_err(|err| (GateKind::AmountLimits, err))?
        {
            return Ok(Some(reason));
        }
        if let Some(reason) = self
            .gate_balance_consistency(request, results)
            .await
            .map_err(|err| (GateKind::BalanceConsistency, err))?
        {
            return Ok(Some(reason));
        }
        if let Some(reason) = self
            .gate_human_confirmation(request, results)
            .map_err(|err| (GateKind::HumanConfirmation, err))?
        {
            return Ok(Some(reason));
        }
        if request.charge_submitted {
            if let Some(reason) = self
                .gate_webhook_confirmation(request, results)
                .map_err(|err| (GateKind::WebhookConfirmation, err))?
            {
                return Ok(Some(reason));
            }
        }
        Ok(None)
    }

    fn gate_processor_availability(&self, results: &mut Vec<GateResult>) -> Option<BlockReason> {
        match self.processor.availability() {
            Some(detail) => Some(record_block(
                results,
                GateKind::ProcessorAvailability,
                BlockReason::ProcessorUnavailable(detail),
            )),
            None => record_pass(
                results,
                GateKind::ProcessorAvailability,
                "processor keys configured",
            ),
        }
    }

    async fn gate_amount_limits(
        &self,
        request: &PaymentValidationRequest,
        results: &mut Vec<GateResult>,
    ) -> Result<Option<BlockReason>> {
        let current = self
            .ledger
            .balance(&request.user_id, request.pool)
            .await?
            .amount;

        Ok(match self.limits.check(request.amount, current) {
            Some(detail) => Some(record_block(
                results,
                GateKind::AmountLimits,
                BlockReason::LimitExceeded(detail),
            )),
            None => record_pass(results, GateKind::AmountLimits, "amount within limits"),
        })
    }

    async fn gate_balance_consistency(
        &self,
        request: &PaymentValidationRequest,
        results: &mut Vec<GateResult>,
    ) -> Result<Option<BlockReason>> {
        let wallet = self.ledger.all_balances(&request.user_id).await?;
        let negative = wallet
            .balances
            .iter()
            .find(|(_, balance)| balance.amount < Decimal::ZERO);

        Ok(match negative {
            Some((pool, balance)) => Some(record_block(
                results,
                GateKind::BalanceConsistency,
                BlockReason::BalanceInconsistent(format!(
                    "pool {} holds negative balance {}",
                    pool, balance.amount
                )),
            )),
            None => record_pass(
                results,
                GateKind::BalanceConsistency,
                "no negative balances",
            ),
        })
    }

    fn gate_human_confirmation(
        &self,
        request: &PaymentValidationRequest,
        results: &mut Vec<GateResult>,
    ) -> Result<Option<BlockReason>> {
        let Some(ref intent_id) = request.intent_id else {
            let intent = self.intents.create_intent(
                &request.user_id,
                request.pool,
                request.amount,
            )?;
            return Ok(Some(record_block(
                results,
                GateKind::HumanConfirmation,
                BlockReason::RequiresConfirmation {
                    intent_id: intent.intent_id,
                },
            )));
        };

        if self.intents.is_confirmed(intent_id)? {
            Ok(record_pass(
                results,
                GateKind::HumanConfirmation,
                "intent confirmed by user",
            ))
        } else {
            Ok(Some(record_block(
                results,
                GateKind::HumanConfirmation,
                BlockReason::RequiresConfirmation {
                    intent_id: intent_id.clone(),
                },
            )))
        }
    }

    fn gate_webhook_confirmation(
        &self,
        request: &PaymentValidationRequest,
        results: &mut Vec<GateResult>,
    ) -> Result<Option<BlockReason>> {
        // The intent id doubles as the processor transaction reference once
        // the charge is submitted.
        let Some(ref tx_ref) = request.intent_id else {
            return Ok(Some(record_block(
                results,
                GateKind::WebhookConfirmation,
                BlockReason::AwaitingWebhook {
                    transaction_ref: "unknown".to_string(),
                },
            )));
        };

        if self.ledger.storage().has_processor_confirmation(tx_ref)? {
            Ok(record_pass(
                results,
                GateKind::WebhookConfirmation,
                "processor webhook confirmed the charge",
            ))
        } else {
            Ok(Some(record_block(
                results,
                GateKind::WebhookConfirmation,
                BlockReason::AwaitingWebhook {
                    transaction_ref: tx_ref.clone(),
                },
            )))
        }
    }

    fn append_audit(
        &self,
        request: &PaymentValidationRequest,
        report: &ValidationReport,
    ) -> Result<()> {
        self.ledger.audit().append(
            AuditSource::SecurityGates,
            json!({
                "timestamp": Utc::now().to_rfc3339(),
                "user_id": request.user_id.as_str(),
                "pool": request.pool.as_str(),
                "amount": request.amount.to_string(),
                "intent_id": request.intent_id,
                "charge_submitted": request.charge_submitted,
                "blocked": report.blocked,
                "reason": report.reason.as_ref().map(|r| r.to_string()),
                "remaining_step": report.reason.as_ref().map(|r| r.remaining_step()),
                "gates": report.gate_results,
            }),
        )?;
        Ok(())
    }
}

fn record_block(results: &mut Vec<GateResult>, gate: GateKind, reason: BlockReason) -> BlockReason {
    results.push(GateResult {
        gate,
        passed: false,
        reason: reason.to_string(),
    });
    reason
}

fn record_pass(results: &mut Vec<GateResult>, gate: GateKind, detail: &str) -> Option<BlockReason> {
    results.push(GateResult {
        gate,
        passed: true,
        reason: detail.to_string(),
    });
    None
}

/// A gate that errored blocks the payment rather than waving it through.
/// The trace attributes the block to the gate that failed to evaluate.
fn fail_closed(results: &mut Vec<GateResult>, gate: GateKind, err: crate::Error) -> BlockReason {
    tracing::error!(gate = %gate, error = %err, "Gate evaluation failed, blocking payment");
    let reason = BlockReason::BalanceInconsistent(format!("validation could not complete: {}", err));
    results.push(GateResult {
        gate,
        passed: false,
        reason: reason.to_string(),
    });
    reason
}
