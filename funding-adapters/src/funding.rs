//! Funding orchestration
//!
//! Bridges wallet credit into external ad accounts. The debit and the
//! downstream API call cannot be atomic across a third party, so the
//! failure pattern is compensating: debit, attempt the downstream call,
//! credit back on failure. A funding request never reaches the debit
//! without passing the full gate pipeline, and the confirmation gate is
//! surfaced to the caller rather than bypassed.

use crate::{
    connector::AdPlatformConnector,
    types::{FundingOutcome, FundingReceipt, FundingRequest},
    Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use security_gates::{BlockReason, PaymentValidationRequest, SecurityPipeline};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use wallet_core::{
    AuditSource, Balance, CreditPool, LedgerTransaction, TxSource, UserId, WalletLedger,
};

/// Funding entry point over the registered platform connectors
pub struct FundingService {
    ledger: Arc<WalletLedger>,
    pipeline: Arc<SecurityPipeline>,
    connectors: HashMap<CreditPool, Arc<dyn AdPlatformConnector>>,
}

impl FundingService {
    /// Create the service with no connectors registered
    pub fn new(ledger: Arc<WalletLedger>, pipeline: Arc<SecurityPipeline>) -> Self {
        Self {
            ledger,
            pipeline,
            connectors: HashMap::new(),
        }
    }

    /// Register a platform connector under its pool
    pub fn register_connector(&mut self, connector: Arc<dyn AdPlatformConnector>) {
        self.connectors.insert(connector.platform(), connector);
    }

    /// Handle a user funding request end to end: validate the request
    /// shape, run the gate pipeline, then debit and push funds downstream.
    pub async fn request_funding(&self, request: &FundingRequest) -> Result<FundingOutcome> {
        if request.currency != request.pool.currency() {
            return Err(Error::CurrencyMismatch {
                requested: request.currency.code().to_string(),
                pool: request.pool,
                expected: request.pool.currency().code().to_string(),
            });
        }

        let connector = self
            .connectors
            .get(&request.pool)
            .ok_or(Error::NoConnector(request.pool))?;
        connector.validate_account_ref(&request.external_account_id)?;

        let report = self
            .pipeline
            .validate(&PaymentValidationRequest {
                user_id: request.user_id.clone(),
                pool: request.pool,
                amount: request.amount,
                intent_id: request.intent_id.clone(),
                charge_submitted: false,
            })
            .await?;

        if let Some(reason) = report.reason {
            return Ok(match reason {
                BlockReason::RequiresConfirmation { intent_id } => {
                    FundingOutcome::ConfirmationRequired {
                        summary: payment_summary(request),
                        intent_id,
                    }
                }
                other => FundingOutcome::Blocked {
                    reason: other,
                    gate_results: report.gate_results,
                },
            });
        }

        let (receipt, wallet_balance) = self
            .fund_account(
                &request.user_id,
                request.pool,
                &request.external_account_id,
                request.amount,
            )
            .await?;

        Ok(FundingOutcome::Funded {
            receipt,
            wallet_balance,
        })
    }

    /// Debit the wallet and push funds downstream, compensating on failure.
    ///
    /// On downstream failure the wallet balance after this call equals the
    /// balance before it, with the debit and the compensating credit both
    /// present in the ledger.
    pub async fn fund_account(
        &self,
        user_id: &UserId,
        pool: CreditPool,
        external_account_id: &str,
        amount: Decimal,
    ) -> Result<(FundingReceipt, Balance)> {
        let connector = self.connectors.get(&pool).ok_or(Error::NoConnector(pool))?;

        connector.validate_account_ref(external_account_id)?;
        let account = connector.validate_account(external_account_id).await?;

        let debit_description = format!("fund {} account {}", connector.name(), account.account_ref);
        let balance = self
            .ledger
            .debit(user_id, pool, amount, None, TxSource::FundingAdapter, &debit_description)
            .await?;

        match connector.add_funds(external_account_id, amount).await {
            Ok(receipt) => {
                self.append_audit(user_id, pool, amount, external_account_id, Ok(&receipt))?;
                tracing::info!(
                    user_id = %user_id,
                    pool = %pool,
                    amount = %amount,
                    account = external_account_id,
                    "Ad account funded from wallet"
                );
                Ok((receipt, balance))
            }
            Err(downstream) => {
                // Compensating credit: restore the debited amount before
                // reporting the failure
                let credit_description = format!(
                    "compensating credit for failed funding of {} account {}",
                    connector.name(),
                    external_account_id
                );
                self.ledger
                    .credit(user_id, pool, amount, None, TxSource::Refund, &credit_description)
                    .await?;

                let detail = downstream.to_string();
                self.append_audit(user_id, pool, amount, external_account_id, Err(&detail))?;

                tracing::error!(
                    user_id = %user_id,
                    pool = %pool,
                    amount = %amount,
                    account = external_account_id,
                    error = %detail,
                    "Downstream funding failed, wallet compensated"
                );

                Err(Error::DownstreamFundingFailed {
                    platform: pool,
                    detail,
                })
            }
        }
    }

    /// Funding-related ledger history for a (user, pool): adapter debits
    /// and their compensating credits
    pub async fn funding_history(
        &self,
        user_id: &UserId,
        pool: CreditPool,
    ) -> Result<Vec<LedgerTransaction>> {
        let txs = self.ledger.transactions(user_id, pool).await?;
        Ok(txs
            .into_iter()
            .filter(|tx| matches!(tx.source, TxSource::FundingAdapter | TxSource::Refund))
            .collect())
    }

    fn append_audit(
        &self,
        user_id: &UserId,
        pool: CreditPool,
        amount: Decimal,
        external_account_id: &str,
        result: std::result::Result<&FundingReceipt, &str>,
    ) -> Result<()> {
        let entry = match result {
            Ok(receipt) => json!({
                "timestamp": Utc::now().to_rfc3339(),
                "user_id": user_id.as_str(),
                "pool": pool.as_str(),
                "amount": amount.to_string(),
                "external_account_id": external_account_id,
                "status": "funded",
                "platform_ref": receipt.platform_ref,
            }),
            Err(detail) => json!({
                "timestamp": Utc::now().to_rfc3339(),
                "user_id": user_id.as_str(),
                "pool": pool.as_str(),
                "amount": amount.to_string(),
                "external_account_id": external_account_id,
                "status": "error",
                "error": detail,
            }),
        };
        self.ledger.audit().append(AuditSource::FundingAdapters, entry)?;
        Ok(())
    }
}

/// Human-readable summary shown to the user at the confirmation step
fn payment_summary(request: &FundingRequest) -> String {
    format!(
        "Fund {} account {} with {} {} from your {} credit",
        match request.pool {
            CreditPool::FacebookAds => "Facebook Ads",
            CreditPool::GoogleAds => "Google Ads",
            other => other.as_str(),
        },
        request.external_account_id,
        request.amount,
        request.currency,
        request.pool
    )
}
