//! Idempotent webhook event pipeline
//!
//! Every delivery passes signature verification, envelope parsing, then a
//! per-event-id critical section. The external event id is the idempotency
//! key: a delivery seen before returns the recorded outcome without
//! touching the ledger, so at-least-once delivery from the processor
//! becomes exactly-once application.
//!
//! Failure handling splits three ways:
//! - bad signature / malformed payload: error, nothing stored, delivery
//!   will be retried
//! - incomplete or inconsistent event content: a Rejected record is stored
//!   and the delivery is acknowledged, since a retry cannot fix the content
//! - refund that cannot be applied: a record is stored and a
//!   reconciliation error is raised for manual review

use crate::{
    event::{
        ProcessorEvent, EVENT_CHARGE_REFUNDED, EVENT_PAYMENT_FAILED, EVENT_PAYMENT_SUCCEEDED,
    },
    signature::SignatureVerifier,
    Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use wallet_core::{
    AuditSource, CreditPool, KeyedLocks, TxSource, UserId, WalletLedger, WebhookEventRecord,
    WebhookStatus,
};

/// Result of handling one delivery
#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    /// External event id
    pub event_id: String,
    /// Event type string
    pub event_type: String,
    /// How the event was resolved
    pub status: WebhookStatus,
    /// Processor transaction reference, when the event carried one
    pub transaction_ref: Option<String>,
    /// Ledger transaction the event was applied as, if any
    pub ledger_transaction_id: Option<Uuid>,
    /// Resolution detail
    pub detail: Option<String>,
}

impl WebhookOutcome {
    fn from_record(record: &WebhookEventRecord) -> Self {
        Self {
            event_id: record.event_id.clone(),
            event_type: record.event_type.clone(),
            status: record.status,
            transaction_ref: record.transaction_ref.clone(),
            ledger_transaction_id: record.ledger_transaction_id,
            detail: record.detail.clone(),
        }
    }
}

/// Webhook delivery handler
#[derive(Debug)]
pub struct WebhookProcessor {
    ledger: Arc<WalletLedger>,
    verifier: SignatureVerifier,
    event_locks: KeyedLocks<String>,
}

impl WebhookProcessor {
    /// Create the processor over the shared ledger
    pub fn new(ledger: Arc<WalletLedger>, verifier: SignatureVerifier) -> Self {
        Self {
            ledger,
            verifier,
            event_locks: KeyedLocks::new(),
        }
    }

    /// Handle one raw delivery: verify, parse, then apply under the
    /// per-event lock.
    pub async fn handle_delivery(&self, payload: &[u8], signature: &str) -> Result<WebhookOutcome> {
        self.verifier.verify(payload, signature)?;
        let event = ProcessorEvent::parse(payload)?;
        self.process_event(event).await
    }

    /// Apply an already-verified event
    pub async fn process_event(&self, event: ProcessorEvent) -> Result<WebhookOutcome> {
        let _guard = self.event_locks.acquire(event.id.clone()).await;

        // Idempotency: a seen event returns its original recorded outcome
        if let Some(record) = self.ledger.storage().get_webhook_record(&event.id)? {
            tracing::info!(
                event_id = %event.id,
                status = ?record.status,
                "Duplicate webhook delivery, returning recorded outcome"
            );
            return Ok(WebhookOutcome::from_record(&record));
        }

        match event.event_type.as_str() {
            EVENT_PAYMENT_SUCCEEDED => self.apply_payment(&event).await,
            EVENT_CHARGE_REFUNDED => self.apply_refund(&event).await,
            EVENT_PAYMENT_FAILED => {
                let detail = event
                    .data
                    .object
                    .failure_message()
                    .unwrap_or_else(|| "payment failed".to_string());
                self.store_outcome(&event, WebhookStatus::Recorded, None, Some(detail))
            }
            other => {
                tracing::debug!(event_id = %event.id, event_type = other, "Ignoring event type");
                self.store_outcome(
                    &event,
                    WebhookStatus::Recorded,
                    None,
                    Some(format!("ignored event type {}", other)),
                )
            }
        }
    }

    async fn apply_payment(&self, event: &ProcessorEvent) -> Result<WebhookOutcome> {
        let (user_id, pool, amount) = match self.extract_wallet_target(event, false) {
            Ok(target) => target,
            Err(detail) => {
                return self.store_outcome(event, WebhookStatus::Rejected, None, Some(detail))
            }
        };

        let description = format!("processor payment {}", event.data.object.id);
        match self
            .ledger
            .credit(
                &user_id,
                pool,
                amount,
                Some(&event.id),
                TxSource::Webhook,
                &description,
            )
            .await
        {
            Ok(balance) => {
                tracing::info!(
                    event_id = %event.id,
                    user_id = %user_id,
                    pool = %pool,
                    amount = %amount,
                    new_balance = %balance.amount,
                    "Webhook payment applied"
                );
                let tx_id = self.ledger.storage().applied_transaction(&event.id)?;
                self.store_outcome(event, WebhookStatus::Applied, tx_id, None)
            }
            // Idempotency marker exists but the event record write was lost
            // (crash between the two writes): the mutation already happened
            Err(wallet_core::Error::DuplicateEvent(_)) => {
                let tx_id = self.ledger.storage().applied_transaction(&event.id)?;
                self.store_outcome(
                    event,
                    WebhookStatus::Deduplicated,
                    tx_id,
                    Some("event already applied".to_string()),
                )
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn apply_refund(&self, event: &ProcessorEvent) -> Result<WebhookOutcome> {
        let (user_id, pool, amount) = match self.extract_wallet_target(event, true) {
            Ok(target) => target,
            Err(detail) => {
                return self.store_outcome(event, WebhookStatus::Rejected, None, Some(detail))
            }
        };

        let description = format!("processor refund {}", event.data.object.id);
        match self
            .ledger
            .debit(
                &user_id,
                pool,
                amount,
                Some(&event.id),
                TxSource::Refund,
                &description,
            )
            .await
        {
            Ok(balance) => {
                tracing::info!(
                    event_id = %event.id,
                    user_id = %user_id,
                    pool = %pool,
                    amount = %amount,
                    new_balance = %balance.amount,
                    "Webhook refund applied"
                );
                let tx_id = self.ledger.storage().applied_transaction(&event.id)?;
                self.store_outcome(event, WebhookStatus::Applied, tx_id, None)
            }
            // Same crash window as the payment path: the debit committed but
            // the event record write was lost
            Err(wallet_core::Error::DuplicateEvent(_)) => {
                let tx_id = self.ledger.storage().applied_transaction(&event.id)?;
                self.store_outcome(
                    event,
                    WebhookStatus::Deduplicated,
                    tx_id,
                    Some("event already applied".to_string()),
                )
            }
            Err(wallet_core::Error::InsufficientFunds { available, .. }) => {
                let detail = format!(
                    "refund {} exceeds remaining balance {}, manual reconciliation required",
                    amount, available
                );
                self.store_outcome(event, WebhookStatus::Rejected, None, Some(detail.clone()))?;
                Err(Error::Reconciliation {
                    event_id: event.id.clone(),
                    detail,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Pull (user, pool, amount) out of an event's object, or describe what
    /// is missing. Refunds read `amount_refunded`, payments read `amount`.
    fn extract_wallet_target(
        &self,
        event: &ProcessorEvent,
        refund: bool,
    ) -> std::result::Result<(UserId, CreditPool, Decimal), String> {
        let object = &event.data.object;

        let amount = if refund {
            object.amount_refunded_decimal()
        } else {
            object.amount_decimal()
        }
        .ok_or_else(|| "incomplete metadata: missing amount".to_string())?;
        if amount <= Decimal::ZERO {
            return Err(format!("invalid amount {}", amount));
        }

        let user_id = object
            .metadata
            .get("user_id")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| "incomplete metadata: missing user_id".to_string())?;

        let pool_name = object
            .metadata
            .get("credit_type")
            .ok_or_else(|| "incomplete metadata: missing credit_type".to_string())?;
        let pool =
            CreditPool::parse(pool_name).map_err(|_| format!("unknown credit pool {}", pool_name))?;

        if let Some(ref currency) = object.currency {
            if !currency.eq_ignore_ascii_case(pool.currency().code()) {
                return Err(format!(
                    "currency {} does not match pool currency {}",
                    currency,
                    pool.currency()
                ));
            }
        }

        Ok((UserId::new(user_id.clone()), pool, amount))
    }

    /// Persist the event record and its audit entry, and build the outcome.
    ///
    /// Only an applied payment event confirms the charge for the webhook
    /// confirmation gate; a refund mutation must not.
    fn store_outcome(
        &self,
        event: &ProcessorEvent,
        status: WebhookStatus,
        ledger_transaction_id: Option<Uuid>,
        detail: Option<String>,
    ) -> Result<WebhookOutcome> {
        let record = WebhookEventRecord {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            status,
            processed_at: Utc::now(),
            transaction_ref: Some(event.data.object.id.clone()),
            ledger_transaction_id,
            detail,
        };
        let confirms_charge =
            event.event_type == EVENT_PAYMENT_SUCCEEDED && ledger_transaction_id.is_some();
        self.ledger.storage().put_webhook_record(&record, confirms_charge)?;

        self.ledger.audit().append(
            AuditSource::WebhookEvents,
            json!({
                "timestamp": record.processed_at.to_rfc3339(),
                "event_id": record.event_id,
                "event_type": record.event_type,
                "status": status_str(status),
                "transaction_ref": record.transaction_ref,
                "ledger_transaction_id": record.ledger_transaction_id,
                "detail": record.detail,
            }),
        )?;

        if status == WebhookStatus::Rejected {
            tracing::warn!(
                event_id = %record.event_id,
                detail = record.detail.as_deref().unwrap_or(""),
                "Webhook event rejected"
            );
        }

        Ok(WebhookOutcome::from_record(&record))
    }
}

fn status_str(status: WebhookStatus) -> &'static str {
    match status {
        WebhookStatus::Applied => "applied",
        WebhookStatus::Deduplicated => "deduplicated",
        WebhookStatus::Rejected => "rejected",
        WebhookStatus::Recorded => "recorded",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wallet_core::{AuditWriter, Config, Storage};

    const SECRET: &str = "whsec_test_secret";

    fn test_processor() -> (WebhookProcessor, Arc<WalletLedger>, TempDir) {
        let temp = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp.path().join("db"),
            audit_log_dir: temp.path().join("audit"),
            ..Default::default()
        };
        let storage = Arc::new(Storage::open(&config).unwrap());
        let audit = Arc::new(AuditWriter::new(&config.audit_log_dir).unwrap());
        let ledger = Arc::new(WalletLedger::new(storage, audit));
        let processor = WebhookProcessor::new(ledger.clone(), SignatureVerifier::new(SECRET));
        (processor, ledger, temp)
    }

    fn payment_event(event_id: &str, amount_cents: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": event_id,
            "type": "payment_succeeded",
            "data": {
                "object": {
                    "id": "pi_1",
                    "amount": amount_cents,
                    "currency": "brl",
                    "metadata": {"user_id": "user_1", "credit_type": "FACEBOOK_ADS"}
                }
            }
        }))
        .unwrap()
    }

    fn refund_event(event_id: &str, refunded_cents: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": event_id,
            "type": "charge_refunded",
            "data": {
                "object": {
                    "id": "ch_1",
                    "amount": refunded_cents,
                    "amount_refunded": refunded_cents,
                    "currency": "brl",
                    "metadata": {"user_id": "user_1", "credit_type": "FACEBOOK_ADS"}
                }
            }
        }))
        .unwrap()
    }

    async fn deliver(processor: &WebhookProcessor, payload: &[u8]) -> Result<WebhookOutcome> {
        let signature = SignatureVerifier::new(SECRET).sign(payload, Utc::now().timestamp());
        processor.handle_delivery(payload, &signature).await
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_payment_credits_wallet() {
        let (processor, ledger, _temp) = test_processor();

        let outcome = deliver(&processor, &payment_event("evt_1", 5000)).await.unwrap();
        assert_eq!(outcome.status, WebhookStatus::Applied);
        assert!(outcome.ledger_transaction_id.is_some());

        let balance = ledger
            .balance(&UserId::new("user_1"), CreditPool::FacebookAds)
            .await
            .unwrap();
        assert_eq!(balance.amount, dec("50.00"));
    }

    #[tokio::test]
    async fn test_duplicate_delivery_returns_original_outcome() {
        let (processor, ledger, _temp) = test_processor();
        let payload = payment_event("evt_1", 5000);

        let first = deliver(&processor, &payload).await.unwrap();
        let second = deliver(&processor, &payload).await.unwrap();

        assert_eq!(first.status, second.status);
        assert_eq!(first.ledger_transaction_id, second.ledger_transaction_id);

        // Exactly one balance mutation
        let balance = ledger
            .balance(&UserId::new("user_1"), CreditPool::FacebookAds)
            .await
            .unwrap();
        assert_eq!(balance.amount, dec("50.00"));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_deliveries_single_mutation() {
        let (processor, ledger, _temp) = test_processor();
        let processor = Arc::new(processor);
        let payload = payment_event("evt_1", 5000);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let processor = processor.clone();
            let payload = payload.clone();
            handles.push(tokio::spawn(async move {
                deliver(&processor, &payload).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        let balance = ledger
            .balance(&UserId::new("user_1"), CreditPool::FacebookAds)
            .await
            .unwrap();
        assert_eq!(balance.amount, dec("50.00"));
    }

    #[tokio::test]
    async fn test_invalid_signature_leaves_no_record() {
        let (processor, ledger, _temp) = test_processor();
        let payload = payment_event("evt_1", 5000);

        let result = processor.handle_delivery(&payload, "t=0,v1=00").await;
        assert!(matches!(result, Err(Error::InvalidSignature(_))));
        assert!(ledger.storage().get_webhook_record("evt_1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_metadata_rejected_and_acknowledged() {
        let (processor, ledger, _temp) = test_processor();
        let payload = serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": "payment_succeeded",
            "data": {
                "object": {
                    "id": "pi_1",
                    "amount": 5000,
                    "currency": "brl",
                    "metadata": {"credit_type": "FACEBOOK_ADS"}
                }
            }
        }))
        .unwrap();

        let outcome = deliver(&processor, &payload).await.unwrap();
        assert_eq!(outcome.status, WebhookStatus::Rejected);
        assert!(outcome.detail.unwrap().contains("user_id"));

        // No balance anywhere was touched
        let balance = ledger
            .balance(&UserId::new("user_1"), CreditPool::FacebookAds)
            .await
            .unwrap();
        assert_eq!(balance.amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_pool_rejected() {
        let (processor, _ledger, _temp) = test_processor();
        let payload = serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": "payment_succeeded",
            "data": {
                "object": {
                    "id": "pi_1",
                    "amount": 5000,
                    "metadata": {"user_id": "user_1", "credit_type": "BITCOIN"}
                }
            }
        }))
        .unwrap();

        let outcome = deliver(&processor, &payload).await.unwrap();
        assert_eq!(outcome.status, WebhookStatus::Rejected);
        assert!(outcome.detail.unwrap().contains("BITCOIN"));
    }

    #[tokio::test]
    async fn test_currency_mismatch_rejected() {
        let (processor, _ledger, _temp) = test_processor();
        let payload = serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": "payment_succeeded",
            "data": {
                "object": {
                    "id": "pi_1",
                    "amount": 5000,
                    "currency": "usd",
                    "metadata": {"user_id": "user_1", "credit_type": "FACEBOOK_ADS"}
                }
            }
        }))
        .unwrap();

        let outcome = deliver(&processor, &payload).await.unwrap();
        assert_eq!(outcome.status, WebhookStatus::Rejected);
    }

    #[tokio::test]
    async fn test_payment_failed_recorded_without_mutation() {
        let (processor, ledger, _temp) = test_processor();
        let payload = serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": "payment_failed",
            "data": {
                "object": {
                    "id": "pi_1",
                    "amount": 5000,
                    "metadata": {"user_id": "user_1", "credit_type": "FACEBOOK_ADS"},
                    "last_payment_error": {"message": "Your card was declined."}
                }
            }
        }))
        .unwrap();

        let outcome = deliver(&processor, &payload).await.unwrap();
        assert_eq!(outcome.status, WebhookStatus::Recorded);
        assert!(outcome.detail.unwrap().contains("declined"));

        let balance = ledger
            .balance(&UserId::new("user_1"), CreditPool::FacebookAds)
            .await
            .unwrap();
        assert_eq!(balance.amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_refund_debits_pool() {
        let (processor, ledger, _temp) = test_processor();

        deliver(&processor, &payment_event("evt_pay", 5000)).await.unwrap();
        let outcome = deliver(&processor, &refund_event("evt_refund", 2000)).await.unwrap();
        assert_eq!(outcome.status, WebhookStatus::Applied);
        assert!(outcome.ledger_transaction_id.is_some());

        let balance = ledger
            .balance(&UserId::new("user_1"), CreditPool::FacebookAds)
            .await
            .unwrap();
        assert_eq!(balance.amount, dec("30.00"));

        // The payment confirms its charge; the refund must not confirm
        // anything
        assert!(ledger.storage().has_processor_confirmation("pi_1").unwrap());
        assert!(!ledger.storage().has_processor_confirmation("ch_1").unwrap());
    }

    #[tokio::test]
    async fn test_refund_redelivery_after_partial_write_debits_once() {
        let (processor, ledger, _temp) = test_processor();
        let user = UserId::new("user_1");

        deliver(&processor, &payment_event("evt_pay", 5000)).await.unwrap();

        // The refund debit committed but the event record write was lost
        ledger
            .debit(
                &user,
                CreditPool::FacebookAds,
                dec("20.00"),
                Some("evt_refund"),
                TxSource::Refund,
                "processor refund ch_1",
            )
            .await
            .unwrap();
        assert!(ledger.storage().get_webhook_record("evt_refund").unwrap().is_none());

        let outcome = deliver(&processor, &refund_event("evt_refund", 2000)).await.unwrap();
        assert_eq!(outcome.status, WebhookStatus::Deduplicated);
        assert!(outcome.ledger_transaction_id.is_some());

        // The wallet was debited exactly once
        let balance = ledger.balance(&user, CreditPool::FacebookAds).await.unwrap();
        assert_eq!(balance.amount, dec("30.00"));

        // Redelivery after the record write returns the stored outcome
        let again = deliver(&processor, &refund_event("evt_refund", 2000)).await.unwrap();
        assert_eq!(again.status, WebhookStatus::Deduplicated);
        let balance = ledger.balance(&user, CreditPool::FacebookAds).await.unwrap();
        assert_eq!(balance.amount, dec("30.00"));
    }

    #[tokio::test]
    async fn test_refund_exceeding_balance_requires_reconciliation() {
        let (processor, ledger, _temp) = test_processor();

        deliver(&processor, &payment_event("evt_pay", 1000)).await.unwrap();
        let result = deliver(&processor, &refund_event("evt_refund", 5000)).await;
        assert!(matches!(result, Err(Error::Reconciliation { .. })));

        // The event is recorded for manual review, balance untouched
        let record = ledger
            .storage()
            .get_webhook_record("evt_refund")
            .unwrap()
            .unwrap();
        assert_eq!(record.status, WebhookStatus::Rejected);

        let balance = ledger
            .balance(&UserId::new("user_1"), CreditPool::FacebookAds)
            .await
            .unwrap();
        assert_eq!(balance.amount, dec("10.00"));
    }

    #[tokio::test]
    async fn test_unknown_event_type_recorded() {
        let (processor, _ledger, _temp) = test_processor();
        let payload = serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": "customer_updated",
            "data": {"object": {"id": "cus_1"}}
        }))
        .unwrap();

        let outcome = deliver(&processor, &payload).await.unwrap();
        assert_eq!(outcome.status, WebhookStatus::Recorded);
    }
}
