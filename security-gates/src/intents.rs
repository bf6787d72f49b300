//! Payment intents and explicit user confirmation
//!
//! Every payment starts as an intent that must be confirmed by the user
//! before the confirmation gate lets it through. There is no bypass: an
//! unconfirmed or unknown intent always blocks.

use crate::{Error, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;
use wallet_core::{CreditPool, PaymentIntentRecord, Storage, UserId};

/// Intent lifecycle service
#[derive(Debug, Clone)]
pub struct IntentService {
    storage: Arc<Storage>,
}

impl IntentService {
    /// Create the service over shared storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Create a new unconfirmed intent and return its record
    pub fn create_intent(
        &self,
        user_id: &UserId,
        pool: CreditPool,
        amount: Decimal,
    ) -> Result<PaymentIntentRecord> {
        let intent = PaymentIntentRecord {
            intent_id: format!("pi_{}", Uuid::now_v7().simple()),
            user_id: user_id.clone(),
            pool,
            amount,
            currency: pool.currency(),
            created_at: Utc::now(),
            confirmed_at: None,
        };
        self.storage.put_intent(&intent)?;

        tracing::info!(
            intent_id = %intent.intent_id,
            user_id = %user_id,
            pool = %pool,
            amount = %amount,
            "Payment intent created"
        );

        Ok(intent)
    }

    /// Record the user's explicit confirmation of an intent.
    ///
    /// Confirming an already-confirmed intent is a no-op and keeps the
    /// original confirmation time.
    pub fn record_confirmation(&self, intent_id: &str) -> Result<PaymentIntentRecord> {
        let mut intent = self
            .storage
            .get_intent(intent_id)?
            .ok_or_else(|| Error::Wallet(wallet_core::Error::IntentNotFound(intent_id.to_string())))?;

        if intent.confirmed_at.is_none() {
            intent.confirmed_at = Some(Utc::now());
            self.storage.put_intent(&intent)?;
            tracing::info!(intent_id = %intent_id, "Payment intent confirmed");
        }

        Ok(intent)
    }

    /// Whether an intent exists and carries a confirmation
    pub fn is_confirmed(&self, intent_id: &str) -> Result<bool> {
        Ok(self
            .storage
            .get_intent(intent_id)?
            .map(|intent| intent.confirmed_at.is_some())
            .unwrap_or(false))
    }

    /// Look up an intent record
    pub fn get(&self, intent_id: &str) -> Result<Option<PaymentIntentRecord>> {
        Ok(self.storage.get_intent(intent_id)?)
    }
}
