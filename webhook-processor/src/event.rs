//! Processor event payloads
//!
//! Events arrive as JSON envelopes: an event id, a type string, and the
//! processor object the event is about. Only the fields the wallet needs
//! are modeled; everything else in the envelope is ignored.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Event types the pipeline acts on
pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment_succeeded";
/// Failed charge, recorded but never mutates a balance
pub const EVENT_PAYMENT_FAILED: &str = "payment_failed";
/// Refund issued by the processor, debits the credited pool
pub const EVENT_CHARGE_REFUNDED: &str = "charge_refunded";

/// Webhook event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorEvent {
    /// External event id, the idempotency key
    pub id: String,

    /// Event type string
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event payload
    pub data: EventData,
}

/// Payload wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    /// The processor object the event describes
    pub object: EventObject,
}

/// The charge / payment-intent object inside an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventObject {
    /// Processor transaction reference (payment intent or charge id)
    pub id: String,

    /// Charge amount in minor units (cents)
    #[serde(default)]
    pub amount: Option<i64>,

    /// Refunded amount in minor units, for refund events
    #[serde(default)]
    pub amount_refunded: Option<i64>,

    /// ISO currency code, lowercase on the wire
    #[serde(default)]
    pub currency: Option<String>,

    /// Caller-supplied metadata; the wallet requires `user_id` and
    /// `credit_type`
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Processor-side failure detail, present on failed charges
    #[serde(default)]
    pub last_payment_error: Option<serde_json::Value>,
}

impl ProcessorEvent {
    /// Parse a raw delivery body. Anything that does not deserialize into
    /// the envelope is a malformed payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| Error::MalformedPayload(e.to_string()))
    }
}

impl EventObject {
    /// Charge amount as an exact decimal in major units
    pub fn amount_decimal(&self) -> Option<Decimal> {
        self.amount.map(|cents| Decimal::new(cents, 2))
    }

    /// Refunded amount as an exact decimal in major units
    pub fn amount_refunded_decimal(&self) -> Option<Decimal> {
        self.amount_refunded.map(|cents| Decimal::new(cents, 2))
    }

    /// Failure detail flattened to a message, for audit records
    pub fn failure_message(&self) -> Option<String> {
        self.last_payment_error.as_ref().map(|err| {
            err.get("message")
                .and_then(|m| m.as_str())
                .map(String::from)
                .unwrap_or_else(|| err.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payment_succeeded() {
        let payload = br#"{
            "id": "evt_1",
            "type": "payment_succeeded",
            "data": {
                "object": {
                    "id": "pi_1",
                    "amount": 5000,
                    "currency": "brl",
                    "metadata": {"user_id": "user_1", "credit_type": "FACEBOOK_ADS"}
                }
            }
        }"#;

        let event = ProcessorEvent::parse(payload).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.event_type, EVENT_PAYMENT_SUCCEEDED);
        assert_eq!(event.data.object.amount_decimal().unwrap(), Decimal::new(5000, 2));
        assert_eq!(event.data.object.metadata["user_id"], "user_1");
    }

    #[test]
    fn test_parse_rejects_non_envelope() {
        assert!(ProcessorEvent::parse(b"not json").is_err());
        assert!(ProcessorEvent::parse(br#"{"id": "evt_1"}"#).is_err());
    }

    #[test]
    fn test_failure_message_prefers_message_field() {
        let payload = br#"{
            "id": "evt_2",
            "type": "payment_failed",
            "data": {
                "object": {
                    "id": "pi_2",
                    "amount": 1000,
                    "last_payment_error": {"code": "card_declined", "message": "Your card was declined."}
                }
            }
        }"#;

        let event = ProcessorEvent::parse(payload).unwrap();
        assert_eq!(
            event.data.object.failure_message().unwrap(),
            "Your card was declined."
        );
    }
}
