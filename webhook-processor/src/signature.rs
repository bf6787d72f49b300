//! Webhook signature verification
//!
//! The processor signs each delivery with a header of the form
//! `t=<unix-seconds>,v1=<hex hmac>`, where the MAC is HMAC-SHA256 over
//! `"{timestamp}.{payload}"` keyed by the shared webhook secret. The
//! comparison is constant-time and the timestamp must fall within a
//! replay-protection tolerance window.

use crate::{Error, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Seconds a delivery's timestamp may differ from the local clock
const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verifies processor signatures on raw webhook payloads
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance_secs: i64,
}

impl SignatureVerifier {
    /// Create a verifier for the shared webhook secret
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Override the replay-protection tolerance
    pub fn with_tolerance_secs(mut self, secs: i64) -> Self {
        self.tolerance_secs = secs;
        self
    }

    /// Verify a delivery. Returns `InvalidSignature` for a missing or
    /// malformed header, a stale timestamp, or a MAC mismatch.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<()> {
        let (timestamp, candidates) = parse_header(header)?;

        let age = (Utc::now().timestamp() - timestamp).abs();
        if age > self.tolerance_secs {
            return Err(Error::InvalidSignature(format!(
                "timestamp outside tolerance ({}s old)",
                age
            )));
        }

        // verify_slice is constant-time; accept any matching v1 candidate
        for candidate in &candidates {
            let Ok(bytes) = hex::decode(candidate) else {
                continue;
            };
            let mut mac = HmacSha256::new_from_slice(&self.secret)
                .map_err(|e| Error::InvalidSignature(e.to_string()))?;
            mac.update(timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(payload);
            if mac.verify_slice(&bytes).is_ok() {
                return Ok(());
            }
        }

        Err(Error::InvalidSignature("no matching v1 signature".to_string()))
    }

    /// Produce a valid header for a payload, used by delivery simulators
    /// and tests.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("t={},v1={}", timestamp, signature)
    }
}

/// Parse `t=...,v1=...` into a timestamp and the v1 signature candidates
fn parse_header(header: &str) -> Result<(i64, Vec<String>)> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    Error::InvalidSignature("non-numeric timestamp".to_string())
                })?);
            }
            Some(("v1", value)) => candidates.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| Error::InvalidSignature("missing timestamp".to_string()))?;
    if candidates.is_empty() {
        return Err(Error::InvalidSignature("missing v1 signature".to_string()));
    }
    Ok((timestamp, candidates))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_signature_accepted() {
        let verifier = SignatureVerifier::new("whsec_test".as_bytes());
        let payload = br#"{"id":"evt_1"}"#;
        let header = verifier.sign(payload, Utc::now().timestamp());
        assert!(verifier.verify(payload, &header).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = SignatureVerifier::new("whsec_a".as_bytes());
        let verifier = SignatureVerifier::new("whsec_b".as_bytes());
        let payload = br#"{"id":"evt_1"}"#;
        let header = signer.sign(payload, Utc::now().timestamp());
        assert!(verifier.verify(payload, &header).is_err());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let verifier = SignatureVerifier::new("whsec_test".as_bytes());
        let header = verifier.sign(br#"{"id":"evt_1"}"#, Utc::now().timestamp());
        assert!(verifier.verify(br#"{"id":"evt_2"}"#, &header).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let verifier = SignatureVerifier::new("whsec_test".as_bytes());
        let payload = br#"{"id":"evt_1"}"#;
        let header = verifier.sign(payload, Utc::now().timestamp() - 3600);
        let err = verifier.verify(payload, &header).unwrap_err();
        assert!(err.to_string().contains("tolerance"));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let verifier = SignatureVerifier::new("whsec_test".as_bytes());
        assert!(verifier.verify(b"{}", "").is_err());
        assert!(verifier.verify(b"{}", "t=abc,v1=00").is_err());
        assert!(verifier.verify(b"{}", "v1=00").is_err());
    }
}
