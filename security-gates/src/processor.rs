//! Payment processor configuration
//!
//! The processor availability gate fails closed: empty keys, placeholder
//! keys, or keys with the wrong prefix all make the integration
//! unavailable, and no payment proceeds until real credentials are
//! configured.

use serde::{Deserialize, Serialize};

/// Markers that identify an unconfigured deployment
const PLACEHOLDER_MARKERS: [&str; 3] = ["PLACEHOLDER", "CHANGEME", "your_key_here"];

/// Payment processor credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// API secret key, `sk_` prefixed
    pub secret_key: String,
    /// Webhook signing secret, `whsec_` prefixed
    pub webhook_secret: String,
}

impl ProcessorConfig {
    /// Load credentials from the environment. Missing variables leave the
    /// field empty, which `availability()` reports as unavailable.
    pub fn from_env() -> Self {
        Self {
            secret_key: std::env::var("PROCESSOR_SECRET_KEY").unwrap_or_default(),
            webhook_secret: std::env::var("PROCESSOR_WEBHOOK_SECRET").unwrap_or_default(),
        }
    }

    /// Whether the processor integration is usable. Returns the reason it
    /// is not, or `None` when both keys look real.
    pub fn availability(&self) -> Option<String> {
        if let Some(reason) = Self::check_key(&self.secret_key, "sk_", "secret key") {
            return Some(reason);
        }
        Self::check_key(&self.webhook_secret, "whsec_", "webhook secret")
    }

    fn check_key(key: &str, prefix: &str, name: &str) -> Option<String> {
        if key.trim().is_empty() {
            return Some(format!("{} is not configured", name));
        }
        if !key.starts_with(prefix) {
            return Some(format!("{} has unexpected format", name));
        }
        if PLACEHOLDER_MARKERS
            .iter()
            .any(|marker| key.to_uppercase().contains(&marker.to_uppercase()))
        {
            return Some(format!("{} is a placeholder value", name));
        }
        None
    }
}
