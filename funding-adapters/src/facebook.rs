//! Facebook Ads funding connector
//!
//! Account references are ad-account ids of the form `act_<digits>`. Funds
//! are pushed through the platform's funding endpoint with a bounded
//! request timeout; a timed-out call is a failure the caller compensates.

use crate::{
    connector::AdPlatformConnector,
    types::{AccountInfo, FundingReceipt},
    Error, Result,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::json;
use std::time::Duration;
use wallet_core::CreditPool;

/// Facebook connector configuration
#[derive(Debug, Clone)]
pub struct FacebookConfig {
    /// API base endpoint
    pub api_endpoint: String,
    /// OAuth access token
    pub access_token: String,
    /// Request timeout
    pub timeout_seconds: u64,
}

/// Facebook Ads connector
pub struct FacebookAdsConnector {
    config: FacebookConfig,
    client: Client,
}

impl FacebookAdsConnector {
    /// Create the connector
    pub fn new(config: FacebookConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn invalid(&self, detail: impl Into<String>) -> Error {
        Error::InvalidAccountRef {
            platform: CreditPool::FacebookAds,
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl AdPlatformConnector for FacebookAdsConnector {
    fn platform(&self) -> CreditPool {
        CreditPool::FacebookAds
    }

    fn name(&self) -> &str {
        "facebook-ads"
    }

    fn validate_account_ref(&self, account_ref: &str) -> Result<()> {
        let digits = account_ref
            .strip_prefix("act_")
            .ok_or_else(|| self.invalid("expected act_<digits>"))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(self.invalid("expected act_<digits>"));
        }
        Ok(())
    }

    async fn validate_account(&self, account_ref: &str) -> Result<AccountInfo> {
        self.validate_account_ref(account_ref)?;

        let url = format!("{}/{}", self.config.api_endpoint, account_ref);
        let response = self
            .client
            .get(&url)
            .query(&[("fields", "name,account_status")])
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(Error::PlatformApi {
                status_code: status,
                message,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(AccountInfo {
            account_ref: account_ref.to_string(),
            name: body.get("name").and_then(|v| v.as_str()).map(String::from),
            status: body
                .get("account_status")
                .map(|v| v.to_string().trim_matches('"').to_string()),
        })
    }

    async fn add_funds(&self, account_ref: &str, amount: Decimal) -> Result<FundingReceipt> {
        let url = format!("{}/{}/funding", self.config.api_endpoint, account_ref);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .json(&json!({
                "amount": amount.to_string(),
                "currency": CreditPool::FacebookAds.currency().code(),
            }))
            .send()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(Error::PlatformApi {
                status_code: status,
                message,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        let platform_ref = body
            .get("funding_id")
            .and_then(|v| v.as_str())
            .unwrap_or(account_ref)
            .to_string();

        tracing::info!(
            account_ref,
            amount = %amount,
            platform_ref,
            "Facebook ad account funded"
        );

        Ok(FundingReceipt {
            platform: CreditPool::FacebookAds,
            external_account_id: account_ref.to_string(),
            amount,
            currency: CreditPool::FacebookAds.currency(),
            platform_ref,
            completed_at: Utc::now(),
        })
    }
}
