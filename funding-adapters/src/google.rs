//! Google Ads funding connector
//!
//! Account references are customer ids of the form `ddd-ddd-dddd`.

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

/// Google connector configuration
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// API base endpoint
    pub api_endpoint: String,
    /// Developer token
    pub developer_token: String,
    /// Request timeout
    pub timeout_seconds: u64,
}

/// Google Ads connector
pub struct GoogleAdsConnector {
    config: GoogleConfig,
    client: Client,
}

impl GoogleAdsConnector {
    /// Create the connector
    pub fn new(config: GoogleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn invalid(&self, detail: impl Into<String>) -> Error {
        Error::InvalidAccountRef {
            platform: CreditPool::GoogleAds,
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl AdPlatformConnector for GoogleAdsConnector {
    fn platform(&self) -> CreditPool {
        CreditPool::GoogleAds
    }

    fn name(&self) -> &str {
        "google-ads"
    }

    fn validate_account_ref(&self, account_ref: &str) -> Result<()> {
        let groups: Vec<&str> = account_ref.split('-').collect();
        let shape_ok = groups.len() == 3
            && groups[0].len() == 3
            && groups[1].len() == 3
            && groups[2].len() == 4
            && groups
                .iter()
                .all(|g| g.bytes().all(|b| b.is_ascii_digit()));
        if !shape_ok {
            return Err(self.invalid("expected customer id of the form 123-456-7890"));
        }
        Ok(())
    }

    async fn validate_account(&self, account_ref: &str) -> Result<AccountInfo> {
        self.validate_account_ref(account_ref)?;

        let url = format!("{}/customers/{}", self.config.api_endpoint, account_ref);
        let response = self
            .client
            .get(&url)
            .header("developer-token", &self.config.developer_token)
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
            name: body
                .get("descriptiveName")
                .and_then(|v| v.as_str())
                .map(String::from),
            status: body.get("status").and_then(|v| v.as_str()).map(String::from),
        })
    }

    async fn add_funds(&self, account_ref: &str, amount: Decimal) -> Result<FundingReceipt> {
        let url = format!(
            "{}/customers/{}/accountBudgets",
            self.config.api_endpoint, account_ref
        );
        let response = self
            .client
            .post(&url)
            .header("developer-token", &self.config.developer_token)
            .json(&json!({
                "amount": amount.to_string(),
                "currency": CreditPool::GoogleAds.currency().code(),
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
            .get("resourceName")
            .and_then(|v| v.as_str())
            .unwrap_or(account_ref)
            .to_string();

        tracing::info!(
            account_ref,
            amount = %amount,
            platform_ref,
            "Google ad account funded"
        );

        Ok(FundingReceipt {
            platform: CreditPool::GoogleAds,
            external_account_id: account_ref.to_string(),
            amount,
            currency: CreditPool::GoogleAds.currency(),
            platform_ref,
            completed_at: Utc::now(),
        })
    }
}
