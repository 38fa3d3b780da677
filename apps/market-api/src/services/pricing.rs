//! Pricing API client.
//!
//! `GET <SKINPORT_API_URL>/items?app_id=&currency=&tradable=` returns the
//! cheapest offer per item for one app in one tradable state.

use std::time::Duration;

use async_trait::async_trait;
use market_core::types::{Currency, SkinportItem};
use tracing::{debug, instrument};

/// Pricing API failures.
#[derive(Debug, thiserror::Error)]
pub enum PriceSourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
}

/// Source of per-item minimum prices.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_items(
        &self,
        app_id: u32,
        currency: Currency,
        tradable: bool,
    ) -> Result<Vec<SkinportItem>, PriceSourceError>;
}

/// HTTP client for the Skinport public API.
#[derive(Debug, Clone)]
pub struct SkinportClient {
    http: reqwest::Client,
    base_url: String,
}

impl SkinportClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PriceSourceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(SkinportClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn items_url(&self) -> String {
        format!("{}/items", self.base_url)
    }
}

#[async_trait]
impl PriceSource for SkinportClient {
    #[instrument(skip(self))]
    async fn fetch_items(
        &self,
        app_id: u32,
        currency: Currency,
        tradable: bool,
    ) -> Result<Vec<SkinportItem>, PriceSourceError> {
        let url = self.items_url();
        let response = self
            .http
            .get(&url)
            .query(&[
                ("app_id", app_id.to_string()),
                ("currency", currency.code().to_string()),
                ("tradable", tradable.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceSourceError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let items: Vec<SkinportItem> = response.json().await?;
        debug!(count = items.len(), "Fetched items from pricing API");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_url_drops_trailing_slash() {
        let client =
            SkinportClient::new("https://api.skinport.com/v1/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.items_url(), "https://api.skinport.com/v1/items");
    }
}
