use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{check_status, HISTORY_CACHE_CONTROL};
use crate::domain::chain::HistoryRequest;
use crate::domain::history::HistorySource;
use crate::shared::errors::FetchError;

/// Executes routed history requests against Etherscan/Blockscout
pub struct ExplorerHistoryClient {
    http_client: Client,
}

impl ExplorerHistoryClient {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            http_client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl HistorySource for ExplorerHistoryClient {
    async fn fetch(&self, request: &HistoryRequest) -> Result<String, FetchError> {
        debug!("GET {:?}", request);

        let response = self
            .http_client
            .get(request.url.clone())
            .header(CACHE_CONTROL, HISTORY_CACHE_CONTROL)
            .send()
            .await?;

        check_status(response.status())?;

        Ok(response.text().await?)
    }
}
