use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CACHE_CONTROL;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{check_status, price_cache_control};
use crate::domain::price::PriceSource;
use crate::shared::config::SyncConfig;
use crate::shared::errors::FetchError;
use crate::shared::types::{FiatRate, PriceQuote};

/// `{ <asset>: { <currency>: number, <currency>_24h_change: number } }`
type SimplePriceBody = HashMap<String, HashMap<String, Option<f64>>>;

/// CoinGecko `simple/price` client
pub struct CoinGeckoClient {
    http_client: Client,
    base_url: String,
    asset_id: String,
    primary_currency: String,
    secondary_currency: String,
    /// Sent as the server-side revalidation hint
    revalidate: Duration,
}

impl CoinGeckoClient {
    pub fn from_config(config: &SyncConfig) -> Result<Self, FetchError> {
        let http_client = Client::builder().timeout(config.upstream_timeout).build()?;

        Ok(Self {
            http_client,
            base_url: config.price_api_url.trim_end_matches('/').to_string(),
            asset_id: config.asset_id.clone(),
            primary_currency: config.primary_currency.clone(),
            secondary_currency: config.secondary_currency.clone(),
            revalidate: config.freshness_window,
        })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn fetch_quote(&self) -> Result<PriceQuote, FetchError> {
        let url = format!("{}/simple/price", self.base_url);
        let currencies = format!("{},{}", self.primary_currency, self.secondary_currency);

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("ids", self.asset_id.as_str()),
                ("vs_currencies", currencies.as_str()),
                ("include_24hr_change", "true"),
            ])
            .header(CACHE_CONTROL, price_cache_control(self.revalidate))
            .send()
            .await?;

        check_status(response.status())?;

        let body = response.text().await?;
        debug!("CoinGecko response: {}", body);

        parse_price_body(
            &body,
            &self.asset_id,
            &self.primary_currency,
            &self.secondary_currency,
            Utc::now(),
        )
    }

    fn name(&self) -> &str {
        "CoinGecko"
    }
}

fn parse_price_body(
    body: &str,
    asset_id: &str,
    primary: &str,
    secondary: &str,
    observed_at: DateTime<Utc>,
) -> Result<PriceQuote, FetchError> {
    let parsed: SimplePriceBody = serde_json::from_str(body)?;
    let prices = parsed
        .get(asset_id)
        .ok_or_else(|| FetchError::Parse(format!("no prices for {}", asset_id)))?;

    let rate = |currency: &str| {
        prices
            .get(currency)
            .copied()
            .flatten()
            .ok_or_else(|| FetchError::Parse(format!("no {} rate for {}", currency, asset_id)))
    };
    let change = [secondary, primary]
        .iter()
        .find_map(|currency| prices.get(&format!("{}_24h_change", currency)).copied().flatten())
        .unwrap_or(0.0);

    Ok(PriceQuote::new(
        asset_id,
        FiatRate::new(primary, rate(primary)?),
        FiatRate::new(secondary, rate(secondary)?),
        change,
        observed_at,
    ))
}
