//! HTTP clients for the price and transaction-history upstreams

pub mod coingecko_client;
pub mod explorer_client;

pub use coingecko_client::CoinGeckoClient;
pub use explorer_client::ExplorerHistoryClient;

use reqwest::StatusCode;
use std::time::Duration;

use crate::shared::errors::FetchError;

/// History is never served from an intermediate cache
pub const HISTORY_CACHE_CONTROL: &str = "no-store";

/// Revalidation hint for price requests, matching the freshness window
pub fn price_cache_control(freshness: Duration) -> String {
    format!("max-age={}", freshness.as_secs())
}

/// Any non-2xx upstream status is a failed fetch
pub fn check_status(status: StatusCode) -> Result<(), FetchError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(FetchError::Http(status.as_u16()))
    }
}
