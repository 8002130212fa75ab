use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tracing::debug;

use crate::shared::errors::ConfigError;
use crate::shared::types::PriceQuote;

/// Maximum age at which a cached value is served without re-fetching
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(30);

/// Cadence of the periodic price and history refresh
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Upstream calls slower than this count as failed
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Transactions requested per history page
pub const HISTORY_LIMIT: usize = 10;

pub const DEFAULT_PRICE_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Mainnet chain id, the one whose history upstream needs a key
pub const MAINNET_CHAIN_ID: u64 = 1;

/// Process-wide, read-only settings of the synchronization layer
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub price_api_url: String,
    pub asset_id: String,
    pub primary_currency: String,
    pub secondary_currency: String,
    pub freshness_window: Duration,
    pub refresh_interval: Duration,
    pub upstream_timeout: Duration,
    pub history_limit: usize,
    /// Transaction-history API keys by chain id
    pub api_keys: HashMap<u64, String>,
    pub fallback_quote: PriceQuote,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            price_api_url: DEFAULT_PRICE_API_URL.to_string(),
            asset_id: "ethereum".to_string(),
            primary_currency: "eur".to_string(),
            secondary_currency: "usd".to_string(),
            freshness_window: FRESHNESS_WINDOW,
            refresh_interval: REFRESH_INTERVAL,
            upstream_timeout: UPSTREAM_TIMEOUT,
            history_limit: HISTORY_LIMIT,
            api_keys: HashMap::new(),
            fallback_quote: PriceQuote::fallback(),
        }
    }
}

impl SyncConfig {
    pub fn with_api_key(mut self, chain_id: u64, key: impl Into<String>) -> Self {
        self.api_keys.insert(chain_id, key.into());
        self
    }
}

/// Environment overlay for `SyncConfig`
pub struct ConfigLoader;

impl ConfigLoader {
    /// Apply `.env` and process environment on top of `config`.
    /// Empty variables count as unset.
    pub fn apply_env(mut config: SyncConfig) -> Result<SyncConfig, ConfigError> {
        dotenvy::dotenv().ok();

        if let Some(key) = non_empty_var("ETHERSCAN_API_KEY") {
            debug!("Using ETHERSCAN_API_KEY from environment");
            config.api_keys.insert(MAINNET_CHAIN_ID, key);
        }

        if let Some(url) = non_empty_var("PRICE_API_URL") {
            reqwest::Url::parse(&url)
                .map_err(|e| ConfigError::Invalid(format!("PRICE_API_URL: {}", e)))?;
            config.price_api_url = url;
        }

        if let Some(secs) = non_empty_var("HTTP_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("HTTP_TIMEOUT_SECS: {}", e)))?;
            config.upstream_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
