//! Price domain - cached spot quote with stale/fallback serving

mod price_feed;
mod rate_cache;

pub use price_feed::PriceSource;
pub use rate_cache::RateCache;

use crate::shared::config::SyncConfig;
use crate::shared::errors::FetchError;
use crate::shared::types::PriceQuote;
use serde::Serialize;
use std::time::Duration;

/// How a served quote was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuoteStatus {
    /// Fetched from the upstream by this refresh
    Live,
    /// Still inside the freshness window, no upstream call made
    Cached,
    /// Upstream failed, previous quote served
    Stale,
    /// Upstream failed and nothing was cached yet
    Fallback,
}

/// Result of `RateCache::refresh`; always carries a usable quote
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServedQuote {
    pub quote: PriceQuote,
    pub status: QuoteStatus,
    #[serde(skip)]
    pub error: Option<FetchError>,
}

impl ServedQuote {
    pub fn is_degraded(&self) -> bool {
        matches!(self.status, QuoteStatus::Stale | QuoteStatus::Fallback)
    }
}

/// Rate cache configuration
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    pub freshness_window: Duration,
    pub upstream_timeout: Duration,
    pub fallback: PriceQuote,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for RateCacheConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            freshness_window: config.freshness_window,
            upstream_timeout: config.upstream_timeout,
            fallback: config.fallback_quote.clone(),
        }
    }
}
