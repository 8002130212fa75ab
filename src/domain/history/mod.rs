//! History domain - per-account transaction list with coalesced refreshes

mod transaction_aggregator;

pub use transaction_aggregator::TransactionAggregator;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::domain::chain::HistoryRequest;
use crate::shared::config::SyncConfig;
use crate::shared::errors::FetchError;
use crate::shared::types::TransactionRecord;

/// Executes a routed history request and returns the raw response body
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch(&self, request: &HistoryRequest) -> Result<String, FetchError>;
}

/// Identity of one history list: account (case-insensitive) on one chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HistoryKey {
    pub account: String,
    pub chain_id: u64,
}

impl HistoryKey {
    pub fn new(account: &str, chain_id: u64) -> Self {
        Self {
            account: account.trim().to_ascii_lowercase(),
            chain_id,
        }
    }
}

/// What the history panel shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HistoryState {
    /// No account selected or nothing requested yet
    Idle,
    /// First fetch for the active key is running
    Loading,
    /// Manual or periodic refresh running while previous records stay visible
    Refreshing(Vec<TransactionRecord>),
    Loaded(Vec<TransactionRecord>),
    /// The upstream confirmed there are no transactions
    Empty,
    Error(String),
}

impl HistoryState {
    pub fn records(&self) -> &[TransactionRecord] {
        match self {
            HistoryState::Refreshing(records) | HistoryState::Loaded(records) => records,
            _ => &[],
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, HistoryState::Loading | HistoryState::Refreshing(_))
    }
}

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub limit: usize,
    pub upstream_timeout: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for HistoryConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            limit: config.history_limit,
            upstream_timeout: config.upstream_timeout,
        }
    }
}
