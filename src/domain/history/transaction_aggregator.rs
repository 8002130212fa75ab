//! Coalescing fetcher for the active account's transaction history

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{HistoryConfig, HistoryKey, HistorySource, HistoryState};
use crate::domain::chain::{normalize_history_response, ChainRouter, HistoryPage};
use crate::shared::errors::{FetchError, HistoryError};
use crate::shared::types::{CacheEntry, TransactionRecord};

type HistoryResult = Result<Vec<TransactionRecord>, HistoryError>;
type SharedFetch = Shared<BoxFuture<'static, HistoryResult>>;

/// Keeps the transaction list for one active (account, chain) key.
///
/// At most one upstream fetch runs per key; a refresh issued while one is
/// pending joins it. Results for a key that is no longer active are returned
/// to their caller but never applied to the visible state.
#[derive(Clone)]
pub struct TransactionAggregator {
    inner: Arc<Inner>,
}

struct Inner {
    router: Arc<ChainRouter>,
    source: Arc<dyn HistorySource>,
    config: HistoryConfig,
    state: Mutex<AggregatorState>,
}

struct AggregatorState {
    active: Option<HistoryKey>,
    status: HistoryState,
    store: HashMap<HistoryKey, CacheEntry<Vec<TransactionRecord>>>,
    in_flight: HashMap<HistoryKey, SharedFetch>,
}

impl AggregatorState {
    fn settled_status(&self, key: &HistoryKey) -> HistoryState {
        match self.store.get(key) {
            Some(entry) if entry.value.is_empty() => HistoryState::Empty,
            Some(entry) => HistoryState::Loaded(entry.value.clone()),
            None => HistoryState::Idle,
        }
    }
}

impl TransactionAggregator {
    pub fn new(router: Arc<ChainRouter>, source: Arc<dyn HistorySource>, config: HistoryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                router,
                source,
                config,
                state: Mutex::new(AggregatorState {
                    active: None,
                    status: HistoryState::Idle,
                    store: HashMap::new(),
                    in_flight: HashMap::new(),
                }),
            }),
        }
    }

    pub fn state(&self) -> HistoryState {
        self.inner.lock().status.clone()
    }

    pub fn active_key(&self) -> Option<HistoryKey> {
        self.inner.lock().active.clone()
    }

    /// Last successfully fetched list for a key, kept across failed refreshes
    pub fn cached(&self, account: &str, chain_id: u64) -> Option<Vec<TransactionRecord>> {
        let key = HistoryKey::new(account, chain_id);
        self.inner.lock().store.get(&key).map(|entry| entry.value.clone())
    }

    /// Make `(account, chain_id)` the active key without fetching.
    /// Returns false if it already was.
    pub fn select(&self, account: &str, chain_id: u64) -> bool {
        let key = HistoryKey::new(account, chain_id);
        let mut state = self.inner.lock();
        if state.active.as_ref() == Some(&key) {
            return false;
        }
        info!("Switching transaction history to {} on chain {}", key.account, key.chain_id);
        state.status = state.settled_status(&key);
        state.active = Some(key);
        true
    }

    /// Drop the active key (wallet disconnected); pending results get discarded
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.active = None;
        state.status = HistoryState::Idle;
    }

    pub async fn refresh(&self, account: &str, chain_id: u64) -> HistoryResult {
        self.select(account, chain_id);
        let key = HistoryKey::new(account, chain_id);

        let fetch = {
            let mut state = self.inner.lock();

            state.status = match std::mem::replace(&mut state.status, HistoryState::Loading) {
                HistoryState::Loaded(records) | HistoryState::Refreshing(records) => {
                    HistoryState::Refreshing(records)
                }
                _ => HistoryState::Loading,
            };

            if let Some(fetch) = state.in_flight.get(&key).cloned() {
                debug!("Joining in-flight history refresh for {} on chain {}", key.account, key.chain_id);
                fetch
            } else {
                let fetch = Inner::spawn_fetch(Arc::clone(&self.inner), key.clone());
                state.in_flight.insert(key, fetch.clone());
                fetch
            }
        };

        fetch.await
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the fetch as its own task, so the state settles even when every
    /// waiter has been dropped.
    fn spawn_fetch(inner: Arc<Inner>, key: HistoryKey) -> SharedFetch {
        let task = tokio::spawn({
            let inner = Arc::clone(&inner);
            let key = key.clone();
            async move {
                let result = inner.fetch(&key).await;
                inner.apply(key, result)
            }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    let failure = FetchError::Network(format!("history refresh task failed: {}", e));
                    inner.apply(key, Err(failure.into()))
                }
            }
        }
        .boxed()
        .shared()
    }

    fn apply(&self, key: HistoryKey, result: HistoryResult) -> HistoryResult {
        let mut state = self.lock();
        state.in_flight.remove(&key);

        if state.active.as_ref() != Some(&key) {
            debug!(
                "Discarding history result for inactive {} on chain {}",
                key.account, key.chain_id
            );
            return result;
        }

        match &result {
            Ok(records) if records.is_empty() => {
                info!("ℹ️  No transactions found for {} on chain {}", key.account, key.chain_id);
                state.status = HistoryState::Empty;
                state.store.insert(key, CacheEntry::new(Vec::new()));
            }
            Ok(records) => {
                info!("✅ Found {} transactions for {} on chain {}", records.len(), key.account, key.chain_id);
                state.status = HistoryState::Loaded(records.clone());
                state.store.insert(key, CacheEntry::new(records.clone()));
            }
            Err(err) => {
                warn!("❌ Failed to fetch transactions for {} on chain {}: {}", key.account, key.chain_id, err);
                state.status = HistoryState::Error(err.to_string());
            }
        }

        result
    }

    async fn fetch(&self, key: &HistoryKey) -> HistoryResult {
        let request = self
            .router
            .build_history_request(key.chain_id, &key.account, self.config.limit)?;

        info!("🔍 Fetching transactions for {} via {}", key.account, request.api.as_str());

        let body = timeout(self.config.upstream_timeout, self.source.fetch(&request))
            .await
            .map_err(|_| FetchError::Timeout(self.config.upstream_timeout))??;

        match normalize_history_response(request.api, &body)? {
            HistoryPage::Records(records) => Ok(dedupe_and_sort(records)),
            HistoryPage::NoTransactions => Ok(Vec::new()),
            HistoryPage::UpstreamError(message) => Err(HistoryError::Upstream(message)),
        }
    }
}

/// Unique by hash (first occurrence wins), newest first
fn dedupe_and_sort(records: Vec<TransactionRecord>) -> Vec<TransactionRecord> {
    let mut seen = HashSet::new();
    let mut unique: Vec<_> = records
        .into_iter()
        .filter(|record| seen.insert(record.hash.to_ascii_lowercase()))
        .collect();
    unique.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::HistoryRequest;
    use crate::shared::errors::ConfigError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const ACCOUNT: &str = "0x1111111111111111111111111111111111111111";
    const MAINNET: u64 = 1;
    const SEPOLIA: u64 = 11_155_111;

    #[derive(Default)]
    struct FakeExplorer {
        calls: AtomicUsize,
        delays: HashMap<u64, Duration>,
        bodies: HashMap<u64, String>,
    }

    impl FakeExplorer {
        fn body(mut self, chain_id: u64, body: &str) -> Self {
            self.bodies.insert(chain_id, body.to_string());
            self
        }

        fn delay(mut self, chain_id: u64, delay: Duration) -> Self {
            self.delays.insert(chain_id, delay);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HistorySource for FakeExplorer {
        async fn fetch(&self, request: &HistoryRequest) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(&request.chain_id) {
                tokio::time::sleep(*delay).await;
            }
            self.bodies
                .get(&request.chain_id)
                .cloned()
                .ok_or_else(|| FetchError::Network("connection refused".to_string()))
        }
    }

    fn tx(hash: &str, timestamp: u64) -> String {
        format!(
            r#"{{"timeStamp":"{timestamp}","hash":"{hash}","from":"{ACCOUNT}","to":"0x2222222222222222222222222222222222222222","value":"1000000000000000","isError":"0"}}"#
        )
    }

    fn ok_body(txs: &[String]) -> String {
        format!(r#"{{"status":"1","message":"OK","result":[{}]}}"#, txs.join(","))
    }

    fn aggregator(explorer: Arc<FakeExplorer>) -> TransactionAggregator {
        let router = ChainRouter::new(HashMap::from([(MAINNET, "key".to_string())]));
        TransactionAggregator::new(Arc::new(router), explorer, HistoryConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_issue_one_upstream_call() {
        let explorer = Arc::new(
            FakeExplorer::default()
                .body(SEPOLIA, &ok_body(&[tx("0xa", 10)]))
                .delay(SEPOLIA, Duration::from_secs(1)),
        );
        let aggregator = aggregator(explorer.clone());

        let upper = ACCOUNT.to_uppercase().replace("0X", "0x");
        let (first, second) = tokio::join!(
            aggregator.refresh(ACCOUNT, SEPOLIA),
            aggregator.refresh(&upper, SEPOLIA)
        );

        assert_eq!(explorer.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(first.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_chain_result_does_not_overwrite_new_chain() {
        let explorer = Arc::new(
            FakeExplorer::default()
                .body(SEPOLIA, &ok_body(&[tx("0xsepolia", 10)]))
                .delay(SEPOLIA, Duration::from_secs(5))
                .body(MAINNET, &ok_body(&[tx("0xmainnet", 20)]))
                .delay(MAINNET, Duration::from_secs(1)),
        );
        let aggregator = aggregator(explorer.clone());

        let background = aggregator.clone();
        let stale = tokio::spawn(async move { background.refresh(ACCOUNT, SEPOLIA).await });
        tokio::task::yield_now().await;
        assert_eq!(aggregator.state(), HistoryState::Loading);

        let current = aggregator.refresh(ACCOUNT, MAINNET).await.unwrap();
        assert_eq!(current[0].hash, "0xmainnet");

        let stale = stale.await.unwrap().unwrap();
        assert_eq!(stale[0].hash, "0xsepolia");

        assert_eq!(explorer.calls(), 2);
        assert_eq!(aggregator.active_key(), Some(HistoryKey::new(ACCOUNT, MAINNET)));
        assert_eq!(aggregator.state().records()[0].hash, "0xmainnet");
        assert_eq!(aggregator.cached(ACCOUNT, SEPOLIA), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_transactions_envelope_is_empty_not_error() {
        let explorer = Arc::new(
            FakeExplorer::default().body(SEPOLIA, r#"{"status":"0","message":"No transactions found","result":[]}"#),
        );
        let aggregator = aggregator(explorer);

        assert_eq!(aggregator.refresh(ACCOUNT, SEPOLIA).await, Ok(Vec::new()));
        assert_eq!(aggregator.state(), HistoryState::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_error_envelope_is_error_state() {
        let explorer = Arc::new(
            FakeExplorer::default().body(MAINNET, r#"{"status":"0","message":"NOTOK","result":"Invalid API Key"}"#),
        );
        let aggregator = aggregator(explorer);

        assert!(aggregator.refresh(ACCOUNT, MAINNET).await.is_err());
        assert_eq!(
            aggregator.state(),
            HistoryState::Error("Etherscan API: NOTOK (Invalid API Key)".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_chain_settles_into_error() {
        let explorer = Arc::new(FakeExplorer::default());
        let aggregator = aggregator(explorer.clone());

        let result = aggregator.refresh(ACCOUNT, 999_999).await;

        assert!(matches!(result, Err(HistoryError::UnsupportedChain(_))));
        assert_eq!(aggregator.state(), HistoryState::Error("Unsupported chain ID: 999999".to_string()));
        assert_eq!(explorer.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_api_key_is_unavailable_state() {
        let explorer = Arc::new(FakeExplorer::default());
        let aggregator = TransactionAggregator::new(
            Arc::new(ChainRouter::new(HashMap::new())),
            explorer.clone(),
            HistoryConfig::default(),
        );

        let result = aggregator.refresh(ACCOUNT, MAINNET).await;

        assert_eq!(
            result,
            Err(HistoryError::Config(ConfigError::MissingApiKey { chain: "Etherscan".to_string() }))
        );
        assert_eq!(aggregator.state(), HistoryState::Error("Etherscan API key not configured".to_string()));
        assert_eq!(explorer.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_are_deduplicated_and_sorted() {
        let explorer = Arc::new(FakeExplorer::default().body(
            SEPOLIA,
            &ok_body(&[tx("0xold", 10), tx("0xnew", 30), tx("0xOLD", 10), tx("0xmid", 20)]),
        ));
        let aggregator = aggregator(explorer);

        let records = aggregator.refresh(ACCOUNT, SEPOLIA).await.unwrap();
        let hashes: Vec<_> = records.iter().map(|r| r.hash.as_str()).collect();

        assert_eq!(hashes, vec!["0xnew", "0xmid", "0xold"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_last_good_list_in_store() {
        let explorer = Arc::new(FakeExplorer::default().body(SEPOLIA, &ok_body(&[tx("0xa", 10)])));
        let aggregator = aggregator(explorer);

        aggregator.refresh(ACCOUNT, SEPOLIA).await.unwrap();
        // Unknown chain for the same account, then back to Sepolia.
        aggregator.refresh(ACCOUNT, 5).await.unwrap_err();

        assert!(aggregator.select(ACCOUNT, SEPOLIA));
        assert_eq!(aggregator.state().records().len(), 1);
        assert_eq!(aggregator.cached(ACCOUNT, SEPOLIA).map(|r| r.len()), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_keeps_records_visible() {
        let explorer = Arc::new(
            FakeExplorer::default()
                .body(SEPOLIA, &ok_body(&[tx("0xa", 10)]))
                .delay(SEPOLIA, Duration::from_secs(2)),
        );
        let aggregator = aggregator(explorer);
        aggregator.refresh(ACCOUNT, SEPOLIA).await.unwrap();

        let background = aggregator.clone();
        let pending = tokio::spawn(async move { background.refresh(ACCOUNT, SEPOLIA).await });
        tokio::task::yield_now().await;

        let state = aggregator.state();
        assert!(state.is_busy());
        assert!(matches!(state, HistoryState::Refreshing(ref records) if records.len() == 1));

        pending.await.unwrap().unwrap();
        assert!(matches!(aggregator.state(), HistoryState::Loaded(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_upstream_times_out() {
        let explorer = Arc::new(
            FakeExplorer::default()
                .body(SEPOLIA, &ok_body(&[tx("0xa", 10)]))
                .delay(SEPOLIA, Duration::from_secs(60)),
        );
        let aggregator = aggregator(explorer);

        let result = aggregator.refresh(ACCOUNT, SEPOLIA).await;

        assert_eq!(result, Err(HistoryError::Fetch(FetchError::Timeout(Duration::from_secs(10)))));
        assert!(matches!(aggregator.state(), HistoryState::Error(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_pending_result() {
        let explorer = Arc::new(
            FakeExplorer::default()
                .body(SEPOLIA, &ok_body(&[tx("0xa", 10)]))
                .delay(SEPOLIA, Duration::from_secs(1)),
        );
        let aggregator = aggregator(explorer);

        let background = aggregator.clone();
        let pending = tokio::spawn(async move { background.refresh(ACCOUNT, SEPOLIA).await });
        tokio::task::yield_now().await;
        aggregator.clear();

        pending.await.unwrap().unwrap();
        assert_eq!(aggregator.state(), HistoryState::Idle);
        assert_eq!(aggregator.active_key(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_waiter_still_settles_state() {
        let explorer = Arc::new(
            FakeExplorer::default()
                .body(SEPOLIA, &ok_body(&[tx("0xa", 10)]))
                .delay(SEPOLIA, Duration::from_secs(2)),
        );
        let aggregator = aggregator(explorer.clone());

        let background = aggregator.clone();
        let waiter = tokio::spawn(async move { background.refresh(ACCOUNT, SEPOLIA).await });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(aggregator.state(), HistoryState::Loading);
        waiter.abort();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(aggregator.state().records().len(), 1);
        assert_eq!(explorer.calls(), 1);

        // Nothing left in flight: the next refresh is a fresh upstream call.
        aggregator.refresh(ACCOUNT, SEPOLIA).await.unwrap();
        assert_eq!(explorer.calls(), 2);
    }
}
