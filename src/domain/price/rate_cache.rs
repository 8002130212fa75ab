//! TTL-bounded cache of the latest price quote

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{PriceSource, QuoteStatus, RateCacheConfig, ServedQuote};
use crate::shared::errors::FetchError;
use crate::shared::types::{CacheEntry, PriceQuote};

type SharedRefresh = Shared<BoxFuture<'static, ServedQuote>>;

/// Owned price cache. Cloning shares the same underlying cache.
///
/// `get` never touches the network. `refresh` serves from cache inside the
/// freshness window, otherwise performs one upstream fetch; concurrent
/// refreshes join that fetch instead of issuing their own.
#[derive(Clone)]
pub struct RateCache {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn PriceSource>,
    config: RateCacheConfig,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    current: Option<CacheEntry<PriceQuote>>,
    previous: Option<PriceQuote>,
    in_flight: Option<SharedRefresh>,
}

impl RateCache {
    pub fn new(source: Arc<dyn PriceSource>, config: RateCacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                config,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Freshest known quote, possibly stale, or the fallback quote
    pub fn get(&self) -> PriceQuote {
        self.inner
            .lock()
            .current
            .as_ref()
            .map(|entry| entry.value.clone())
            .unwrap_or_else(|| self.inner.config.fallback.clone())
    }

    /// Quote replaced by the most recent successful refresh
    pub fn previous(&self) -> Option<PriceQuote> {
        self.inner.lock().previous.clone()
    }

    /// True when `get` would return something older than the freshness window
    /// (or the fallback)
    pub fn is_stale(&self) -> bool {
        match &self.inner.lock().current {
            Some(entry) => !entry.is_fresh(self.inner.config.freshness_window),
            None => true,
        }
    }

    pub async fn refresh(&self) -> ServedQuote {
        let fetch = {
            let mut state = self.inner.lock();

            if let Some(entry) = &state.current {
                if entry.is_fresh(self.inner.config.freshness_window) {
                    debug!("Price cache hit (age {:?})", entry.age());
                    return ServedQuote {
                        quote: entry.value.clone(),
                        status: QuoteStatus::Cached,
                        error: None,
                    };
                }
            }

            match &state.in_flight {
                Some(fetch) => {
                    debug!("Joining in-flight price refresh");
                    fetch.clone()
                }
                None => {
                    let fetch = Inner::spawn_fetch(Arc::clone(&self.inner));
                    state.in_flight = Some(fetch.clone());
                    fetch
                }
            }
        };

        fetch.await
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs the fetch as its own task, so it settles the cache even when
    /// every waiter has been dropped.
    fn spawn_fetch(inner: Arc<Inner>) -> SharedRefresh {
        let task = tokio::spawn({
            let inner = Arc::clone(&inner);
            async move { inner.fetch_and_store().await }
        });

        async move {
            match task.await {
                Ok(served) => served,
                Err(e) => inner.store(Err(FetchError::Network(format!("price refresh task failed: {}", e)))),
            }
        }
        .boxed()
        .shared()
    }

    async fn fetch_and_store(&self) -> ServedQuote {
        info!("🔍 Fetching price quote from {}", self.source.name());

        let result = match timeout(self.config.upstream_timeout, self.source.fetch_quote()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.config.upstream_timeout)),
        };

        self.store(result)
    }

    fn store(&self, result: Result<PriceQuote, FetchError>) -> ServedQuote {
        let mut state = self.lock();
        state.in_flight = None;

        match result {
            Ok(quote) => {
                if let Some(current) = &state.current {
                    if quote.observed_at < current.value.observed_at {
                        warn!(
                            "Discarding out-of-order quote observed at {} (cached: {})",
                            quote.observed_at, current.value.observed_at
                        );
                        return ServedQuote {
                            quote: current.value.clone(),
                            status: QuoteStatus::Cached,
                            error: None,
                        };
                    }
                }

                info!(
                    "✅ {} = {} {} / {} {} ({:+.2}% 24h)",
                    quote.base_currency,
                    quote.primary.value,
                    quote.primary.currency,
                    quote.secondary.value,
                    quote.secondary.currency,
                    quote.change_24h_percent
                );
                let replaced = state.current.replace(CacheEntry::new(quote.clone()));
                if let Some(replaced) = replaced {
                    state.previous = Some(replaced.value);
                }
                ServedQuote { quote, status: QuoteStatus::Live, error: None }
            }
            Err(err) => match &state.current {
                Some(entry) => {
                    warn!("Price refresh failed, serving stale quote (age {:?}): {}", entry.age(), err);
                    ServedQuote {
                        quote: entry.value.clone(),
                        status: QuoteStatus::Stale,
                        error: Some(err),
                    }
                }
                None => {
                    warn!("Price refresh failed with nothing cached, serving fallback: {}", err);
                    ServedQuote {
                        quote: self.config.fallback.clone(),
                        status: QuoteStatus::Fallback,
                        error: Some(err),
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::FiatRate;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedSource {
        calls: AtomicUsize,
        delay: Duration,
        responses: Mutex<VecDeque<Result<PriceQuote, FetchError>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<PriceQuote, FetchError>>) -> Arc<Self> {
            Self::with_delay(responses, Duration::ZERO)
        }

        fn with_delay(responses: Vec<Result<PriceQuote, FetchError>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                responses: Mutex::new(responses.into()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        async fn fetch_quote(&self) -> Result<PriceQuote, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Network("script exhausted".to_string())))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn quote(eur: f64, secs: i64) -> PriceQuote {
        let observed_at: DateTime<Utc> = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        PriceQuote::new("ethereum", FiatRate::new("eur", eur), FiatRate::new("usd", eur * 1.1), 1.0, observed_at)
    }

    fn cache(source: Arc<ScriptedSource>) -> RateCache {
        RateCache::new(source, RateCacheConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_within_window_is_a_cache_hit() {
        let source = ScriptedSource::new(vec![Ok(quote(3000.0, 0))]);
        let cache = cache(source.clone());

        let first = cache.refresh().await;
        assert_eq!(first.status, QuoteStatus::Live);

        tokio::time::advance(Duration::from_secs(29)).await;
        let second = cache.refresh().await;
        let third = cache.refresh().await;

        assert_eq!(source.calls(), 1);
        assert_eq!(second.status, QuoteStatus::Cached);
        assert_eq!(second.quote, first.quote);
        assert_eq!(third.quote, first.quote);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched() {
        let source = ScriptedSource::new(vec![Ok(quote(3000.0, 0)), Ok(quote(3100.0, 30))]);
        let cache = cache(source.clone());

        cache.refresh().await;
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.is_stale());

        let served = cache.refresh().await;
        assert_eq!(source.calls(), 2);
        assert_eq!(served.status, QuoteStatus::Live);
        assert_eq!(served.quote.primary.value, 3100.0);
        assert_eq!(cache.previous().map(|q| q.primary.value), Some(3000.0));
        assert!(!cache.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_without_history_serves_fallback() {
        let source = ScriptedSource::new(vec![Err(FetchError::Http(429))]);
        let cache = cache(source.clone());

        assert_eq!(cache.get(), PriceQuote::fallback());

        let served = cache.refresh().await;
        assert_eq!(served.status, QuoteStatus::Fallback);
        assert_eq!(served.error, Some(FetchError::Http(429)));
        assert_eq!(served.quote, PriceQuote::fallback());
        assert_eq!(cache.get(), PriceQuote::fallback());
        assert!(served.is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_after_success_serves_stale() {
        let source = ScriptedSource::new(vec![
            Ok(quote(3000.0, 0)),
            Err(FetchError::Parse("unexpected token".to_string())),
        ]);
        let cache = cache(source.clone());

        cache.refresh().await;
        tokio::time::advance(Duration::from_secs(31)).await;

        let served = cache.refresh().await;
        assert_eq!(served.status, QuoteStatus::Stale);
        assert_eq!(served.quote.primary.value, 3000.0);
        assert_eq!(cache.get().primary.value, 3000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_share_one_fetch() {
        let source = ScriptedSource::with_delay(vec![Ok(quote(3000.0, 0))], Duration::from_secs(1));
        let cache = cache(source.clone());

        let (a, b, c) = tokio::join!(cache.refresh(), cache.refresh(), cache.refresh());

        assert_eq!(source.calls(), 1);
        assert_eq!(a.status, QuoteStatus::Live);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_upstream_times_out_into_fallback() {
        let source = ScriptedSource::with_delay(vec![Ok(quote(3000.0, 0))], Duration::from_secs(60));
        let cache = cache(source.clone());

        let served = cache.refresh().await;
        assert_eq!(served.status, QuoteStatus::Fallback);
        assert_eq!(served.error, Some(FetchError::Timeout(Duration::from_secs(10))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observed_at_never_goes_backwards() {
        let source = ScriptedSource::new(vec![Ok(quote(3000.0, 100)), Ok(quote(2000.0, 50))]);
        let cache = cache(source.clone());

        cache.refresh().await;
        tokio::time::advance(Duration::from_secs(31)).await;
        let served = cache.refresh().await;

        assert_eq!(source.calls(), 2);
        assert_eq!(served.quote.primary.value, 3000.0);
        assert_eq!(cache.get().primary.value, 3000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_instances_are_isolated() {
        let a = cache(ScriptedSource::new(vec![Ok(quote(3000.0, 0))]));
        let b = cache(ScriptedSource::new(vec![]));

        a.refresh().await;
        assert_eq!(a.get().primary.value, 3000.0);
        assert_eq!(b.get(), PriceQuote::fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_completes_after_waiter_is_aborted() {
        let source = ScriptedSource::with_delay(vec![Ok(quote(3000.0, 0))], Duration::from_secs(2));
        let cache = cache(source.clone());

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.refresh().await })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(source.calls(), 1);
        waiter.abort();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(cache.get().primary.value, 3000.0);
        assert_eq!(cache.refresh().await.status, QuoteStatus::Cached);
        assert_eq!(source.calls(), 1);
    }
}
