//! Dashboard session - wires the price cache, history aggregator and
//! transfer validator to the wallet and the refresh scheduler

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::refresh_scheduler::{RefreshScheduler, RefreshTask};
use crate::domain::chain::ChainRouter;
use crate::domain::history::{HistoryConfig, HistoryKey, HistorySource, HistoryState, TransactionAggregator};
use crate::domain::price::{PriceSource, RateCache, RateCacheConfig, ServedQuote};
use crate::domain::transfer::{QuickPercent, TransferValidator};
use crate::infrastructure::http::{CoinGeckoClient, ExplorerHistoryClient};
use crate::infrastructure::wallet::{WalletChain, WalletProvider};
use crate::shared::config::SyncConfig;
use crate::shared::errors::{AppError, WalletError};
use crate::shared::types::{FiatRate, PriceQuote, TransferRequest, ValidationResult};
use crate::shared::units::{format_ether, wei_to_ether_f64};

pub const PRICE_SUBSCRIPTION: &str = "price";
pub const HISTORY_SUBSCRIPTION: &str = "history";

struct PriceRefresh {
    rates: RateCache,
}

#[async_trait]
impl RefreshTask for PriceRefresh {
    fn name(&self) -> &str {
        PRICE_SUBSCRIPTION
    }

    async fn run(&self) {
        let served = self.rates.refresh().await;
        if served.is_degraded() {
            warn!("⚠️  Serving {:?} price quote", served.status);
        }
    }
}

struct HistoryRefresh {
    history: TransactionAggregator,
    key: HistoryKey,
}

#[async_trait]
impl RefreshTask for HistoryRefresh {
    fn name(&self) -> &str {
        HISTORY_SUBSCRIPTION
    }

    async fn run(&self) {
        // Failures are already reflected in the aggregator state.
        if let Err(e) = self.history.refresh(&self.key.account, self.key.chain_id).await {
            debug!("History refresh for {} failed: {}", self.key.account, e);
        }
    }
}

/// Holdings valued in both configured currencies
#[derive(Debug, Clone, Serialize)]
pub struct Portfolio {
    pub account: String,
    pub chain: WalletChain,
    pub balance_wei: U256,
    pub primary: FiatRate,
    pub secondary: FiatRate,
    pub change_24h_percent: f64,
    pub price_is_stale: bool,
}

impl Portfolio {
    pub fn balance_display(&self) -> String {
        format_ether(self.balance_wei, 4)
    }
}

/// One dashboard's view of the synchronization layer.
///
/// Price refreshes run for the whole session; history refreshes follow the
/// wallet's (account, chain) and are resubscribed whenever it changes.
pub struct DashboardSession {
    rates: RateCache,
    history: TransactionAggregator,
    router: Arc<ChainRouter>,
    validator: TransferValidator,
    wallet: Arc<dyn WalletProvider>,
    scheduler: RefreshScheduler,
    active_key: Option<HistoryKey>,
    started: bool,
}

impl DashboardSession {
    pub fn new(
        config: &SyncConfig,
        price_source: Arc<dyn PriceSource>,
        history_source: Arc<dyn HistorySource>,
        wallet: Arc<dyn WalletProvider>,
    ) -> Self {
        let router = Arc::new(ChainRouter::from_config(config));
        Self {
            rates: RateCache::new(price_source, RateCacheConfig::from(config)),
            history: TransactionAggregator::new(Arc::clone(&router), history_source, HistoryConfig::from(config)),
            router,
            validator: TransferValidator::new(),
            wallet,
            scheduler: RefreshScheduler::new(config.refresh_interval),
            active_key: None,
            started: false,
        }
    }

    /// Session backed by the public price and explorer APIs
    pub fn connect(config: &SyncConfig, wallet: Arc<dyn WalletProvider>) -> Result<Self, AppError> {
        let price_source = Arc::new(CoinGeckoClient::from_config(config)?);
        let history_source = Arc::new(ExplorerHistoryClient::new(config.upstream_timeout)?);
        Ok(Self::new(config, price_source, history_source, wallet))
    }

    /// Subscribe the price refresh and, if a wallet is connected, the history
    /// refresh. Both run once immediately.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        info!("🚀 Starting dashboard session");
        self.started = true;
        self.scheduler.start(vec![Arc::new(PriceRefresh { rates: self.rates.clone() })]);

        self.active_key = None;
        self.sync_wallet();
    }

    /// Pick up account or chain changes from the wallet. Returns true when the
    /// history key changed.
    pub fn sync_wallet(&mut self) -> bool {
        let key = match (self.wallet.current_account(), self.wallet.current_chain()) {
            (Some(account), Some(chain)) => Some(HistoryKey::new(&account, chain.id)),
            _ => None,
        };
        if key == self.active_key {
            return false;
        }

        match &key {
            Some(key) => {
                self.history.select(&key.account, key.chain_id);
                if self.started {
                    self.scheduler.subscribe(Arc::new(HistoryRefresh {
                        history: self.history.clone(),
                        key: key.clone(),
                    }));
                }
            }
            None => {
                info!("🔌 Wallet disconnected");
                self.scheduler.unsubscribe(HISTORY_SUBSCRIPTION);
                self.history.clear();
            }
        }

        self.active_key = key;
        true
    }

    /// Manual refresh of every subscription
    pub fn refresh_now(&self) {
        self.scheduler.trigger_now();
    }

    pub fn stop(&mut self) {
        self.scheduler.stop();
        self.started = false;
    }

    pub fn is_running(&self) -> bool {
        self.started
    }

    pub fn rates(&self) -> &RateCache {
        &self.rates
    }

    pub fn history(&self) -> &TransactionAggregator {
        &self.history
    }

    pub fn validator(&self) -> &TransferValidator {
        &self.validator
    }

    pub fn router(&self) -> &ChainRouter {
        &self.router
    }

    pub fn price(&self) -> PriceQuote {
        self.rates.get()
    }

    /// One-off price refresh outside the schedule
    pub async fn refresh_price(&self) -> ServedQuote {
        self.rates.refresh().await
    }

    pub fn history_state(&self) -> HistoryState {
        self.history.state()
    }

    /// Explorer link for a transaction on the wallet's current chain
    pub fn explorer_url(&self, hash: &str) -> Option<String> {
        let chain = self.wallet.current_chain()?;
        self.router.explorer_tx_url(chain.id, hash).ok()
    }

    pub async fn portfolio(&self) -> Result<Portfolio, AppError> {
        let (account, chain) = self.connection()?;
        let balance_wei = self.wallet.available_balance(&account).await?;
        let quote = self.rates.get();
        let ether = wei_to_ether_f64(balance_wei);

        Ok(Portfolio {
            account,
            chain,
            balance_wei,
            primary: FiatRate::new(quote.primary.currency.clone(), ether * quote.primary.value),
            secondary: FiatRate::new(quote.secondary.currency.clone(), ether * quote.secondary.value),
            change_24h_percent: quote.change_24h_percent,
            price_is_stale: self.rates.is_stale(),
        })
    }

    /// Validate a draft against the wallet's current balance and chain
    pub async fn validate(&self, request: &TransferRequest) -> Result<ValidationResult, AppError> {
        let (account, chain) = self.connection()?;
        let balance = self.wallet.available_balance(&account).await?;
        Ok(self.validator.validate(request, balance, chain.id))
    }

    /// Typed amount valued in the primary currency at the cached quote
    pub fn amount_in_fiat(&self, amount: &str) -> FiatRate {
        let quote = self.rates.get();
        FiatRate::new(quote.primary.currency.clone(), self.validator.fiat_value(amount, &quote))
    }

    pub async fn quick_amount(
        &self,
        request: &TransferRequest,
        percent: QuickPercent,
    ) -> Result<(TransferRequest, ValidationResult), AppError> {
        let (account, chain) = self.connection()?;
        let balance = self.wallet.available_balance(&account).await?;
        Ok(self.validator.apply_quick_amount(request, percent, balance, chain.id))
    }

    /// Validate and hand the payload to the wallet; returns the transaction hash
    pub async fn submit(&self, request: &TransferRequest) -> Result<String, AppError> {
        let (account, chain) = self.connection()?;
        let balance = self.wallet.available_balance(&account).await?;

        let payload = self
            .validator
            .prepare(request, balance, chain.id)
            .map_err(|result| AppError::InvalidTransfer(result.errors()))?;

        info!("📤 Submitting {} wei to {} on {}", payload.value_wei, payload.to, chain.name);
        let hash = self.wallet.submit(&payload).await?;
        info!("✅ Transaction submitted: {}", hash);
        Ok(hash)
    }

    fn connection(&self) -> Result<(String, WalletChain), WalletError> {
        match (self.wallet.current_account(), self.wallet.current_chain()) {
            (Some(account), Some(chain)) => Ok((account, chain)),
            _ => Err(WalletError::NotConnected),
        }
    }
}
