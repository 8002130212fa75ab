use alloy_primitives::U256;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::Path};

use crate::infrastructure::wallet::StaticWallet;
use crate::shared::config::{ConfigLoader, SyncConfig, MAINNET_CHAIN_ID};
use crate::shared::errors::ConfigError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PriceCfg {
    pub api_url: Option<String>,
    pub asset_id: Option<String>,
    pub primary_currency: Option<String>,
    pub secondary_currency: Option<String>,
    pub freshness_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryCfg {
    pub limit: Option<usize>,
    pub etherscan_api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchedulerCfg {
    pub interval_secs: Option<u64>,
}

/// Read-only wallet snapshot for the CLI
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WalletCfg {
    pub account: Option<String>,
    pub chain_id: Option<u64>,
    /// Decimal wei string; u64 cannot hold realistic balances
    pub balance_wei: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub price: PriceCfg,
    pub history: HistoryCfg,
    pub scheduler: SchedulerCfg,
    pub wallet: WalletCfg,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("read {}", path.as_ref().display()))?;
        let cfg: Self = toml::from_str(&s).context("parse config TOML")?;
        Ok(cfg)
    }

    /// File values over built-in defaults, without the environment
    pub fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::default();

        if let Some(url) = &self.price.api_url {
            config.price_api_url = url.clone();
        }
        if let Some(asset) = &self.price.asset_id {
            config.asset_id = asset.clone();
        }
        if let Some(currency) = &self.price.primary_currency {
            config.primary_currency = currency.to_lowercase();
        }
        if let Some(currency) = &self.price.secondary_currency {
            config.secondary_currency = currency.to_lowercase();
        }
        if let Some(secs) = self.price.freshness_secs {
            config.freshness_window = Duration::from_secs(secs);
        }
        if let Some(secs) = self.price.timeout_secs {
            config.upstream_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = self.history.limit {
            config.history_limit = limit;
        }
        if let Some(key) = &self.history.etherscan_api_key {
            config.api_keys.insert(MAINNET_CHAIN_ID, key.clone());
        }
        if let Some(secs) = self.scheduler.interval_secs {
            config.refresh_interval = Duration::from_secs(secs);
        }

        config
    }

    /// File values, then environment overrides, then sanity checks
    pub fn resolve(&self) -> Result<SyncConfig, ConfigError> {
        let config = ConfigLoader::apply_env(self.sync_config())?;
        check(&config)?;
        Ok(config)
    }

    pub fn wallet(&self) -> Result<StaticWallet, ConfigError> {
        let balance = match &self.wallet.balance_wei {
            Some(raw) => U256::from_str_radix(raw.trim(), 10)
                .map_err(|e| ConfigError::Invalid(format!("wallet.balance_wei {:?}: {}", raw, e)))?,
            None => U256::ZERO,
        };
        Ok(StaticWallet::new(self.wallet.account.clone(), self.wallet.chain_id, balance))
    }
}

fn check(config: &SyncConfig) -> Result<(), ConfigError> {
    if config.refresh_interval.is_zero() {
        return Err(ConfigError::Invalid("scheduler.interval_secs must be positive".to_string()));
    }
    if config.upstream_timeout.is_zero() {
        return Err(ConfigError::Invalid("upstream timeout must be positive".to_string()));
    }
    if config.history_limit == 0 {
        return Err(ConfigError::Invalid("history.limit must be positive".to_string()));
    }
    if config.primary_currency == config.secondary_currency {
        return Err(ConfigError::Invalid(format!(
            "primary and secondary currency are both {:?}",
            config.primary_currency
        )));
    }
    Ok(())
}
