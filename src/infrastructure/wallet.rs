//! Wallet provider capability (connection, balance, signing live outside this crate)

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{PoisonError, RwLock};
use tracing::info;

use crate::domain::chain::SUPPORTED_CHAINS;
use crate::domain::transfer::TransferPayload;
use crate::shared::errors::WalletError;

/// Network the wallet is connected to; may be outside the supported set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletChain {
    pub id: u64,
    pub name: String,
}

impl WalletChain {
    pub fn from_id(id: u64) -> Self {
        let name = SUPPORTED_CHAINS
            .iter()
            .find(|chain| chain.chain_id == id)
            .map(|chain| chain.display_name.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        Self { id, name }
    }
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn current_account(&self) -> Option<String>;

    fn current_chain(&self) -> Option<WalletChain>;

    /// Balance in wei as reported by the wallet's node
    async fn available_balance(&self, address: &str) -> Result<U256, WalletError>;

    /// Sign and broadcast; returns the transaction hash
    async fn submit(&self, payload: &TransferPayload) -> Result<String, WalletError>;
}

#[derive(Debug, Clone)]
struct WalletSnapshot {
    account: Option<String>,
    chain_id: Option<u64>,
    balance_wei: U256,
}

/// Read-only wallet backed by configured values. Cannot sign.
pub struct StaticWallet {
    snapshot: RwLock<WalletSnapshot>,
}

impl StaticWallet {
    pub fn new(account: Option<String>, chain_id: Option<u64>, balance_wei: U256) -> Self {
        Self {
            snapshot: RwLock::new(WalletSnapshot { account, chain_id, balance_wei }),
        }
    }

    pub fn disconnected() -> Self {
        Self::new(None, None, U256::ZERO)
    }

    pub fn switch_account(&self, account: Option<String>) {
        info!("Wallet account changed: {:?}", account);
        self.write(|snapshot| snapshot.account = account);
    }

    pub fn switch_chain(&self, chain_id: Option<u64>) {
        info!("Wallet chain changed: {:?}", chain_id);
        self.write(|snapshot| snapshot.chain_id = chain_id);
    }

    pub fn set_balance(&self, balance_wei: U256) {
        self.write(|snapshot| snapshot.balance_wei = balance_wei);
    }

    fn read(&self) -> WalletSnapshot {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn write(&self, update: impl FnOnce(&mut WalletSnapshot)) {
        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut *snapshot);
    }
}

#[async_trait]
impl WalletProvider for StaticWallet {
    fn current_account(&self) -> Option<String> {
        self.read().account
    }

    fn current_chain(&self) -> Option<WalletChain> {
        self.read().chain_id.map(WalletChain::from_id)
    }

    async fn available_balance(&self, address: &str) -> Result<U256, WalletError> {
        let snapshot = self.read();
        match snapshot.account {
            Some(account) if account.eq_ignore_ascii_case(address) => Ok(snapshot.balance_wei),
            Some(_) => Err(WalletError::Balance(format!("unknown account {}", address))),
            None => Err(WalletError::NotConnected),
        }
    }

    async fn submit(&self, _payload: &TransferPayload) -> Result<String, WalletError> {
        Err(WalletError::SigningUnavailable)
    }
}
