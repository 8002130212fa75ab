//! Chain domain - static chain table, history request routing and
//! response normalization

mod chain_router;
mod history_response;

pub use chain_router::ChainRouter;
pub use history_response::{normalize_history_response, HistoryPage};

use reqwest::Url;
use serde::Serialize;

/// Flavor of the transaction-history upstream behind a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HistoryApi {
    /// Etherscan V2 multichain API (requires a key)
    EtherscanV2,
    /// Blockscout Etherscan-compatible RPC API (keyless)
    Blockscout,
}

impl HistoryApi {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryApi::EtherscanV2 => "Etherscan",
            HistoryApi::Blockscout => "Blockscout",
        }
    }

    /// The multichain API selects the chain with a `chainid` parameter
    pub fn takes_chain_id(&self) -> bool {
        matches!(self, HistoryApi::EtherscanV2)
    }
}

/// Static description of one supported chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub display_name: &'static str,
    pub history_api: HistoryApi,
    /// Base URL; the query string is appended by `ChainRouter`
    pub history_endpoint: &'static str,
    pub requires_api_key: bool,
    /// Placeholder: `{hash}`
    pub block_explorer_url_template: &'static str,
    /// Real funds move on this network
    pub is_production: bool,
}

/// Every chain the layer knows about. Adding a chain is a new row here.
pub const SUPPORTED_CHAINS: &[ChainDescriptor] = &[
    ChainDescriptor {
        chain_id: 1,
        display_name: "Ethereum Mainnet",
        history_api: HistoryApi::EtherscanV2,
        history_endpoint: "https://api.etherscan.io/v2/api",
        requires_api_key: true,
        block_explorer_url_template: "https://etherscan.io/tx/{hash}",
        is_production: true,
    },
    ChainDescriptor {
        chain_id: 11_155_111,
        display_name: "Sepolia",
        history_api: HistoryApi::Blockscout,
        history_endpoint: "https://eth-sepolia.blockscout.com/api",
        requires_api_key: false,
        block_explorer_url_template: "https://sepolia.etherscan.io/tx/{hash}",
        is_production: false,
    },
];

/// Whether `chain_id` is a known production network
pub fn is_production(chain_id: u64) -> bool {
    SUPPORTED_CHAINS
        .iter()
        .any(|chain| chain.chain_id == chain_id && chain.is_production)
}

/// Fully built history request for one (chain, address) pair
#[derive(Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub chain_id: u64,
    pub api: HistoryApi,
    pub url: Url,
}

// Keeps API keys out of logs.
impl std::fmt::Debug for HistoryRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryRequest")
            .field("chain_id", &self.chain_id)
            .field("api", &self.api)
            .field("host", &self.url.host_str())
            .finish()
    }
}
