//! Chain id → history upstream routing

use reqwest::Url;
use std::collections::HashMap;
use tracing::debug;

use super::{ChainDescriptor, HistoryRequest, SUPPORTED_CHAINS};
use crate::shared::config::SyncConfig;
use crate::shared::errors::{ConfigError, HistoryError, UnsupportedChainError};

/// Resolves chain ids against a fixed chain table and builds history
/// requests whose responses all normalize through the same parser.
#[derive(Debug, Clone)]
pub struct ChainRouter {
    chains: &'static [ChainDescriptor],
    api_keys: HashMap<u64, String>,
}

impl ChainRouter {
    pub fn new(api_keys: HashMap<u64, String>) -> Self {
        Self::with_chains(SUPPORTED_CHAINS, api_keys)
    }

    pub fn with_chains(chains: &'static [ChainDescriptor], api_keys: HashMap<u64, String>) -> Self {
        let api_keys = api_keys
            .into_iter()
            .filter(|(_, key)| !key.trim().is_empty())
            .collect();
        Self { chains, api_keys }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.api_keys.clone())
    }

    pub fn supported_chains(&self) -> &'static [ChainDescriptor] {
        self.chains
    }

    /// Look up a chain. Unknown ids fail closed.
    pub fn resolve(&self, chain_id: u64) -> Result<&'static ChainDescriptor, UnsupportedChainError> {
        self.chains
            .iter()
            .find(|chain| chain.chain_id == chain_id)
            .ok_or(UnsupportedChainError(chain_id))
    }

    /// True if `chain_id` is known and its history upstream can be queried
    pub fn is_history_available(&self, chain_id: u64) -> bool {
        self.resolve(chain_id)
            .map(|chain| !chain.requires_api_key || self.api_keys.contains_key(&chain_id))
            .unwrap_or(false)
    }

    pub fn build_history_request(
        &self,
        chain_id: u64,
        address: &str,
        limit: usize,
    ) -> Result<HistoryRequest, HistoryError> {
        let chain = self.resolve(chain_id)?;

        let api_key = match (chain.requires_api_key, self.api_keys.get(&chain_id)) {
            (true, None) => {
                return Err(ConfigError::MissingApiKey {
                    chain: chain.history_api.as_str().to_string(),
                }
                .into())
            }
            (_, key) => key.map(String::as_str).unwrap_or_default(),
        };

        let mut url = Url::parse(chain.history_endpoint)
            .map_err(|e| ConfigError::Invalid(format!("history endpoint for chain {}: {}", chain_id, e)))?;

        // Every value goes through the encoder; an account is caller input.
        {
            let mut query = url.query_pairs_mut();
            if chain.history_api.takes_chain_id() {
                query.append_pair("chainid", &chain_id.to_string());
            }
            query
                .append_pair("module", "account")
                .append_pair("action", "txlist")
                .append_pair("address", address)
                .append_pair("startblock", "0")
                .append_pair("endblock", "99999999")
                .append_pair("page", "1")
                .append_pair("offset", &limit.to_string())
                .append_pair("sort", "desc");
            if chain.requires_api_key {
                query.append_pair("apikey", api_key);
            }
        }

        debug!("Routed history request for {} on {} via {}", address, chain.display_name, chain.history_api.as_str());

        Ok(HistoryRequest {
            chain_id,
            api: chain.history_api,
            url,
        })
    }

    /// Block-explorer link for a transaction hash
    pub fn explorer_tx_url(&self, chain_id: u64, hash: &str) -> Result<String, UnsupportedChainError> {
        let chain = self.resolve(chain_id)?;
        Ok(chain.block_explorer_url_template.replace("{hash}", hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::HistoryApi;

    const ADDRESS: &str = "0x1111111111111111111111111111111111111111";

    fn router_with_key() -> ChainRouter {
        ChainRouter::new(HashMap::from([(1, "secret".to_string())]))
    }

    #[test]
    fn test_resolve_known_chains() {
        let router = ChainRouter::new(HashMap::new());

        let mainnet = router.resolve(1).unwrap();
        assert_eq!(mainnet.display_name, "Ethereum Mainnet");
        assert!(mainnet.requires_api_key);
        assert!(mainnet.is_production);

        let sepolia = router.resolve(11_155_111).unwrap();
        assert_eq!(sepolia.history_api, HistoryApi::Blockscout);
        assert!(!sepolia.requires_api_key);
    }

    #[test]
    fn test_unknown_chain_fails_closed() {
        let router = router_with_key();
        assert_eq!(router.resolve(999_999), Err(UnsupportedChainError(999_999)));
        assert_eq!(
            router.build_history_request(999_999, ADDRESS, 10),
            Err(HistoryError::UnsupportedChain(UnsupportedChainError(999_999)))
        );
        assert!(!router.is_history_available(999_999));
    }

    #[test]
    fn test_mainnet_requires_api_key() {
        let router = ChainRouter::new(HashMap::from([(1, "  ".to_string())]));

        let err = router.build_history_request(1, ADDRESS, 10).unwrap_err();
        assert_eq!(err, HistoryError::Config(ConfigError::MissingApiKey { chain: "Etherscan".to_string() }));
        assert_eq!(err.to_string(), "Etherscan API key not configured");
        assert!(!router.is_history_available(1));
    }

    #[test]
    fn test_mainnet_request_carries_key_and_limit() {
        let request = router_with_key().build_history_request(1, ADDRESS, 25).unwrap();
        let query: HashMap<String, String> = request.url.query_pairs().into_owned().collect();

        assert_eq!(request.api, HistoryApi::EtherscanV2);
        assert_eq!(request.url.host_str(), Some("api.etherscan.io"));
        assert_eq!(query["chainid"], "1");
        assert_eq!(query["address"], ADDRESS);
        assert_eq!(query["offset"], "25");
        assert_eq!(query["sort"], "desc");
        assert_eq!(query["apikey"], "secret");
        assert!(!format!("{:?}", request).contains("secret"));
    }

    #[test]
    fn test_sepolia_needs_no_key() {
        let router = ChainRouter::new(HashMap::new());
        let request = router.build_history_request(11_155_111, ADDRESS, 10).unwrap();
        let query: HashMap<String, String> = request.url.query_pairs().into_owned().collect();

        assert_eq!(request.url.host_str(), Some("eth-sepolia.blockscout.com"));
        assert_eq!(query["action"], "txlist");
        assert!(!query.contains_key("apikey"));
        assert!(router.is_history_available(11_155_111));
    }

    #[test]
    fn test_hostile_address_stays_inside_its_parameter() {
        let router = router_with_key();

        let request = router.build_history_request(1, "0xabc#", 10).unwrap();
        let query: Vec<(String, String)> = request.url.query_pairs().into_owned().collect();
        assert_eq!(request.url.fragment(), None);
        assert!(query.contains(&("address".to_string(), "0xabc#".to_string())));
        assert!(query.contains(&("apikey".to_string(), "secret".to_string())));
        assert!(query.contains(&("offset".to_string(), "10".to_string())));

        let request = router
            .build_history_request(11_155_111, "0xabc&module=stats&action=ethsupply", 10)
            .unwrap();
        let query: Vec<(String, String)> = request.url.query_pairs().into_owned().collect();
        assert_eq!(query.iter().filter(|(k, _)| k == "module").count(), 1);
        assert_eq!(query.iter().filter(|(k, _)| k == "action").count(), 1);
        assert!(query.contains(&("address".to_string(), "0xabc&module=stats&action=ethsupply".to_string())));
    }

    #[test]
    fn test_supported_chains_table() {
        let router = ChainRouter::new(HashMap::new());
        let ids: Vec<u64> = router.supported_chains().iter().map(|chain| chain.chain_id).collect();
        assert_eq!(ids, vec![1, 11_155_111]);
        assert!(router.supported_chains().iter().all(|chain| Url::parse(chain.history_endpoint).is_ok()));
    }

    #[test]
    fn test_explorer_links() {
        let router = ChainRouter::new(HashMap::new());
        assert_eq!(router.explorer_tx_url(1, "0xabc").unwrap(), "https://etherscan.io/tx/0xabc");
        assert_eq!(
            router.explorer_tx_url(11_155_111, "0xabc").unwrap(),
            "https://sepolia.etherscan.io/tx/0xabc"
        );
        assert!(router.explorer_tx_url(5, "0xabc").is_err());
    }
}
