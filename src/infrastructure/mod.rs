//! Infrastructure layer - upstream HTTP clients and the wallet boundary

pub mod http;
pub mod wallet;

pub use http::{CoinGeckoClient, ExplorerHistoryClient};
pub use wallet::{StaticWallet, WalletChain, WalletProvider};
