//! Error handling for the synchronization layer

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Upstream fetch failures (price and history upstreams)
///
/// `Clone` so a single coalesced fetch can hand the same outcome to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream returned HTTP {0}")]
    Http(u16),

    #[error("Upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Malformed response body: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Http(status.as_u16())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Parse(err.to_string())
    }
}

/// Chain id outside the statically known set
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Unsupported chain ID: {0}")]
pub struct UnsupportedChainError(pub u64);

/// Missing or invalid configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{chain} API key not configured")]
    MissingApiKey { chain: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything that can settle a history refresh into the `Error` state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error(transparent)]
    UnsupportedChain(#[from] UnsupportedChainError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Upstream(String),
}

/// Field-level validation failures of a transfer draft
///
/// These are data, returned inside a `ValidationResult`, never raised.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    #[error("This field is required")]
    Required,

    #[error("Invalid Ethereum address")]
    InvalidAddress,

    #[error("Amount is not a number")]
    InvalidAmount,

    #[error("Amount must be greater than 0")]
    NonPositiveAmount,

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Amount too small (min: 0.000001 ETH)")]
    BelowMinimum,
}

/// Wallet provider failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("No wallet connected")]
    NotConnected,

    #[error("Balance lookup failed: {0}")]
    Balance(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Signing is not available from this wallet")]
    SigningUnavailable,
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Wallet error: {0}")]
    WalletError(String),

    #[error("Transfer rejected by validation: {0:?}")]
    InvalidTransfer(Vec<ErrorKind>),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<WalletError> for AppError {
    fn from(err: WalletError) -> Self {
        AppError::WalletError(err.to_string())
    }
}

impl From<HistoryError> for AppError {
    fn from(err: HistoryError) -> Self {
        AppError::Unknown(err.to_string())
    }
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        AppError::Unknown(err.to_string())
    }
}
