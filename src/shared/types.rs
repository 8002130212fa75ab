//! Common types used across the synchronization layer

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use super::errors::ErrorKind;
use super::units::format_ether;

/// One asset priced in one fiat currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiatRate {
    pub currency: String,
    pub value: f64,
}

impl FiatRate {
    pub fn new(currency: impl Into<String>, value: f64) -> Self {
        Self { currency: currency.into(), value }
    }
}

/// Spot exchange rate of one asset in two reference currencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub base_currency: String,
    pub primary: FiatRate,
    pub secondary: FiatRate,
    pub change_24h_percent: f64,
    pub observed_at: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(
        base_currency: impl Into<String>,
        primary: FiatRate,
        secondary: FiatRate,
        change_24h_percent: f64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            base_currency: base_currency.into(),
            primary,
            secondary,
            change_24h_percent,
            observed_at,
        }
    }

    /// Documented quote served when the upstream has never answered.
    /// Stamped at the epoch so any live quote supersedes it.
    pub fn fallback() -> Self {
        Self::new(
            "ethereum",
            FiatRate::new("eur", 3250.5),
            FiatRate::new("usd", 3500.0),
            2.5,
            DateTime::<Utc>::default(),
        )
    }

    pub fn rate_for(&self, currency: &str) -> Option<f64> {
        [&self.primary, &self.secondary]
            .into_iter()
            .find(|rate| rate.currency.eq_ignore_ascii_case(currency))
            .map(|rate| rate.value)
    }
}

/// A value plus the moment it was fetched
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T) -> Self {
        Self { value, fetched_at: Instant::now() }
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn is_fresh(&self, window: Duration) -> bool {
        self.age() < window
    }
}

/// Direction of a transfer relative to the connected account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Sent,
    Received,
}

/// One on-chain transfer; identity is `hash`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value_wei: U256,
    pub timestamp: DateTime<Utc>,
    pub failed: bool,
}

impl TransactionRecord {
    pub fn direction(&self, account: &str) -> Direction {
        if self.from.eq_ignore_ascii_case(account) {
            Direction::Sent
        } else {
            Direction::Received
        }
    }

    /// Value in ether at 4 decimals, as shown in the history list
    pub fn value_display(&self) -> String {
        format_ether(self.value_wei, 4)
    }
}

/// Draft transfer exactly as typed by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub recipient: String,
    pub amount_display: String,
}

impl TransferRequest {
    pub fn new(recipient: impl Into<String>, amount_display: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            amount_display: amount_display.into(),
        }
    }
}

/// Non-blocking notices shown next to an otherwise valid draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferWarning {
    /// Connected to a production network; real funds move
    Mainnet,
}

impl fmt::Display for TransferWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferWarning::Mainnet => write!(f, "Connected to Ethereum Mainnet; real ETH will be used"),
        }
    }
}

/// Outcome of validating a `TransferRequest`; recomputed on every input change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub recipient_error: Option<ErrorKind>,
    pub amount_error: Option<ErrorKind>,
    pub quantized_amount_wei: Option<U256>,
    pub warning: Option<TransferWarning>,
}

impl ValidationResult {
    /// Submission is enabled exactly when no field is in error
    pub fn can_submit(&self) -> bool {
        self.recipient_error.is_none() && self.amount_error.is_none()
    }

    pub fn errors(&self) -> Vec<ErrorKind> {
        self.recipient_error.into_iter().chain(self.amount_error).collect()
    }
}
