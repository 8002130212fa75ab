//! Normalization of `{status, message, result}` history envelopes
//!
//! Etherscan and Blockscout share the envelope but differ on the error path:
//! Etherscan puts the error text in `result` as a string, Blockscout leaves
//! `result` empty and reports through `message`. Blockscout also emits
//! `to: null` for contract creations.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::HistoryApi;
use crate::shared::errors::FetchError;
use crate::shared::types::TransactionRecord;

const NO_TRANSACTIONS: &str = "No transactions found";

/// Normalized upstream answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryPage {
    Records(Vec<TransactionRecord>),
    /// Valid, empty history
    NoTransactions,
    /// The upstream answered but reported a failure (bad key, rate limit...)
    UpstreamError(String),
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    hash: String,
    from: String,
    #[serde(default)]
    to: Option<String>,
    value: String,
    time_stamp: String,
    #[serde(default)]
    is_error: Option<String>,
}

impl TryFrom<RawTransaction> for TransactionRecord {
    type Error = FetchError;

    fn try_from(raw: RawTransaction) -> Result<Self, Self::Error> {
        let value_wei = U256::from_str_radix(raw.value.trim(), 10)
            .map_err(|e| FetchError::Parse(format!("value {:?} of {}: {}", raw.value, raw.hash, e)))?;
        let seconds: i64 = raw
            .time_stamp
            .trim()
            .parse()
            .map_err(|e| FetchError::Parse(format!("timeStamp {:?} of {}: {}", raw.time_stamp, raw.hash, e)))?;
        let timestamp = DateTime::<Utc>::from_timestamp(seconds, 0)
            .ok_or_else(|| FetchError::Parse(format!("timeStamp {} out of range", seconds)))?;

        Ok(TransactionRecord {
            hash: raw.hash,
            from: raw.from,
            to: raw.to.unwrap_or_default(),
            value_wei,
            timestamp,
            failed: raw.is_error.as_deref() == Some("1"),
        })
    }
}

pub fn normalize_history_response(api: HistoryApi, body: &str) -> Result<HistoryPage, FetchError> {
    let envelope: RawEnvelope = serde_json::from_str(body)?;

    if envelope.status == "1" {
        let raw: Vec<RawTransaction> = serde_json::from_value(envelope.result)?;
        let records = raw
            .into_iter()
            .map(TransactionRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(if records.is_empty() {
            HistoryPage::NoTransactions
        } else {
            HistoryPage::Records(records)
        });
    }

    if envelope.status != "0" {
        return Err(FetchError::Parse(format!("unknown envelope status {:?}", envelope.status)));
    }

    if envelope.message.eq_ignore_ascii_case(NO_TRANSACTIONS) {
        return Ok(HistoryPage::NoTransactions);
    }

    let detail = match &envelope.result {
        serde_json::Value::String(detail) if !detail.is_empty() => format!(" ({})", detail),
        _ => String::new(),
    };
    let message = if envelope.message.is_empty() { "request failed" } else { envelope.message.as_str() };
    Ok(HistoryPage::UpstreamError(format!("{} API: {}{}", api.as_str(), message, detail)))
}
