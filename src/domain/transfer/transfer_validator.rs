//! Validation and quantization of a transfer draft
//!
//! Pure: every function here is a function of its arguments only, so it is
//! safe to call on each keystroke.

use alloy_primitives::{Address, U256};
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

use super::{QuickPercent, TransferPayload};
use crate::domain::chain;
use crate::shared::errors::ErrorKind;
use crate::shared::types::{PriceQuote, TransferRequest, TransferWarning, ValidationResult};
use crate::shared::units::{
    format_ether, parse_ether_amount, percent_of, truncate_to_decimals, wei_to_ether_f64, UnitsError,
    MIN_TRANSFER_WEI,
};

static ADDRESS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("address pattern compiles"));

/// Amount filled in by the "Min" button
pub const MIN_BUTTON_AMOUNT: &str = "0.001";

/// Fractional digits written by the quick-amount buttons
pub const QUICK_AMOUNT_DECIMALS: usize = 6;

#[derive(Debug, Clone)]
pub struct TransferValidator {
    min_amount_wei: U256,
    quick_decimals: usize,
}

impl Default for TransferValidator {
    fn default() -> Self {
        Self {
            min_amount_wei: MIN_TRANSFER_WEI,
            quick_decimals: QUICK_AMOUNT_DECIMALS,
        }
    }
}

impl TransferValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate both fields independently and quantize the amount to wei
    pub fn validate(&self, request: &TransferRequest, available_balance_wei: U256, chain_id: u64) -> ValidationResult {
        let (amount_error, quantized_amount_wei) =
            match self.check_amount(&request.amount_display, available_balance_wei) {
                Ok(wei) => (None, Some(wei)),
                Err(kind) => (Some(kind), None),
            };

        ValidationResult {
            recipient_error: self.check_recipient(&request.recipient),
            amount_error,
            quantized_amount_wei,
            warning: self.mainnet_warning(chain_id),
        }
    }

    pub fn check_recipient(&self, recipient: &str) -> Option<ErrorKind> {
        if recipient.trim().is_empty() {
            Some(ErrorKind::Required)
        } else if !ADDRESS_PATTERN.is_match(recipient) {
            Some(ErrorKind::InvalidAddress)
        } else {
            None
        }
    }

    /// Rules in order: numeric, positive, within balance, above the dust floor
    pub fn check_amount(&self, amount: &str, available_balance_wei: U256) -> Result<U256, ErrorKind> {
        let parsed = match parse_ether_amount(amount) {
            Ok(parsed) => parsed,
            Err(UnitsError::Empty) => return Err(ErrorKind::Required),
            Err(UnitsError::NotNumeric(_)) => return Err(ErrorKind::InvalidAmount),
            // Wider than 256 bits, so above any balance.
            Err(UnitsError::Overflow) => return Err(ErrorKind::InsufficientBalance),
        };

        if !parsed.is_positive() {
            return Err(ErrorKind::NonPositiveAmount);
        }
        if parsed.wei > available_balance_wei || (parsed.truncated && parsed.wei >= available_balance_wei) {
            return Err(ErrorKind::InsufficientBalance);
        }
        if parsed.wei < self.min_amount_wei {
            return Err(ErrorKind::BelowMinimum);
        }
        Ok(parsed.wei)
    }

    /// Non-blocking warning for production networks
    pub fn mainnet_warning(&self, chain_id: u64) -> Option<TransferWarning> {
        chain::is_production(chain_id).then_some(TransferWarning::Mainnet)
    }

    /// `percent` of the balance, rounded down to the quick-amount precision.
    /// Never rounds up, so the result never exceeds the balance.
    pub fn quick_amount(&self, available_balance_wei: U256, percent: QuickPercent) -> String {
        let share = percent_of(available_balance_wei, percent.percent());
        format_ether(truncate_to_decimals(share, self.quick_decimals), self.quick_decimals)
    }

    /// Fill the amount from a quick button and re-run the full rule set
    pub fn apply_quick_amount(
        &self,
        request: &TransferRequest,
        percent: QuickPercent,
        available_balance_wei: U256,
        chain_id: u64,
    ) -> (TransferRequest, ValidationResult) {
        let updated = TransferRequest {
            recipient: request.recipient.clone(),
            amount_display: self.quick_amount(available_balance_wei, percent),
        };
        let result = self.validate(&updated, available_balance_wei, chain_id);
        (updated, result)
    }

    pub fn apply_min_amount(
        &self,
        request: &TransferRequest,
        available_balance_wei: U256,
        chain_id: u64,
    ) -> (TransferRequest, ValidationResult) {
        let updated = TransferRequest {
            recipient: request.recipient.clone(),
            amount_display: MIN_BUTTON_AMOUNT.to_string(),
        };
        let result = self.validate(&updated, available_balance_wei, chain_id);
        (updated, result)
    }

    /// Value of the typed amount in the quote's primary currency; 0 when the
    /// amount is not a positive number
    pub fn fiat_value(&self, amount: &str, quote: &PriceQuote) -> f64 {
        match parse_ether_amount(amount) {
            Ok(parsed) if !parsed.negative => wei_to_ether_f64(parsed.wei) * quote.primary.value,
            _ => 0.0,
        }
    }

    /// `fiat_value` rendered at 2 decimals
    pub fn fiat_display(&self, amount: &str, quote: &PriceQuote) -> String {
        format!("{:.2}", self.fiat_value(amount, quote))
    }

    /// Validate and, if submittable, produce the payload for the wallet
    pub fn prepare(
        &self,
        request: &TransferRequest,
        available_balance_wei: U256,
        chain_id: u64,
    ) -> Result<TransferPayload, ValidationResult> {
        let mut result = self.validate(request, available_balance_wei, chain_id);
        if !result.can_submit() {
            return Err(result);
        }

        let value_wei = match result.quantized_amount_wei {
            Some(value_wei) => value_wei,
            None => return Err(result),
        };

        match Address::from_str(&request.recipient) {
            Ok(to) => Ok(TransferPayload { to, value_wei, chain_id }),
            Err(_) => {
                result.recipient_error = Some(ErrorKind::InvalidAddress);
                Err(result)
            }
        }
    }
}
