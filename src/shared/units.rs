//! Ether/wei quantization helpers
//!
//! All amounts travel through the crate as integer wei (`U256`); decimal
//! strings only exist at the edges (user input, display).

use alloy_primitives::U256;
use thiserror::Error;

pub const ETHER_DECIMALS: usize = 18;

/// 1 ETH = 10^18 wei
pub const WEI_PER_ETHER: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Smallest transfer accepted: 0.000001 ETH
pub const MIN_TRANSFER_WEI: U256 = U256::from_limbs([1_000_000_000_000, 0, 0, 0]);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitsError {
    #[error("empty amount")]
    Empty,

    #[error("not a decimal number: {0}")]
    NotNumeric(String),

    #[error("amount does not fit in 256 bits")]
    Overflow,
}

/// A decimal ether string quantized to wei
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAmount {
    pub wei: U256,
    pub negative: bool,
    /// Non-zero digits past the 18th decimal were dropped
    pub truncated: bool,
}

impl ParsedAmount {
    /// Strictly greater than zero before quantization
    pub fn is_positive(&self) -> bool {
        !self.negative && (!self.wei.is_zero() || self.truncated)
    }
}

/// Parse a user-typed decimal ether amount (`"1"`, `"0.5"`, `".25"`, `"-3"`)
pub fn parse_ether_amount(input: &str) -> Result<ParsedAmount, UnitsError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UnitsError::Empty);
    }

    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part) {
        return Err(UnitsError::NotNumeric(trimmed.to_string()));
    }

    let (kept, dropped) = frac_part.split_at(frac_part.len().min(ETHER_DECIMALS));
    let truncated = dropped.bytes().any(|b| b != b'0');
    let padding = std::iter::repeat(b'0').take(ETHER_DECIMALS - kept.len());

    let ten = U256::from(10u8);
    let mut wei = U256::ZERO;
    for digit in int_part.bytes().chain(kept.bytes()).chain(padding) {
        wei = wei
            .checked_mul(ten)
            .and_then(|w| w.checked_add(U256::from(digit - b'0')))
            .ok_or(UnitsError::Overflow)?;
    }

    Ok(ParsedAmount { wei, negative, truncated })
}

/// Render wei as ether with exactly `decimals` fractional digits, truncating
pub fn format_ether(wei: U256, decimals: usize) -> String {
    let whole = wei / WEI_PER_ETHER;
    if decimals == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", (wei % WEI_PER_ETHER).to_string(), width = ETHER_DECIMALS);
    format!("{}.{}", whole, &frac[..decimals.min(ETHER_DECIMALS)])
}

/// Lossy conversion for fiat display only
pub fn wei_to_ether_f64(wei: U256) -> f64 {
    format_ether(wei, ETHER_DECIMALS).parse().unwrap_or(0.0)
}

/// Drop everything below the `decimals`-th fractional digit
pub fn truncate_to_decimals(wei: U256, decimals: usize) -> U256 {
    if decimals >= ETHER_DECIMALS {
        return wei;
    }
    let step = U256::from(10u8).pow(U256::from(ETHER_DECIMALS - decimals));
    wei - wei % step
}

/// `percent`% of `wei`, rounded down, without overflowing for large balances
pub fn percent_of(wei: U256, percent: u8) -> U256 {
    let hundred = U256::from(100u8);
    let pct = U256::from(percent);
    wei / hundred * pct + wei % hundred * pct / hundred
}
