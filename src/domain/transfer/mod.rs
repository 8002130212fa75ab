//! Transfer domain - validation and quantization of outbound transfers

mod transfer_validator;

pub use transfer_validator::TransferValidator;

use alloy_primitives::{Address, U256};
use serde::Serialize;

/// Quick-amount buttons, as a share of the available balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuickPercent {
    Quarter,
    Half,
    ThreeQuarters,
    Max,
}

impl QuickPercent {
    pub const ALL: [QuickPercent; 4] = [Self::Quarter, Self::Half, Self::ThreeQuarters, Self::Max];

    pub fn percent(&self) -> u8 {
        match self {
            QuickPercent::Quarter => 25,
            QuickPercent::Half => 50,
            QuickPercent::ThreeQuarters => 75,
            QuickPercent::Max => 100,
        }
    }

    pub fn from_percent(percent: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.percent() == percent)
    }
}

/// Chain-ready transfer handed to the wallet for signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferPayload {
    pub to: Address,
    pub value_wei: U256,
    pub chain_id: u64,
}
