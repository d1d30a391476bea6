use crate::chains::ChainFamily;
use crate::error::SweepError;
use crate::types::conversions::units_to_f64;
use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// One fetched balance. Produced per (chain, asset) for every check, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceItem {
    pub chain_id: String,
    pub symbol: String,
    pub raw_balance: U256,
    pub decimals: u8,
    pub is_token: bool,
    /// Contract / mint / denom for token items.
    pub token_id: Option<String>,
    pub source_address: String,
    pub error: Option<String>,
}

impl BalanceItem {
    pub fn failed(
        chain_id: &str,
        symbol: &str,
        is_token: bool,
        source_address: &str,
        error: impl ToString,
    ) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            symbol: symbol.to_string(),
            raw_balance: U256::zero(),
            decimals: 0,
            is_token,
            token_id: None,
            source_address: source_address.to_string(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The fetch failure as a typed error; `None` for successful items.
    pub fn fetch_error(&self) -> Option<SweepError> {
        self.error.as_ref().map(|reason| SweepError::PartialFetch {
            chain_id: self.chain_id.clone(),
            symbol: self.symbol.clone(),
            address: self.source_address.clone(),
            reason: reason.clone(),
        })
    }

    /// Balance in human units; 0.0 for failed items.
    pub fn amount(&self) -> f64 {
        if !self.is_ok() {
            return 0.0;
        }
        units_to_f64(self.raw_balance, self.decimals).unwrap_or(0.0)
    }
}

/// Only built for items with a resolvable price > 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuedBalanceItem {
    pub item: BalanceItem,
    pub price_usd: f64,
    pub value_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Native,
    Token,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Token => "token",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub kind: TransferKind,
    pub symbol: String,
    pub amount: U256,
    pub decimals: u8,
    pub tx_hash: String,
    pub destination: String,
    pub value_usd: f64,
    /// False when the transaction was broadcast but its receipt never came back.
    pub confirmed: bool,
}

/// Result of sweeping one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub chain_id: String,
    pub family: ChainFamily,
    pub source_address: String,
    pub transfers: Vec<TransferRecord>,
    /// Set when the chain was deliberately not swept (e.g. unimplemented family).
    pub skipped: Option<String>,
}

impl SweepOutcome {
    pub fn value_moved_usd(&self) -> f64 {
        self.transfers.iter().map(|t| t.value_usd).sum()
    }
}
