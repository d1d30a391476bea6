// src/error.rs

use crate::chains::ChainFamily;
use crate::endpoint_pool::TierFailure;
use ethers::types::U256;

/// Library-wide result alias.
pub type Result<T> = std::result::Result<T, SweepError>;

/// Error taxonomy shared by the resolver, the aggregator and the sweep executor.
///
/// The variants are deliberately coarse: an operator reading a sweep-failure
/// notification must be able to tell "top up the native fee balance" apart
/// from "investigate immediately" without reading logs. See [`SweepError::classification`].
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("all endpoints failed for {chain_id}: {}", describe_tiers(.attempts))]
    AllEndpointsFailed {
        chain_id: String,
        attempts: Vec<TierFailure>,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("key derivation failed for {chain_id}: {reason}")]
    Derivation { chain_id: String, reason: String },

    #[error("insufficient reserve on {chain_id}: balance {balance} does not cover reserve {reserve}")]
    InsufficientReserve {
        chain_id: String,
        balance: U256,
        reserve: U256,
    },

    #[error(
        "gas fee insufficient on {chain_id} for {symbol} transfer: need {required}, have {available} (short by {shortfall})"
    )]
    GasFeeInsufficient {
        chain_id: String,
        symbol: String,
        required: U256,
        available: U256,
        shortfall: U256,
    },

    #[error("balance fetch failed for {symbol} on {chain_id} ({address}): {reason}")]
    PartialFetch {
        chain_id: String,
        symbol: String,
        address: String,
        reason: String,
    },

    #[error("{chain_id} transfer {tx_hash} was broadcast but not confirmed: {reason}")]
    TransferNotConfirmed {
        chain_id: String,
        tx_hash: String,
        reason: String,
    },

    #[error("{family} sweep is not implemented")]
    Unimplemented { family: ChainFamily },

    #[error("rpc error on {chain_id}: {message}")]
    Rpc { chain_id: String, message: String },

    #[error("signing error: {0}")]
    Signing(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SweepError {
    pub fn rpc(chain_id: &str, message: impl std::fmt::Display) -> Self {
        Self::Rpc {
            chain_id: chain_id.to_string(),
            message: message.to_string(),
        }
    }

    /// Stable label attached to failure notifications.
    pub fn classification(&self) -> &'static str {
        match self {
            Self::GasFeeInsufficient { .. } => "top_up_native_fee",
            Self::InsufficientReserve { .. } => "insufficient_reserve",
            Self::Unimplemented { .. } => "unimplemented",
            Self::TransferNotConfirmed { .. } => "unconfirmed_broadcast",
            Self::PartialFetch { .. } => "partial_fetch",
            Self::Validation(_) | Self::Config(_) => "configuration",
            Self::AllEndpointsFailed { .. }
            | Self::Derivation { .. }
            | Self::Rpc { .. }
            | Self::Signing(_)
            | Self::Persistence(_) => "investigate",
        }
    }

    /// Hash of a transaction that left the node even though the call failed.
    pub fn broadcast_tx_hash(&self) -> Option<&str> {
        match self {
            Self::TransferNotConfirmed { tx_hash, .. } => Some(tx_hash),
            _ => None,
        }
    }

    /// True when the fix is funding the source address with more native fee balance.
    pub fn needs_fee_top_up(&self) -> bool {
        matches!(self, Self::GasFeeInsufficient { .. })
    }
}

fn describe_tiers(attempts: &[TierFailure]) -> String {
    if attempts.is_empty() {
        return "no candidate endpoints configured".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("[tier {} {}: {}]", a.tier + 1, a.endpoint, a.error))
        .collect::<Vec<_>>()
        .join(" ")
}

impl From<sqlx::Error> for SweepError {
    fn from(e: sqlx::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<ethers::signers::WalletError> for SweepError {
    fn from(e: ethers::signers::WalletError) -> Self {
        Self::Signing(e.to_string())
    }
}
