use crate::chains::ChainFamily;
use crate::derivation::decode_tron_address;
use crate::error::{Result, SweepError};
use crate::types::conversions::string_to_address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Custodial wallet: one seed phrase, one address per chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub name: String,
    /// Device or owner reference supplied at onboarding.
    pub owner_ref: Option<String>,
    pub networks: Vec<NetworkAddress>,
}

impl Wallet {
    pub fn address_on(&self, chain_id: &str) -> Option<&str> {
        self.networks
            .iter()
            .find(|n| n.chain_id == chain_id)
            .map(|n| n.address.as_str())
    }
}

/// At most one per (wallet_id, chain_id); the store enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkAddress {
    pub wallet_id: Uuid,
    pub chain_id: String,
    pub address: String,
}

/// Sweep destinations, one per family that can actually be swept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Destinations {
    #[serde(default)]
    pub evm: Option<String>,
    #[serde(default)]
    pub utxo: Option<String>,
    #[serde(default)]
    pub tron: Option<String>,
}

impl Destinations {
    pub fn for_family(&self, family: ChainFamily) -> Option<&str> {
        match family {
            ChainFamily::Evm => self.evm.as_deref(),
            ChainFamily::Utxo => self.utxo.as_deref(),
            ChainFamily::Tron => self.tron.as_deref(),
            ChainFamily::Solana | ChainFamily::CosmosBech32 => None,
        }
    }

    /// Checks every configured destination against its family's address format.
    pub fn validate(&self) -> Result<()> {
        if let Some(evm) = &self.evm {
            string_to_address(evm)
                .map_err(|e| SweepError::Validation(format!("evm destination {}: {}", evm, e)))?;
        }
        if let Some(tron) = &self.tron {
            decode_tron_address(tron)?;
        }
        if let Some(utxo) = &self.utxo {
            bitcoin::Address::from_str(utxo)
                .map_err(|e| e.to_string())
                .and_then(|a| {
                    a.require_network(bitcoin::Network::Bitcoin)
                        .map_err(|e| e.to_string())
                })
                .map_err(|e| SweepError::Validation(format!("utxo destination {}: {}", utxo, e)))?;
        }
        Ok(())
    }
}

/// Snapshot of the externally editable monitor configuration.
///
/// Loaded fresh at the start of every cycle and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub threshold_usd: f64,
    pub destinations: Destinations,
    pub poll_interval_ms: u64,
}

/// One executed transfer, as written to the history ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub wallet_id: Uuid,
    pub chain_id: String,
    pub kind: String,
    pub symbol: String,
    pub amount: String,
    pub value_usd: f64,
    pub tx_hash: String,
    pub source: String,
    pub destination: String,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destinations_validate_accepts_well_formed_addresses() {
        let d = Destinations {
            evm: Some("0xdAC17F958D2ee523a2206206994597C13D831ec7".into()),
            utxo: Some("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq".into()),
            tron: Some("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".into()),
        };
        assert!(d.validate().is_ok());
        assert_eq!(d.for_family(ChainFamily::Solana), None);
        assert!(d.for_family(ChainFamily::Tron).is_some());
    }

    #[test]
    fn test_destinations_validate_rejects_wrong_family_format() {
        let d = Destinations {
            evm: Some("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".into()),
            ..Default::default()
        };
        assert!(matches!(d.validate(), Err(SweepError::Validation(_))));

        let d = Destinations {
            tron: Some("0xdAC17F958D2ee523a2206206994597C13D831ec7".into()),
            ..Default::default()
        };
        assert!(d.validate().is_err());
    }
}
