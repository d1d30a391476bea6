// src/gateway/utxo.rs

//! UTXO balances from public block explorers.
//!
//! Explorers are tried in configured order through the same tiered combinator the
//! endpoint pool uses. When every explorer fails the balance is reported as zero
//! rather than as an error.

use crate::endpoint_pool::try_in_order;
use crate::rpc_client::{build_http_client, RestClient};
use crate::settings::{ExplorerConfig, ExplorerKind, UtxoSettings};
use anyhow::{anyhow, Result};
use ethers::types::U256;
use log::{debug, warn};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct EsploraAddress {
    chain_stats: EsploraStats,
}

#[derive(Debug, Deserialize)]
struct EsploraStats {
    funded_txo_sum: u64,
    spent_txo_sum: u64,
}

#[derive(Debug, Deserialize)]
struct BlockcypherBalance {
    final_balance: i64,
}

pub struct UtxoExplorer {
    http: reqwest::Client,
    explorers: Vec<ExplorerConfig>,
    timeout: Duration,
}

impl UtxoExplorer {
    pub fn new(settings: &UtxoSettings) -> Result<Self> {
        Ok(Self {
            http: build_http_client()?,
            explorers: settings.explorers.clone(),
            timeout: Duration::from_millis(settings.timeout_ms),
        })
    }

    /// Confirmed balance in satoshis; zero when no explorer answers.
    pub async fn balance(&self, address: &str) -> U256 {
        let candidates: Vec<String> = self.explorers.iter().map(|e| e.base_url.clone()).collect();
        let outcome = try_in_order(&candidates, self.timeout, |base_url| {
            let kind = self
                .explorers
                .iter()
                .find(|e| e.base_url == base_url)
                .map(|e| e.kind);
            async move {
                let kind = kind.ok_or_else(|| anyhow!("unknown explorer {}", base_url))?;
                self.fetch(kind, &base_url, address).await
            }
        })
        .await;

        match outcome {
            Ok(success) => {
                debug!(
                    "UTXO balance for {} from {}: {} sat",
                    address, success.endpoint, success.value
                );
                success.value
            }
            Err(failures) => {
                warn!(
                    "⚠️ All {} UTXO explorers failed for {}; assuming zero balance",
                    failures.len(),
                    address
                );
                U256::zero()
            }
        }
    }

    async fn fetch(&self, kind: ExplorerKind, base_url: &str, address: &str) -> Result<U256> {
        let client = RestClient::new(self.http.clone(), base_url);
        match kind {
            ExplorerKind::Esplora => {
                let info: EsploraAddress = client.get(&format!("/address/{}", address)).await?;
                esplora_balance(&info)
            }
            ExplorerKind::Blockcypher => {
                let info: BlockcypherBalance =
                    client.get(&format!("/addrs/{}/balance", address)).await?;
                u64::try_from(info.final_balance)
                    .map(U256::from)
                    .map_err(|_| anyhow!("negative balance {}", info.final_balance))
            }
        }
    }
}

fn esplora_balance(info: &EsploraAddress) -> Result<U256> {
    info.chain_stats
        .funded_txo_sum
        .checked_sub(info.chain_stats.spent_txo_sum)
        .map(U256::from)
        .ok_or_else(|| anyhow!("spent exceeds funded"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_esplora_balance_is_funded_minus_spent() {
        let info: EsploraAddress = serde_json::from_value(serde_json::json!({
            "address": "bc1q...",
            "chain_stats": { "funded_txo_sum": 150_000, "spent_txo_sum": 50_000, "tx_count": 3 },
            "mempool_stats": { "funded_txo_sum": 0, "spent_txo_sum": 0, "tx_count": 0 }
        }))
        .unwrap();
        assert_eq!(esplora_balance(&info).unwrap(), U256::from(100_000u64));
    }

    #[tokio::test]
    async fn test_exhausted_explorers_report_zero() {
        let settings = UtxoSettings {
            explorers: Vec::new(),
            timeout_ms: 100,
        };
        let explorer = UtxoExplorer::new(&settings).unwrap();
        assert_eq!(
            explorer.balance("bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu").await,
            U256::zero()
        );
    }
}
