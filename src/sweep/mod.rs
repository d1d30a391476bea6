// src/sweep/mod.rs

//! Sweep executor.
//!
//! Moves a wallet's valued balances to the configured per-family destination,
//! one chain at a time. Chains are grouped by family and processed in
//! [`ChainFamily`] order; within a chain the native asset goes first, then tokens.
//!
//! ## Failure model
//!
//! The first failing chain aborts every chain after it. Transfers that already
//! executed on the failing chain are still written to the ledger, and a
//! `sweep_failed` notification carries the error classification and the last
//! transaction hash on that chain. A transfer that was broadcast but never
//! confirmed is written with `confirmed = false`. A `sweep_succeeded`
//! notification is only sent when every chain completed and at least one
//! transfer was broadcast.
//!
//! ## Keys
//!
//! The seed phrase is fetched from the store on the first chain that needs a
//! signer. Each chain's key is derived just before use and dropped when that
//! chain is finished.

pub mod evm;
pub mod tron;
mod unsupported;

use crate::chains::{get_chain, ChainDescriptor, ChainFamily};
use crate::database::WalletStore;
use crate::derivation::{derive_account, DerivedAccount, SeedPhrase};
use crate::error::{Result, SweepError};
use crate::gateway::{EvmTransport, TronTransport};
use crate::metrics;
use crate::notifications::{NotificationEvent, NotificationSink};
use crate::types::conversions::{string_to_address, u256_to_decimal};
use crate::types::{Destinations, LedgerEntry, SweepOutcome, TransferRecord, ValuedBalanceItem, Wallet};
use chrono::Utc;
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use self::evm::EvmSweep;
use self::tron::TronSweep;

pub struct SweepExecutor {
    store: Arc<dyn WalletStore>,
    evm: Arc<dyn EvmTransport>,
    tron: Arc<dyn TronTransport>,
    sink: Arc<dyn NotificationSink>,
}

impl SweepExecutor {
    pub fn new(
        store: Arc<dyn WalletStore>,
        evm: Arc<dyn EvmTransport>,
        tron: Arc<dyn TronTransport>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            evm,
            tron,
            sink,
        }
    }

    /// Sweeps every chain that has at least one valued balance.
    ///
    /// Returns one outcome per chain on success. On failure the error of the
    /// failing chain is returned after it has been reported to the sink.
    pub async fn sweep(
        &self,
        wallet: &Wallet,
        valued: &[ValuedBalanceItem],
        destinations: &Destinations,
    ) -> Result<Vec<SweepOutcome>> {
        let mut groups: BTreeMap<(ChainFamily, &'static str), Vec<&ValuedBalanceItem>> = BTreeMap::new();
        for v in valued {
            match get_chain(&v.item.chain_id) {
                Some(chain) => groups.entry((chain.family, chain.id)).or_default().push(v),
                None => warn!("⚠️ Ignoring balance on unknown chain {}", v.item.chain_id),
            }
        }

        info!(
            "🧹 Sweeping wallet {} across {} chains",
            wallet.id,
            groups.len()
        );

        let mut seed: Option<SeedPhrase> = None;
        let mut outcomes = Vec::with_capacity(groups.len());

        for ((_, chain_id), items) in groups {
            let Some(chain) = get_chain(chain_id) else {
                continue;
            };
            let source = wallet
                .address_on(chain.id)
                .map(str::to_string)
                .unwrap_or_else(|| items[0].item.source_address.clone());

            let destination = destinations.for_family(chain.family);
            if matches!(
                chain.family,
                ChainFamily::Utxo | ChainFamily::Solana | ChainFamily::CosmosBech32
            ) {
                metrics::increment_sweep(chain.id, "unimplemented");
                outcomes.push(unsupported::log_intent(chain, &source, destination, &items));
                continue;
            }
            let Some(destination) = destination else {
                warn!(
                    "⚠️ No {} destination configured; leaving {} funds in place",
                    chain.family, chain.id
                );
                metrics::increment_sweep(chain.id, "skipped");
                outcomes.push(SweepOutcome {
                    chain_id: chain.id.to_string(),
                    family: chain.family,
                    source_address: source,
                    transfers: Vec::new(),
                    skipped: Some(format!("no {} destination configured", chain.family)),
                });
                continue;
            };

            let mut transfers = Vec::new();
            let result = self
                .sweep_chain(wallet, chain, &mut seed, &source, destination, &items, &mut transfers)
                .await;

            self.record_ledger(wallet, chain, &source, &transfers).await;

            if let Err(err) = result {
                error!(
                    "❌ Sweep of wallet {} failed on {} after {} transfers: {}",
                    wallet.id,
                    chain.id,
                    transfers.len(),
                    err
                );
                metrics::increment_sweep(chain.id, "failed");
                let mut event = NotificationEvent::sweep_failed(
                    wallet.id,
                    chain.id,
                    &err,
                    vec![source.clone(), destination.to_string()],
                );
                event.tx_hash = transfers.last().map(|t| t.tx_hash.clone());
                if let Err(e) = self.sink.notify(event).await {
                    warn!("⚠️ sweep-failed notification failed: {}", e);
                }
                return Err(err);
            }

            metrics::increment_sweep(chain.id, "succeeded");
            outcomes.push(SweepOutcome {
                chain_id: chain.id.to_string(),
                family: chain.family,
                source_address: source,
                transfers,
                skipped: None,
            });
        }

        self.announce_success(wallet, &outcomes).await;
        Ok(outcomes)
    }

    #[allow(clippy::too_many_arguments)]
    async fn sweep_chain(
        &self,
        wallet: &Wallet,
        chain: &'static ChainDescriptor,
        seed: &mut Option<SeedPhrase>,
        source: &str,
        destination: &str,
        items: &[&ValuedBalanceItem],
        transfers: &mut Vec<TransferRecord>,
    ) -> Result<()> {
        if seed.is_none() {
            *seed = Some(self.store.load_seed_phrase(wallet.id).await?);
        }
        let Some(seed) = seed.as_ref() else {
            return Err(SweepError::Validation(format!("no seed for wallet {}", wallet.id)));
        };

        let account = derive_account(seed, chain)?;
        ensure_signer_matches(&account, source)?;
        let signer = account.key.as_secp256k1().ok_or_else(|| {
            SweepError::Signing(format!("{} key is not secp256k1", chain.id))
        })?;

        match chain.family {
            ChainFamily::Evm => {
                let parse = |label: &str, value: &str| {
                    string_to_address(value).map_err(|e| {
                        SweepError::Validation(format!("{} {} address {}: {}", chain.id, label, value, e))
                    })
                };
                EvmSweep {
                    chain,
                    transport: self.evm.as_ref(),
                    wallet: signer,
                    source: parse("source", source)?,
                    destination: parse("destination", destination)?,
                    destination_label: destination,
                }
                .run(items, transfers)
                .await
            }
            ChainFamily::Tron => {
                TronSweep {
                    chain,
                    transport: self.tron.as_ref(),
                    wallet: signer,
                    source,
                    destination,
                }
                .run(items, transfers)
                .await
            }
            ChainFamily::Utxo | ChainFamily::Solana | ChainFamily::CosmosBech32 => {
                Err(SweepError::Unimplemented { family: chain.family })
            }
        }
    }

    async fn record_ledger(
        &self,
        wallet: &Wallet,
        chain: &ChainDescriptor,
        source: &str,
        transfers: &[TransferRecord],
    ) {
        for t in transfers {
            let entry = LedgerEntry {
                wallet_id: wallet.id,
                chain_id: chain.id.to_string(),
                kind: t.kind.as_str().to_string(),
                symbol: t.symbol.clone(),
                amount: t.amount.to_string(),
                value_usd: t.value_usd,
                tx_hash: t.tx_hash.clone(),
                source: source.to_string(),
                destination: t.destination.clone(),
                confirmed: t.confirmed,
                created_at: Utc::now(),
            };
            if let Err(e) = self.store.record_transfer(&entry).await {
                warn!(
                    "⚠️ Could not record {} transfer {} in the ledger: {}",
                    chain.id, t.tx_hash, e
                );
            }
        }
    }

    async fn announce_success(&self, wallet: &Wallet, outcomes: &[SweepOutcome]) {
        let transfers: Vec<&TransferRecord> = outcomes.iter().flat_map(|o| &o.transfers).collect();
        if transfers.is_empty() {
            info!("Nothing was moved for wallet {}", wallet.id);
            return;
        }

        let total: f64 = outcomes.iter().map(SweepOutcome::value_moved_usd).sum();
        let amounts = transfers.iter().map(|t| describe_amount(t)).collect();
        let mut addresses: Vec<String> = Vec::new();
        for t in &transfers {
            if !addresses.contains(&t.destination) {
                addresses.push(t.destination.clone());
            }
        }
        let tx_hash = transfers.first().map(|t| t.tx_hash.clone());

        info!(
            "✅ Swept ${:.2} from wallet {} in {} transfers",
            total,
            wallet.id,
            transfers.len()
        );
        let event = NotificationEvent::sweep_succeeded(wallet.id, total, amounts, addresses, tx_hash);
        if let Err(e) = self.sink.notify(event).await {
            warn!("⚠️ sweep-succeeded notification failed: {}", e);
        }
    }
}

/// Pushes the transfer built from `sent`'s hash. A transfer that was broadcast
/// but never confirmed is kept with `confirmed: false` before its error is returned.
pub(crate) fn record_send(
    transfers: &mut Vec<TransferRecord>,
    sent: Result<String>,
    transfer: impl FnOnce(String) -> TransferRecord,
) -> Result<()> {
    match sent {
        Ok(tx_hash) => {
            transfers.push(transfer(tx_hash));
            Ok(())
        }
        Err(err) => {
            if let Some(tx_hash) = err.broadcast_tx_hash() {
                warn!("⚠️ {} left the node unconfirmed; recording it", tx_hash);
                transfers.push(TransferRecord {
                    confirmed: false,
                    ..transfer(tx_hash.to_string())
                });
            }
            Err(err)
        }
    }
}

fn ensure_signer_matches(account: &DerivedAccount, expected: &str) -> Result<()> {
    let matches = match account.family {
        ChainFamily::Evm => account.address.eq_ignore_ascii_case(expected),
        _ => account.address == expected,
    };
    if matches {
        Ok(())
    } else {
        Err(SweepError::Validation(format!(
            "derived {} address {} does not match stored address {}",
            account.chain_id, account.address, expected
        )))
    }
}

/// `"12 ETH"`, falling back to raw units when the amount cannot be scaled.
fn describe_amount(t: &TransferRecord) -> String {
    match u256_to_decimal(t.amount, t.decimals) {
        Ok(amount) => format!("{} {}", amount.normalize(), t.symbol),
        Err(_) => format!("{} raw {}", t.amount, t.symbol),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransferKind;
    use ethers::types::U256;

    #[test]
    fn test_describe_amount_uses_decimals() {
        let t = TransferRecord {
            kind: TransferKind::Native,
            symbol: "ETH".into(),
            amount: U256::from(12u64) * U256::exp10(18),
            decimals: 18,
            tx_hash: "0x01".into(),
            destination: "0xdest".into(),
            value_usd: 0.0,
            confirmed: true,
        };
        assert_eq!(describe_amount(&t), "12 ETH");
    }
}
