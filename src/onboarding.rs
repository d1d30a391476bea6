// src/onboarding.rs

use crate::chains::{enabled_chains, ChainDescriptor};
use crate::database::WalletStore;
use crate::derivation::{derive_addresses, SeedPhrase};
use crate::error::{Result, SweepError};
use crate::notifications::{NotificationEvent, NotificationSink};
use crate::types::{NetworkAddress, Wallet};
use log::{info, warn};

/// A stored wallet plus the chains that could not be derived.
#[derive(Debug)]
pub struct OnboardedWallet {
    pub wallet: Wallet,
    pub skipped_chains: Vec<(String, SweepError)>,
}

/// Validates the phrase, derives every enabled chain, persists the wallet and its
/// addresses, then announces it.
pub async fn onboard_wallet(
    store: &dyn WalletStore,
    sink: &dyn NotificationSink,
    name: &str,
    owner_ref: Option<&str>,
    phrase: &str,
) -> Result<OnboardedWallet> {
    onboard_wallet_on(store, sink, name, owner_ref, phrase, &enabled_chains()).await
}

pub async fn onboard_wallet_on(
    store: &dyn WalletStore,
    sink: &dyn NotificationSink,
    name: &str,
    owner_ref: Option<&str>,
    phrase: &str,
    chains: &[&'static ChainDescriptor],
) -> Result<OnboardedWallet> {
    let seed = SeedPhrase::parse(phrase)?;
    let batch = derive_addresses(&seed, chains).await;
    if batch.addresses.is_empty() {
        return Err(SweepError::Validation(format!(
            "no chain could be derived for wallet {}",
            name
        )));
    }

    let mut wallet = store.create_wallet(name, owner_ref, &seed).await?;
    for derived in batch.addresses {
        let entry = NetworkAddress {
            wallet_id: wallet.id,
            chain_id: derived.chain_id,
            address: derived.address,
        };
        store.add_network_address(&entry).await?;
        wallet.networks.push(entry);
    }

    info!(
        "🆕 Onboarded wallet {} ({}) on {} chains, {} skipped",
        wallet.id,
        wallet.name,
        wallet.networks.len(),
        batch.failures.len()
    );

    let addresses = wallet
        .networks
        .iter()
        .map(|n| format!("{}:{}", n.chain_id, n.address))
        .collect();
    if let Err(e) = sink
        .notify(NotificationEvent::wallet_created(wallet.id, addresses))
        .await
    {
        warn!("⚠️ wallet-created notification failed: {}", e);
    }

    Ok(OnboardedWallet {
        wallet,
        skipped_chains: batch.failures,
    })
}
