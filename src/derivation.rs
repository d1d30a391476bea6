// src/derivation.rs

//! Multi-family key derivation.
//!
//! A validated [`SeedPhrase`] plus a [`ChainDescriptor`] yields an address and a
//! signing key. Keys are returned by value and never cached here; callers drop
//! them as soon as the derivation or signing call is over.

use crate::chains::{ChainDescriptor, ChainFamily};
use crate::error::{Result, SweepError};
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::hashes::{hash160, Hash};
use bitcoin::key::CompressedPublicKey;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::Network;
use ethers::signers::coins_bip39::English;
use ethers::signers::{LocalWallet, MnemonicBuilder, Signer};
use ethers::types::Address;
use futures::future::join_all;
use log::{debug, warn};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, Zeroizing};

const TRON_ADDRESS_PREFIX: u8 = 0x41;

/// BIP39 mnemonic whose checksum has been verified.
#[derive(Clone)]
pub struct SeedPhrase {
    phrase: Zeroizing<String>,
}

impl SeedPhrase {
    /// Normalizes whitespace/case and verifies the BIP39 checksum.
    pub fn parse(phrase: &str) -> Result<Self> {
        let normalized = Zeroizing::new(
            phrase
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
        );
        bip39::Mnemonic::parse_in_normalized(bip39::Language::English, &normalized)
            .map_err(|e| SweepError::Validation(format!("invalid seed phrase: {}", e)))?;
        Ok(Self { phrase: normalized })
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn word_count(&self) -> usize {
        self.phrase.split(' ').count()
    }

    /// 64-byte BIP39 seed (empty passphrase).
    fn seed(&self) -> Result<Zeroizing<[u8; 64]>> {
        let mnemonic = bip39::Mnemonic::parse_in_normalized(bip39::Language::English, &self.phrase)
            .map_err(|e| SweepError::Validation(format!("invalid seed phrase: {}", e)))?;
        Ok(Zeroizing::new(mnemonic.to_seed("")))
    }
}

impl fmt::Debug for SeedPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeedPhrase(<{} words redacted>)", self.word_count())
    }
}

/// Signing material for one chain. Dropped (and zeroized by the underlying key types)
/// at the end of the signing call that needed it.
pub enum SigningKey {
    /// EVM, Tron and Cosmos families all sign with a secp256k1 wallet.
    Secp256k1(LocalWallet),
    Bitcoin(bitcoin::PrivateKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl SigningKey {
    pub fn as_secp256k1(&self) -> Option<&LocalWallet> {
        match self {
            Self::Secp256k1(w) => Some(w),
            _ => None,
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Secp256k1(_) => "secp256k1",
            Self::Bitcoin(_) => "bitcoin",
            Self::Ed25519(_) => "ed25519",
        };
        write!(f, "SigningKey::{}(<redacted>)", kind)
    }
}

#[derive(Debug)]
pub struct DerivedAccount {
    pub chain_id: &'static str,
    pub family: ChainFamily,
    pub address: String,
    pub key: SigningKey,
}

impl DerivedAccount {
    pub fn into_address(self) -> DerivedAddress {
        DerivedAddress {
            chain_id: self.chain_id.to_string(),
            family: self.family,
            address: self.address,
        }
    }
}

/// Address-only view, safe to keep around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    pub chain_id: String,
    pub family: ChainFamily,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtxoAddressKind {
    /// P2PKH, BIP44
    Legacy,
    /// P2SH-P2WPKH, BIP49
    WrappedSegwit,
    /// P2WPKH, BIP84
    NativeSegwit,
}

impl UtxoAddressKind {
    fn purpose(&self) -> u32 {
        match self {
            Self::Legacy => 44,
            Self::WrappedSegwit => 49,
            Self::NativeSegwit => 84,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoAddresses {
    pub legacy: String,
    pub wrapped_segwit: String,
    pub native_segwit: String,
}

impl UtxoAddresses {
    /// The address stored when only one is needed.
    pub fn canonical(&self) -> &str {
        &self.native_segwit
    }
}

/// Result of a fan-out derivation. Failed chains are listed, never fatal.
#[derive(Debug, Default)]
pub struct BatchDerivation {
    pub addresses: Vec<DerivedAddress>,
    pub failures: Vec<(String, SweepError)>,
}

fn derivation_error(chain: &ChainDescriptor, reason: impl fmt::Display) -> SweepError {
    SweepError::Derivation {
        chain_id: chain.id.to_string(),
        reason: reason.to_string(),
    }
}

/// Derives the address and signing key of `seed` on `chain`.
pub fn derive_account(seed: &SeedPhrase, chain: &'static ChainDescriptor) -> Result<DerivedAccount> {
    let (address, key) = match chain.family {
        ChainFamily::Evm => {
            let mut wallet = secp256k1_wallet(seed, chain)?;
            if let Some(chain_id) = chain.evm_chain_id {
                wallet = wallet.with_chain_id(chain_id);
            }
            let address = ethers::utils::to_checksum(&wallet.address(), None);
            (address, SigningKey::Secp256k1(wallet))
        }
        ChainFamily::Tron => {
            let wallet = secp256k1_wallet(seed, chain)?;
            let address = encode_tron_address(wallet.address());
            (address, SigningKey::Secp256k1(wallet))
        }
        ChainFamily::CosmosBech32 => {
            let wallet = secp256k1_wallet(seed, chain)?;
            let prefix = chain
                .bech32_prefix
                .ok_or_else(|| derivation_error(chain, "missing bech32 prefix"))?;
            let public_key = wallet.signer().verifying_key().to_encoded_point(true);
            let address = encode_bech32_account(prefix, public_key.as_bytes())
                .map_err(|e| derivation_error(chain, e))?;
            (address, SigningKey::Secp256k1(wallet))
        }
        ChainFamily::Utxo => {
            let (address, key) = derive_utxo_key(seed, chain, UtxoAddressKind::NativeSegwit)?;
            (address, SigningKey::Bitcoin(key))
        }
        ChainFamily::Solana => {
            let seed_bytes = seed.seed()?;
            let mut secret = [0u8; 32];
            secret.copy_from_slice(&seed_bytes[..32]);
            let key = ed25519_dalek::SigningKey::from_bytes(&secret);
            secret.zeroize();
            let address = bs58::encode(key.verifying_key().as_bytes()).into_string();
            (address, SigningKey::Ed25519(key))
        }
    };

    debug!("Derived {} address for {}", chain.family, chain.id);
    Ok(DerivedAccount {
        chain_id: chain.id,
        family: chain.family,
        address,
        key,
    })
}

/// Address only; the key is dropped before returning.
pub fn derive_address(seed: &SeedPhrase, chain: &'static ChainDescriptor) -> Result<DerivedAddress> {
    derive_account(seed, chain).map(DerivedAccount::into_address)
}

/// All three UTXO encodings for the same seed.
pub fn derive_utxo_addresses(
    seed: &SeedPhrase,
    chain: &'static ChainDescriptor,
) -> Result<UtxoAddresses> {
    if chain.family != ChainFamily::Utxo {
        return Err(derivation_error(chain, "not a UTXO chain"));
    }
    Ok(UtxoAddresses {
        legacy: derive_utxo_key(seed, chain, UtxoAddressKind::Legacy)?.0,
        wrapped_segwit: derive_utxo_key(seed, chain, UtxoAddressKind::WrappedSegwit)?.0,
        native_segwit: derive_utxo_key(seed, chain, UtxoAddressKind::NativeSegwit)?.0,
    })
}

/// Derives every chain concurrently. One chain failing never fails the batch.
pub async fn derive_addresses(
    seed: &SeedPhrase,
    chains: &[&'static ChainDescriptor],
) -> BatchDerivation {
    let tasks = chains.iter().map(|&chain| {
        let seed = seed.clone();
        async move {
            let result = tokio::task::spawn_blocking(move || derive_address(&seed, chain))
                .await
                .unwrap_or_else(|e| Err(derivation_error(chain, format!("task failed: {}", e))));
            (chain.id, result)
        }
    });

    let mut batch = BatchDerivation::default();
    for (chain_id, result) in join_all(tasks).await {
        match result {
            Ok(address) => batch.addresses.push(address),
            Err(e) => {
                warn!("⚠️ Derivation failed for {}: {}", chain_id, e);
                batch.failures.push((chain_id.to_string(), e));
            }
        }
    }
    batch
}

fn secp256k1_wallet(seed: &SeedPhrase, chain: &ChainDescriptor) -> Result<LocalWallet> {
    let path = chain
        .derivation_path
        .ok_or_else(|| derivation_error(chain, "missing derivation path"))?;
    MnemonicBuilder::<English>::default()
        .phrase(seed.phrase())
        .derivation_path(path)
        .map_err(|e| derivation_error(chain, e))?
        .build()
        .map_err(|e| derivation_error(chain, e))
}

/// Swaps the purpose level of the chain's BIP84 path for the requested encoding.
fn utxo_path(chain: &ChainDescriptor, kind: UtxoAddressKind) -> Result<DerivationPath> {
    let base = chain
        .derivation_path
        .ok_or_else(|| derivation_error(chain, "missing derivation path"))?;
    let mut levels: Vec<String> = base.split('/').map(str::to_string).collect();
    if levels.len() < 2 || levels[0] != "m" {
        return Err(derivation_error(chain, format!("malformed path {}", base)));
    }
    levels[1] = format!("{}'", kind.purpose());
    DerivationPath::from_str(&levels.join("/")).map_err(|e| derivation_error(chain, e))
}

fn derive_utxo_key(
    seed: &SeedPhrase,
    chain: &ChainDescriptor,
    kind: UtxoAddressKind,
) -> Result<(String, bitcoin::PrivateKey)> {
    let secp = Secp256k1::new();
    let seed_bytes = seed.seed()?;
    let master =
        Xpriv::new_master(Network::Bitcoin, &seed_bytes[..]).map_err(|e| derivation_error(chain, e))?;
    let path = utxo_path(chain, kind)?;
    let child = master
        .derive_priv(&secp, &path)
        .map_err(|e| derivation_error(chain, e))?;

    let public_key = CompressedPublicKey(child.private_key.public_key(&secp));
    let address = match kind {
        UtxoAddressKind::Legacy => bitcoin::Address::p2pkh(public_key, Network::Bitcoin),
        UtxoAddressKind::WrappedSegwit => bitcoin::Address::p2shwpkh(&public_key, Network::Bitcoin),
        UtxoAddressKind::NativeSegwit => bitcoin::Address::p2wpkh(&public_key, Network::Bitcoin),
    };
    Ok((address.to_string(), child.to_priv()))
}

/// SHA-256 then RIPEMD-160 of the compressed public key, bech32 encoded.
pub fn encode_bech32_account(prefix: &str, compressed_public_key: &[u8]) -> std::result::Result<String, String> {
    let hrp = bech32::Hrp::parse(prefix).map_err(|e| e.to_string())?;
    let digest = hash160::Hash::hash(compressed_public_key);
    bech32::encode::<bech32::Bech32>(hrp, digest.as_byte_array()).map_err(|e| e.to_string())
}

/// 0x41 || account id, base58check.
pub fn encode_tron_address(account: Address) -> String {
    let mut bytes = Vec::with_capacity(21);
    bytes.push(TRON_ADDRESS_PREFIX);
    bytes.extend_from_slice(account.as_bytes());
    bs58::encode(bytes).with_check().into_string()
}

/// Base58check Tron address back to the 20-byte account id.
pub fn decode_tron_address(address: &str) -> Result<Address> {
    let bytes = bs58::decode(address.trim())
        .with_check(None)
        .into_vec()
        .map_err(|e| SweepError::Validation(format!("tron address {}: {}", address, e)))?;
    if bytes.len() != 21 || bytes[0] != TRON_ADDRESS_PREFIX {
        return Err(SweepError::Validation(format!(
            "tron address {}: expected 21 bytes with 0x41 prefix",
            address
        )));
    }
    Ok(Address::from_slice(&bytes[1..]))
}
