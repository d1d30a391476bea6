//! In-memory stand-ins for the store, chain transports, price source and sink.

#![allow(dead_code)]

use async_trait::async_trait;
use custody_sweep_sdk::chains::{ChainDescriptor, TokenDescriptor};
use custody_sweep_sdk::database::WalletStore;
use custody_sweep_sdk::derivation::SeedPhrase;
use custody_sweep_sdk::error::{Result, SweepError};
use custody_sweep_sdk::gateway::{BalanceSource, EvmTransport, TokenAmount, TronTransport};
use custody_sweep_sdk::notifications::{EventKind, NotificationEvent, NotificationSink};
use custody_sweep_sdk::price_cache::PriceSource;
use custody_sweep_sdk::types::{LedgerEntry, MonitorConfig, NetworkAddress, Wallet};
use ethers::signers::LocalWallet;
use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub const TEST_PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// BIP44 m/44'/60'/0'/0/0 of [`TEST_PHRASE`].
pub const TEST_EVM_ADDRESS: &str = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94";

pub const EVM_DESTINATION: &str = "0x1111111111111111111111111111111111111111";
pub const TRON_DESTINATION: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

pub fn gwei(n: u64) -> U256 {
    U256::from(n) * U256::exp10(9)
}

pub fn units(whole: u64, decimals: u32) -> U256 {
    U256::from(whole) * U256::exp10(decimals as usize)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    wallets: Mutex<Vec<Wallet>>,
    seeds: Mutex<HashMap<Uuid, String>>,
    config: Mutex<Option<MonitorConfig>>,
    pub ledger: Mutex<Vec<LedgerEntry>>,
    /// While set, listing wallets fails as if the database were unreachable.
    pub listing_down: AtomicBool,
}

impl MemoryStore {
    pub fn with_config(config: MonitorConfig) -> Self {
        let store = Self::default();
        *store.config.lock().unwrap() = Some(config);
        store
    }

    pub fn set_config(&self, config: Option<MonitorConfig>) {
        *self.config.lock().unwrap() = config;
    }

    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.ledger.lock().unwrap().clone()
    }

    pub fn wallet(&self, id: Uuid) -> Option<Wallet> {
        self.wallets.lock().unwrap().iter().find(|w| w.id == id).cloned()
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn list_wallets(&self) -> Result<Vec<Wallet>> {
        if self.listing_down.load(Ordering::SeqCst) {
            return Err(SweepError::Persistence("connection pool timed out".into()));
        }
        Ok(self.wallets.lock().unwrap().clone())
    }

    async fn wallet_networks(&self, wallet_id: Uuid) -> Result<Vec<NetworkAddress>> {
        Ok(self
            .wallet(wallet_id)
            .map(|w| w.networks)
            .unwrap_or_default())
    }

    async fn load_monitor_config(&self) -> Result<Option<MonitorConfig>> {
        Ok(self.config.lock().unwrap().clone())
    }

    async fn save_monitor_config(&self, config: &MonitorConfig) -> Result<()> {
        *self.config.lock().unwrap() = Some(config.clone());
        Ok(())
    }

    async fn load_seed_phrase(&self, wallet_id: Uuid) -> Result<SeedPhrase> {
        let phrase = self
            .seeds
            .lock()
            .unwrap()
            .get(&wallet_id)
            .cloned()
            .ok_or_else(|| SweepError::Persistence(format!("no seed for {}", wallet_id)))?;
        SeedPhrase::parse(&phrase)
    }

    async fn create_wallet(
        &self,
        name: &str,
        owner_ref: Option<&str>,
        seed: &SeedPhrase,
    ) -> Result<Wallet> {
        let wallet = Wallet {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_ref: owner_ref.map(str::to_string),
            networks: Vec::new(),
        };
        self.seeds
            .lock()
            .unwrap()
            .insert(wallet.id, seed.phrase().to_string());
        self.wallets.lock().unwrap().push(wallet.clone());
        Ok(wallet)
    }

    async fn add_network_address(&self, address: &NetworkAddress) -> Result<()> {
        let mut wallets = self.wallets.lock().unwrap();
        let wallet = wallets
            .iter_mut()
            .find(|w| w.id == address.wallet_id)
            .ok_or_else(|| SweepError::Validation(format!("unknown wallet {}", address.wallet_id)))?;
        if wallet.networks.iter().any(|n| n.chain_id == address.chain_id) {
            return Err(SweepError::Validation(format!(
                "wallet {} already has a {} address",
                address.wallet_id, address.chain_id
            )));
        }
        wallet.networks.push(address.clone());
        Ok(())
    }

    async fn remove_network_address(&self, wallet_id: Uuid, chain_id: &str) -> Result<bool> {
        let mut wallets = self.wallets.lock().unwrap();
        let Some(wallet) = wallets.iter_mut().find(|w| w.id == wallet_id) else {
            return Ok(false);
        };
        let before = wallet.networks.len();
        wallet.networks.retain(|n| n.chain_id != chain_id);
        Ok(wallet.networks.len() != before)
    }

    async fn delete_wallet(&self, wallet_id: Uuid) -> Result<bool> {
        self.seeds.lock().unwrap().remove(&wallet_id);
        let mut wallets = self.wallets.lock().unwrap();
        let before = wallets.len();
        wallets.retain(|w| w.id != wallet_id);
        Ok(wallets.len() != before)
    }

    async fn record_transfer(&self, entry: &LedgerEntry) -> Result<()> {
        self.ledger.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

/// Balances keyed by `(chain_id, symbol)`; anything unset reads as zero.
#[derive(Default)]
pub struct StaticBalances {
    values: Mutex<HashMap<(String, String), std::result::Result<U256, String>>>,
    pub calls: AtomicUsize,
}

impl StaticBalances {
    pub fn set(&self, chain_id: &str, symbol: &str, raw: U256) {
        self.values
            .lock()
            .unwrap()
            .insert((chain_id.to_string(), symbol.to_string()), Ok(raw));
    }

    pub fn fail(&self, chain_id: &str, symbol: &str, reason: &str) {
        self.values
            .lock()
            .unwrap()
            .insert((chain_id.to_string(), symbol.to_string()), Err(reason.to_string()));
    }

    fn get(&self, chain: &ChainDescriptor, symbol: &str) -> Result<U256> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self
            .values
            .lock()
            .unwrap()
            .get(&(chain.id.to_string(), symbol.to_string()))
        {
            Some(Ok(raw)) => Ok(*raw),
            Some(Err(reason)) => Err(SweepError::rpc(chain.id, reason)),
            None => Ok(U256::zero()),
        }
    }
}

#[async_trait]
impl BalanceSource for StaticBalances {
    async fn native_balance(&self, chain: &'static ChainDescriptor, _address: &str) -> Result<U256> {
        self.get(chain, chain.native_symbol)
    }

    async fn token_balance(
        &self,
        chain: &'static ChainDescriptor,
        token: &'static TokenDescriptor,
        _address: &str,
    ) -> Result<TokenAmount> {
        Ok(TokenAmount {
            raw: self.get(chain, token.symbol)?,
            decimals: token.decimals,
        })
    }
}

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentTx {
    Native { chain_id: String, to: String, amount: U256 },
    Token { chain_id: String, token: String, to: String, amount: U256 },
}

/// EVM chain simulation: one native balance, fixed gas price, every send succeeds.
pub struct MockEvm {
    pub native: Mutex<U256>,
    pub gas_price: U256,
    /// `None` makes `estimateGas` fail.
    pub token_gas: Option<U256>,
    pub sent: Mutex<Vec<SentTx>>,
    /// Sends fail once this many transactions went out.
    pub fail_after: Option<usize>,
    /// Sends past this many are broadcast but their receipt never arrives.
    pub unconfirmed_after: Option<usize>,
}

impl MockEvm {
    pub fn new(native: U256, gas_price: U256) -> Self {
        Self {
            native: Mutex::new(native),
            gas_price,
            token_gas: Some(U256::from(65_000u64)),
            sent: Mutex::new(Vec::new()),
            fail_after: None,
            unconfirmed_after: None,
        }
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, chain: &ChainDescriptor, tx: SentTx, fee: U256, value: U256) -> Result<String> {
        let mut sent = self.sent.lock().unwrap();
        if self.fail_after.is_some_and(|n| sent.len() >= n) {
            return Err(SweepError::rpc(chain.id, "broadcast rejected"));
        }
        let mut native = self.native.lock().unwrap();
        *native = native.saturating_sub(value).saturating_sub(fee);
        sent.push(tx);
        let tx_hash = format!("0x{:064x}", sent.len());
        if self.unconfirmed_after.is_some_and(|n| sent.len() > n) {
            return Err(SweepError::TransferNotConfirmed {
                chain_id: chain.id.to_string(),
                tx_hash,
                reason: "receipt polling failed".into(),
            });
        }
        Ok(tx_hash)
    }
}

#[async_trait]
impl EvmTransport for MockEvm {
    async fn native_balance(&self, _chain: &'static ChainDescriptor, _owner: Address) -> Result<U256> {
        Ok(*self.native.lock().unwrap())
    }

    async fn gas_price(&self, _chain: &'static ChainDescriptor) -> Result<U256> {
        Ok(self.gas_price)
    }

    async fn estimate_token_transfer_gas(
        &self,
        chain: &'static ChainDescriptor,
        _token: Address,
        _from: Address,
        _to: Address,
        _amount: U256,
    ) -> Result<U256> {
        self.token_gas
            .ok_or_else(|| SweepError::rpc(chain.id, "execution reverted"))
    }

    async fn send_native(
        &self,
        chain: &'static ChainDescriptor,
        _wallet: &LocalWallet,
        to: Address,
        amount: U256,
        gas_price: U256,
    ) -> Result<String> {
        let tx = SentTx::Native {
            chain_id: chain.id.to_string(),
            to: ethers::utils::to_checksum(&to, None),
            amount,
        };
        self.record(chain, tx, gas_price * U256::from(21_000u64), amount)
    }

    async fn send_token(
        &self,
        chain: &'static ChainDescriptor,
        _wallet: &LocalWallet,
        token: Address,
        to: Address,
        amount: U256,
        gas_price: U256,
    ) -> Result<String> {
        let tx = SentTx::Token {
            chain_id: chain.id.to_string(),
            token: ethers::utils::to_checksum(&token, None),
            to: ethers::utils::to_checksum(&to, None),
            amount,
        };
        let gas = self.token_gas.unwrap_or_else(|| U256::from(100_000u64));
        self.record(chain, tx, gas_price * gas, U256::zero())
    }
}

pub struct MockTron {
    pub native: Mutex<U256>,
    pub sent: Mutex<Vec<SentTx>>,
}

impl MockTron {
    pub fn new(native_sun: U256) -> Self {
        Self {
            native: Mutex::new(native_sun),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl TronTransport for MockTron {
    async fn native_balance(&self, _chain: &'static ChainDescriptor, _address: &str) -> Result<U256> {
        Ok(*self.native.lock().unwrap())
    }

    async fn send_native(
        &self,
        chain: &'static ChainDescriptor,
        _wallet: &LocalWallet,
        _from: &str,
        to: &str,
        amount_sun: U256,
    ) -> Result<String> {
        let mut native = self.native.lock().unwrap();
        *native = native.saturating_sub(amount_sun);
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentTx::Native {
            chain_id: chain.id.to_string(),
            to: to.to_string(),
            amount: amount_sun,
        });
        Ok(format!("{:064x}", sent.len()))
    }

    async fn send_token(
        &self,
        chain: &'static ChainDescriptor,
        _wallet: &LocalWallet,
        _from: &str,
        contract: &str,
        to: &str,
        amount: U256,
        _fee_limit_sun: u64,
    ) -> Result<String> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentTx::Token {
            chain_id: chain.id.to_string(),
            token: contract.to_string(),
            to: to.to_string(),
            amount,
        });
        Ok(format!("{:064x}", sent.len()))
    }
}

// ---------------------------------------------------------------------------
// Prices & notifications
// ---------------------------------------------------------------------------

/// Prices keyed by price-source id (`"ethereum"`, `"tether"`, ...).
#[derive(Default)]
pub struct FixedPrices {
    prices: Mutex<HashMap<String, f64>>,
    pub calls: AtomicUsize,
    pub down: AtomicBool,
}

impl FixedPrices {
    pub fn new(prices: &[(&str, f64)]) -> Self {
        let source = Self::default();
        for (id, price) in prices {
            source.prices.lock().unwrap().insert(id.to_string(), *price);
        }
        source
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl PriceSource for FixedPrices {
    async fn fetch_usd(&self, source_id: &str) -> anyhow::Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            anyhow::bail!("price source unavailable");
        }
        self.prices
            .lock()
            .unwrap()
            .get(source_id)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no price for {}", source_id))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<NotificationEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
