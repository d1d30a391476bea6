// src/gateway/mod.rs

//! Chain access behind narrow traits.
//!
//! The aggregator reads through [`BalanceSource`]; the sweep executor moves funds
//! through [`EvmTransport`] and [`TronTransport`]. [`LiveGateway`] implements all
//! three on top of the [`EndpointPool`], invalidating a chain's cached handle
//! whenever a call on it fails at the transport level so the next call
//! re-probes the tiers.

pub mod cosmos;
pub mod evm;
pub mod solana;
pub mod tron;
pub mod utxo;

use crate::chains::{ChainDescriptor, ChainFamily, TokenDescriptor, TokenLocator};
use crate::endpoint_pool::{ChainClient, EndpointPool, RpcConnector};
use crate::error::{Result, SweepError};
use crate::settings::Settings;
use crate::types::conversions::{string_to_address, MAX_DECIMALS};
use async_trait::async_trait;
use ethers::signers::LocalWallet;
use ethers::types::{Address, U256};
use log::warn;
use std::future::Future;
use std::sync::Arc;
use utxo::UtxoExplorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    pub raw: U256,
    pub decimals: u8,
}

#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Native balance in the chain's smallest unit.
    async fn native_balance(&self, chain: &'static ChainDescriptor, address: &str) -> Result<U256>;

    async fn token_balance(
        &self,
        chain: &'static ChainDescriptor,
        token: &'static TokenDescriptor,
        address: &str,
    ) -> Result<TokenAmount>;
}

#[async_trait]
pub trait EvmTransport: Send + Sync {
    async fn native_balance(&self, chain: &'static ChainDescriptor, owner: Address) -> Result<U256>;

    async fn gas_price(&self, chain: &'static ChainDescriptor) -> Result<U256>;

    async fn estimate_token_transfer_gas(
        &self,
        chain: &'static ChainDescriptor,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<U256>;

    /// Returns the transaction hash once the transfer is mined. A transfer that
    /// was broadcast but never confirmed fails with
    /// [`SweepError::TransferNotConfirmed`] carrying its hash.
    async fn send_native(
        &self,
        chain: &'static ChainDescriptor,
        wallet: &LocalWallet,
        to: Address,
        amount: U256,
        gas_price: U256,
    ) -> Result<String>;

    async fn send_token(
        &self,
        chain: &'static ChainDescriptor,
        wallet: &LocalWallet,
        token: Address,
        to: Address,
        amount: U256,
        gas_price: U256,
    ) -> Result<String>;
}

#[async_trait]
pub trait TronTransport: Send + Sync {
    /// Balance in sun.
    async fn native_balance(&self, chain: &'static ChainDescriptor, address: &str) -> Result<U256>;

    async fn send_native(
        &self,
        chain: &'static ChainDescriptor,
        wallet: &LocalWallet,
        from: &str,
        to: &str,
        amount_sun: U256,
    ) -> Result<String>;

    async fn send_token(
        &self,
        chain: &'static ChainDescriptor,
        wallet: &LocalWallet,
        from: &str,
        contract: &str,
        to: &str,
        amount: U256,
        fee_limit_sun: u64,
    ) -> Result<String>;
}

/// Network-backed implementation of every gateway trait.
pub struct LiveGateway {
    pool: Arc<EndpointPool<RpcConnector>>,
    utxo: UtxoExplorer,
}

impl LiveGateway {
    pub fn new(pool: Arc<EndpointPool<RpcConnector>>, utxo: UtxoExplorer) -> Self {
        Self { pool, utxo }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let pool = EndpointPool::from_settings(RpcConnector::new()?, &settings.rpc);
        Ok(Self::new(Arc::new(pool), UtxoExplorer::new(&settings.utxo)?))
    }

    pub fn pool(&self) -> &Arc<EndpointPool<RpcConnector>> {
        &self.pool
    }

    async fn with_client<T, F, Fut>(&self, chain: &'static ChainDescriptor, op: F) -> Result<T>
    where
        F: FnOnce(ChainClient) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<T>> + Send,
        T: Send,
    {
        self.pool.with_client(chain.id, op).await
    }
}

/// Endpoint-reported token decimals, or the registry value when the report is
/// larger than anything that can be valued.
pub(crate) fn checked_decimals(reported: u8, fallback: u8, token: &str) -> u8 {
    if reported <= MAX_DECIMALS {
        reported
    } else {
        warn!(
            "⚠️ {} reported {} decimals; using registry value {}",
            token, reported, fallback
        );
        fallback
    }
}

fn wrong_client(chain: &ChainDescriptor) -> anyhow::Error {
    anyhow::anyhow!("{} resolved to a client of the wrong protocol", chain.id)
}

fn parse_evm_address(chain: &ChainDescriptor, address: &str) -> Result<Address> {
    string_to_address(address)
        .map_err(|e| SweepError::Validation(format!("{} address {}: {}", chain.id, address, e)))
}

#[async_trait]
impl BalanceSource for LiveGateway {
    async fn native_balance(&self, chain: &'static ChainDescriptor, address: &str) -> Result<U256> {
        match chain.family {
            ChainFamily::Evm => {
                let owner = parse_evm_address(chain, address)?;
                self.with_client(chain, |client| async move {
                    let provider = client.as_evm().ok_or_else(|| wrong_client(chain))?;
                    evm::native_balance(provider, owner).await
                })
                .await
            }
            ChainFamily::Utxo => Ok(self.utxo.balance(address).await),
            ChainFamily::Tron => {
                self.with_client(chain, |client| async move {
                    let rest = client.as_rest().ok_or_else(|| wrong_client(chain))?;
                    tron::native_balance(rest, address).await
                })
                .await
            }
            ChainFamily::Solana => {
                self.with_client(chain, |client| async move {
                    let rpc = client.as_json_rpc().ok_or_else(|| wrong_client(chain))?;
                    solana::native_balance(rpc, address).await
                })
                .await
            }
            ChainFamily::CosmosBech32 => {
                let denom = chain.native_denom.ok_or_else(|| {
                    SweepError::Config(format!("{} has no native denom", chain.id))
                })?;
                self.with_client(chain, |client| async move {
                    let rest = client.as_rest().ok_or_else(|| wrong_client(chain))?;
                    cosmos::denom_balance(rest, address, denom).await
                })
                .await
            }
        }
    }

    async fn token_balance(
        &self,
        chain: &'static ChainDescriptor,
        token: &'static TokenDescriptor,
        address: &str,
    ) -> Result<TokenAmount> {
        match (chain.family, token.locator) {
            (ChainFamily::Evm, TokenLocator::Erc20(contract)) => {
                let owner = parse_evm_address(chain, address)?;
                let contract = parse_evm_address(chain, contract)?;
                self.with_client(chain, |client| async move {
                    let provider = client.as_evm().ok_or_else(|| wrong_client(chain))?;
                    evm::token_balance(provider, contract, owner, token.decimals).await
                })
                .await
            }
            (ChainFamily::Tron, TokenLocator::Trc20(contract)) => {
                self.with_client(chain, |client| async move {
                    let rest = client.as_rest().ok_or_else(|| wrong_client(chain))?;
                    tron::token_balance(rest, contract, address, token.decimals).await
                })
                .await
            }
            (ChainFamily::Solana, TokenLocator::SplMint(mint)) => {
                self.with_client(chain, |client| async move {
                    let rpc = client.as_json_rpc().ok_or_else(|| wrong_client(chain))?;
                    solana::token_balance(rpc, mint, address, token.decimals).await
                })
                .await
            }
            (ChainFamily::CosmosBech32, TokenLocator::BankDenom(denom)) => {
                self.with_client(chain, |client| async move {
                    let rest = client.as_rest().ok_or_else(|| wrong_client(chain))?;
                    let raw = cosmos::denom_balance(rest, address, denom).await?;
                    Ok(TokenAmount {
                        raw,
                        decimals: token.decimals,
                    })
                })
                .await
            }
            (family, locator) => Err(SweepError::Config(format!(
                "token {} on {} uses {:?}, which {} chains cannot hold",
                token.symbol, chain.id, locator, family
            ))),
        }
    }
}

#[async_trait]
impl EvmTransport for LiveGateway {
    async fn native_balance(&self, chain: &'static ChainDescriptor, owner: Address) -> Result<U256> {
        self.with_client(chain, |client| async move {
            let provider = client.as_evm().ok_or_else(|| wrong_client(chain))?;
            evm::native_balance(provider, owner).await
        })
        .await
    }

    async fn gas_price(&self, chain: &'static ChainDescriptor) -> Result<U256> {
        self.with_client(chain, |client| async move {
            let provider = client.as_evm().ok_or_else(|| wrong_client(chain))?;
            evm::gas_price(provider).await
        })
        .await
    }

    async fn estimate_token_transfer_gas(
        &self,
        chain: &'static ChainDescriptor,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<U256> {
        self.with_client(chain, |client| async move {
            let provider = client.as_evm().ok_or_else(|| wrong_client(chain))?;
            evm::estimate_token_transfer_gas(provider, token, from, to, amount).await
        })
        .await
    }

    async fn send_native(
        &self,
        chain: &'static ChainDescriptor,
        wallet: &LocalWallet,
        to: Address,
        amount: U256,
        gas_price: U256,
    ) -> Result<String> {
        self.with_client(chain, |client| async move {
            let provider = client.as_evm().ok_or_else(|| wrong_client(chain))?;
            evm::send_native(provider, chain.id, wallet, to, amount, gas_price).await
        })
        .await
    }

    async fn send_token(
        &self,
        chain: &'static ChainDescriptor,
        wallet: &LocalWallet,
        token: Address,
        to: Address,
        amount: U256,
        gas_price: U256,
    ) -> Result<String> {
        self.with_client(chain, |client| async move {
            let provider = client.as_evm().ok_or_else(|| wrong_client(chain))?;
            evm::send_token(provider, chain.id, wallet, token, to, amount, gas_price).await
        })
        .await
    }
}

#[async_trait]
impl TronTransport for LiveGateway {
    async fn native_balance(&self, chain: &'static ChainDescriptor, address: &str) -> Result<U256> {
        self.with_client(chain, |client| async move {
            let rest = client.as_rest().ok_or_else(|| wrong_client(chain))?;
            tron::native_balance(rest, address).await
        })
        .await
    }

    async fn send_native(
        &self,
        chain: &'static ChainDescriptor,
        wallet: &LocalWallet,
        from: &str,
        to: &str,
        amount_sun: U256,
    ) -> Result<String> {
        self.with_client(chain, |client| async move {
            let rest = client.as_rest().ok_or_else(|| wrong_client(chain))?;
            tron::send_native(rest, wallet, from, to, amount_sun).await
        })
        .await
    }

    async fn send_token(
        &self,
        chain: &'static ChainDescriptor,
        wallet: &LocalWallet,
        from: &str,
        contract: &str,
        to: &str,
        amount: U256,
        fee_limit_sun: u64,
    ) -> Result<String> {
        self.with_client(chain, |client| async move {
            let rest = client.as_rest().ok_or_else(|| wrong_client(chain))?;
            tron::send_token(rest, wallet, from, contract, to, amount, fee_limit_sun).await
        })
        .await
    }
}
