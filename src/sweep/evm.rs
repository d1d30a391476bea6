// src/sweep/evm.rs

//! EVM consolidation: native first (minus a reserve covering one native and one
//! token transfer), then every token whose fee the remaining native balance covers.

use crate::balance_aggregator::usd_value;
use crate::chains::{ChainDescriptor, TokenLocator};
use crate::error::{Result, SweepError};
use crate::gateway::EvmTransport;
use crate::sweep::record_send;
use crate::types::conversions::string_to_address;
use crate::types::{TransferKind, TransferRecord, ValuedBalanceItem};
use ethers::signers::LocalWallet;
use ethers::types::{Address, I256, U256};
use log::{info, warn};

pub const NATIVE_TRANSFER_GAS: u64 = 21_000;
pub const TOKEN_TRANSFER_GAS_RESERVE: u64 = 100_000;
/// Used when `estimateGas` fails.
pub const DEFAULT_TOKEN_TRANSFER_GAS: u64 = 100_000;

/// Native amount that can leave the account while keeping the fee reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeSweepPlan {
    pub balance: U256,
    pub gas_price: U256,
    /// `(21000 + 100000) * gas_price`
    pub reserve: U256,
    /// `balance - reserve`; zero or negative means no native transfer.
    pub send_amount: I256,
}

impl NativeSweepPlan {
    pub fn compute(balance: U256, gas_price: U256) -> Self {
        let reserve = gas_price.saturating_mul(U256::from(NATIVE_TRANSFER_GAS + TOKEN_TRANSFER_GAS_RESERVE));
        let send_amount = to_signed(balance).saturating_sub(to_signed(reserve));
        Self {
            balance,
            gas_price,
            reserve,
            send_amount,
        }
    }

    pub fn transferable(&self) -> Option<U256> {
        if self.send_amount > I256::zero() {
            Some(self.send_amount.into_raw())
        } else {
            None
        }
    }

    /// The transferable amount, or [`SweepError::InsufficientReserve`] when the
    /// balance does not exceed the reserve.
    pub fn check(&self, chain_id: &str) -> Result<U256> {
        self.transferable()
            .ok_or_else(|| SweepError::InsufficientReserve {
                chain_id: chain_id.to_string(),
                balance: self.balance,
                reserve: self.reserve,
            })
    }

    /// Native left after the planned transfer and its fee.
    pub fn remaining_after_send(&self) -> U256 {
        match self.transferable() {
            Some(amount) => self
                .balance
                .saturating_sub(amount)
                .saturating_sub(self.gas_price.saturating_mul(U256::from(NATIVE_TRANSFER_GAS))),
            None => self.balance,
        }
    }
}

fn to_signed(value: U256) -> I256 {
    I256::try_from(value).unwrap_or(I256::MAX)
}

pub(crate) struct EvmSweep<'a> {
    pub chain: &'static ChainDescriptor,
    pub transport: &'a dyn EvmTransport,
    pub wallet: &'a LocalWallet,
    pub source: Address,
    pub destination: Address,
    pub destination_label: &'a str,
}

impl<'a> EvmSweep<'a> {
    /// Pushes each completed transfer into `transfers` as it happens, so a failure
    /// part-way still leaves the executed ones visible to the caller.
    pub async fn run(
        &self,
        items: &[&ValuedBalanceItem],
        transfers: &mut Vec<TransferRecord>,
    ) -> Result<()> {
        let chain = self.chain;
        let balance = self.transport.native_balance(chain, self.source).await?;
        let gas_price = self.transport.gas_price(chain).await?;
        let plan = NativeSweepPlan::compute(balance, gas_price);

        let native_price = items
            .iter()
            .find(|v| !v.item.is_token)
            .map(|v| v.price_usd)
            .unwrap_or(0.0);

        match plan.check(chain.id) {
            Ok(amount) => {
                info!(
                    "💸 {} native sweep: {} of {} (reserve {})",
                    chain.id, amount, balance, plan.reserve
                );
                let sent = self
                    .transport
                    .send_native(chain, self.wallet, self.destination, amount, gas_price)
                    .await;
                record_send(transfers, sent, |tx_hash| TransferRecord {
                    kind: TransferKind::Native,
                    symbol: chain.native_symbol.to_string(),
                    amount,
                    decimals: chain.decimals,
                    tx_hash,
                    destination: self.destination_label.to_string(),
                    value_usd: usd_value(amount, chain.decimals, native_price).unwrap_or(0.0),
                    confirmed: true,
                })?;
            }
            Err(reason) => info!("⏭️ {}; skipping native", reason),
        }

        let mut remaining = plan.remaining_after_send();
        for valued in items.iter().filter(|v| v.item.is_token) {
            let item = &valued.item;
            if item.raw_balance.is_zero() {
                continue;
            }
            let token = self.token_address(&item.symbol, item.token_id.as_deref())?;

            let gas = match self
                .transport
                .estimate_token_transfer_gas(chain, token, self.source, self.destination, item.raw_balance)
                .await
            {
                Ok(gas) => gas,
                Err(e) => {
                    warn!(
                        "⚠️ {} gas estimate for {} failed, using {}: {}",
                        chain.id, item.symbol, DEFAULT_TOKEN_TRANSFER_GAS, e
                    );
                    U256::from(DEFAULT_TOKEN_TRANSFER_GAS)
                }
            };
            let fee = gas.saturating_mul(gas_price);
            if remaining < fee {
                return Err(SweepError::GasFeeInsufficient {
                    chain_id: chain.id.to_string(),
                    symbol: item.symbol.clone(),
                    required: fee,
                    available: remaining,
                    shortfall: fee - remaining,
                });
            }

            info!("💸 {} token sweep: {} {}", chain.id, item.raw_balance, item.symbol);
            let sent = self
                .transport
                .send_token(chain, self.wallet, token, self.destination, item.raw_balance, gas_price)
                .await;
            record_send(transfers, sent, |tx_hash| TransferRecord {
                kind: TransferKind::Token,
                symbol: item.symbol.clone(),
                amount: item.raw_balance,
                decimals: item.decimals,
                tx_hash,
                destination: self.destination_label.to_string(),
                value_usd: valued.value_usd,
                confirmed: true,
            })?;
            remaining -= fee;
        }
        Ok(())
    }

    fn token_address(&self, symbol: &str, token_id: Option<&str>) -> Result<Address> {
        let contract = match self.chain.token(symbol).map(|t| t.locator) {
            Some(TokenLocator::Erc20(contract)) => contract,
            _ => token_id.ok_or_else(|| {
                SweepError::Config(format!("{} has no contract for {}", self.chain.id, symbol))
            })?,
        };
        string_to_address(contract)
            .map_err(|e| SweepError::Config(format!("{} contract {}: {}", symbol, contract, e)))
    }
}
