// src/sweep/tron.rs

//! Tron consolidation with a fixed TRX reserve in place of gas estimation.

use crate::balance_aggregator::usd_value;
use crate::chains::{ChainDescriptor, TokenLocator};
use crate::error::{Result, SweepError};
use crate::gateway::TronTransport;
use crate::sweep::record_send;
use crate::types::{TransferKind, TransferRecord, ValuedBalanceItem};
use ethers::signers::LocalWallet;
use ethers::types::U256;
use log::info;

/// 30 TRX kept back for bandwidth and energy.
pub const TRX_FEE_RESERVE_SUN: u64 = 30_000_000;
/// Upper bound on the TRX burned by a single TRC-20 transfer.
pub const TRC20_FEE_LIMIT_SUN: u64 = 100_000_000;

/// TRX that can leave the account, if any remains above the reserve.
pub fn native_send_amount(balance_sun: U256) -> Option<U256> {
    let reserve = U256::from(TRX_FEE_RESERVE_SUN);
    (balance_sun > reserve).then(|| balance_sun - reserve)
}

pub(crate) struct TronSweep<'a> {
    pub chain: &'static ChainDescriptor,
    pub transport: &'a dyn TronTransport,
    pub wallet: &'a LocalWallet,
    pub source: &'a str,
    pub destination: &'a str,
}

impl<'a> TronSweep<'a> {
    pub async fn run(
        &self,
        items: &[&ValuedBalanceItem],
        transfers: &mut Vec<TransferRecord>,
    ) -> Result<()> {
        let chain = self.chain;
        let reserve = U256::from(TRX_FEE_RESERVE_SUN);
        let balance = self.transport.native_balance(chain, self.source).await?;

        let native_price = items
            .iter()
            .find(|v| !v.item.is_token)
            .map(|v| v.price_usd)
            .unwrap_or(0.0);

        let remaining = match native_send_amount(balance) {
            Some(amount) => {
                info!("💸 {} native sweep: {} sun of {}", chain.id, amount, balance);
                let sent = self
                    .transport
                    .send_native(chain, self.wallet, self.source, self.destination, amount)
                    .await;
                record_send(transfers, sent, |tx_hash| TransferRecord {
                    kind: TransferKind::Native,
                    symbol: chain.native_symbol.to_string(),
                    amount,
                    decimals: chain.decimals,
                    tx_hash,
                    destination: self.destination.to_string(),
                    value_usd: usd_value(amount, chain.decimals, native_price).unwrap_or(0.0),
                    confirmed: true,
                })?;
                reserve
            }
            None => {
                let reason = SweepError::InsufficientReserve {
                    chain_id: chain.id.to_string(),
                    balance,
                    reserve,
                };
                info!("⏭️ {}; skipping native", reason);
                balance
            }
        };

        for valued in items.iter().filter(|v| v.item.is_token) {
            let item = &valued.item;
            if item.raw_balance.is_zero() {
                continue;
            }
            // The reserve is checked per token but not drawn down; the fee limit
            // caps what each transfer may burn.
            if remaining < reserve {
                return Err(SweepError::GasFeeInsufficient {
                    chain_id: chain.id.to_string(),
                    symbol: item.symbol.clone(),
                    required: reserve,
                    available: remaining,
                    shortfall: reserve - remaining,
                });
            }

            let contract = match chain.token(&item.symbol).map(|t| t.locator) {
                Some(TokenLocator::Trc20(contract)) => contract.to_string(),
                _ => item.token_id.clone().ok_or_else(|| {
                    SweepError::Config(format!("{} has no contract for {}", chain.id, item.symbol))
                })?,
            };

            info!("💸 {} token sweep: {} {}", chain.id, item.raw_balance, item.symbol);
            let sent = self
                .transport
                .send_token(
                    chain,
                    self.wallet,
                    self.source,
                    &contract,
                    self.destination,
                    item.raw_balance,
                    TRC20_FEE_LIMIT_SUN,
                )
                .await;
            record_send(transfers, sent, |tx_hash| TransferRecord {
                kind: TransferKind::Token,
                symbol: item.symbol.clone(),
                amount: item.raw_balance,
                decimals: item.decimals,
                tx_hash,
                destination: self.destination.to_string(),
                value_usd: valued.value_usd,
                confirmed: true,
            })?;
        }
        Ok(())
    }
}
