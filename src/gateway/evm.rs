// src/gateway/evm.rs

use crate::contracts::Erc20;
use crate::error::SweepError;
use crate::gateway::{checked_decimals, TokenAmount};
use crate::sweep::evm::NATIVE_TRANSFER_GAS;
use anyhow::{Context, Result};
use ethers::middleware::{Middleware, SignerMiddleware};
use ethers::prelude::{Http, Provider};
use ethers::signers::LocalWallet;
use ethers::types::{Address, TransactionReceipt, TransactionRequest, H256, U256};
use log::{debug, info};
use std::sync::Arc;

pub(crate) async fn native_balance(provider: &Arc<Provider<Http>>, owner: Address) -> Result<U256> {
    Ok(provider.get_balance(owner, None).await?)
}

/// `balanceOf` + `decimals`; decimals fall back to `fallback_decimals` if the call fails.
pub(crate) async fn token_balance(
    provider: &Arc<Provider<Http>>,
    token: Address,
    owner: Address,
    fallback_decimals: u8,
) -> Result<TokenAmount> {
    let contract = Erc20::new(token, provider.clone());
    let raw = contract
        .balance_of(owner)
        .call()
        .await
        .with_context(|| format!("balanceOf on {:?}", token))?;
    let decimals = match contract.decimals().call().await {
        Ok(d) => checked_decimals(d, fallback_decimals, &format!("{:?}", token)),
        Err(e) => {
            debug!(
                "decimals() failed on {:?}, using registry value {}: {}",
                token, fallback_decimals, e
            );
            fallback_decimals
        }
    };
    Ok(TokenAmount { raw, decimals })
}

pub(crate) async fn gas_price(provider: &Arc<Provider<Http>>) -> Result<U256> {
    Ok(provider.get_gas_price().await?)
}

pub(crate) async fn estimate_token_transfer_gas(
    provider: &Arc<Provider<Http>>,
    token: Address,
    from: Address,
    to: Address,
    amount: U256,
) -> Result<U256> {
    let contract = Erc20::new(token, provider.clone());
    Ok(contract.transfer(to, amount).from(from).estimate_gas().await?)
}

/// A broadcast transaction whose receipt could not be obtained, or that reverted.
/// Raised as a [`SweepError`] so the endpoint is not treated as dead and the
/// hash reaches the ledger.
fn not_confirmed(chain_id: &str, tx_hash: H256, reason: impl std::fmt::Display) -> anyhow::Error {
    SweepError::TransferNotConfirmed {
        chain_id: chain_id.to_string(),
        tx_hash: format!("{:?}", tx_hash),
        reason: reason.to_string(),
    }
    .into()
}

fn check_receipt(
    chain_id: &str,
    tx_hash: H256,
    receipt: std::result::Result<Option<TransactionReceipt>, impl std::fmt::Display>,
) -> Result<String> {
    match receipt {
        Ok(Some(receipt)) if receipt.status == Some(0u64.into()) => {
            Err(not_confirmed(chain_id, tx_hash, "reverted"))
        }
        Ok(Some(_)) => Ok(format!("{:?}", tx_hash)),
        Ok(None) => Err(not_confirmed(chain_id, tx_hash, "dropped from mempool")),
        Err(e) => Err(not_confirmed(chain_id, tx_hash, format!("receipt unavailable: {}", e))),
    }
}

/// Sends and waits for the receipt so the next transfer from the same account
/// picks up the following nonce.
pub(crate) async fn send_native(
    provider: &Arc<Provider<Http>>,
    chain_id: &str,
    wallet: &LocalWallet,
    to: Address,
    amount: U256,
    gas_price: U256,
) -> Result<String> {
    let client = SignerMiddleware::new(provider.clone(), wallet.clone());
    let tx = TransactionRequest::new()
        .to(to)
        .value(amount)
        .gas(NATIVE_TRANSFER_GAS)
        .gas_price(gas_price);

    let pending = client.send_transaction(tx, None).await?;
    let tx_hash = pending.tx_hash();
    info!("📤 Native transfer broadcast: {:?}", tx_hash);
    check_receipt(chain_id, tx_hash, pending.await)
}

pub(crate) async fn send_token(
    provider: &Arc<Provider<Http>>,
    chain_id: &str,
    wallet: &LocalWallet,
    token: Address,
    to: Address,
    amount: U256,
    gas_price: U256,
) -> Result<String> {
    let client = Arc::new(SignerMiddleware::new(provider.clone(), wallet.clone()));
    let contract = Erc20::new(token, client);
    let call = contract.transfer(to, amount).legacy().gas_price(gas_price);

    let pending = call.send().await?;
    let tx_hash = pending.tx_hash();
    info!("📤 Token transfer broadcast: {:?}", tx_hash);
    check_receipt(chain_id, tx_hash, pending.await)
}
