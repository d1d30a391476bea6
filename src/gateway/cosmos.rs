// src/gateway/cosmos.rs

use crate::rpc_client::RestClient;
use crate::types::conversions::parse_raw_units;
use anyhow::{anyhow, Result};
use ethers::types::U256;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Option<Coin>,
}

#[derive(Debug, Deserialize)]
struct Coin {
    #[allow(dead_code)]
    denom: String,
    amount: String,
}

/// Bank balance of one denom. IBC denoms contain `/` and are URL encoded.
pub(crate) async fn denom_balance(client: &RestClient, address: &str, denom: &str) -> Result<U256> {
    let encoded: String = url::form_urlencoded::byte_serialize(denom.as_bytes()).collect();
    let response: BalanceResponse = client
        .get(&format!(
            "/cosmos/bank/v1beta1/balances/{}/by_denom?denom={}",
            address, encoded
        ))
        .await?;
    match response.balance {
        Some(coin) => parse_raw_units(&coin.amount)
            .map_err(|e| anyhow!("bad amount {} for {}: {}", coin.amount, denom, e)),
        None => Ok(U256::zero()),
    }
}
