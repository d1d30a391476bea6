// src/gateway/solana.rs

use crate::gateway::{checked_decimals, TokenAmount};
use crate::rpc_client::JsonRpcClient;
use crate::types::conversions::parse_raw_units;
use anyhow::Result;
use ethers::types::U256;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct TokenAccount {
    account: TokenAccountData,
}

#[derive(Debug, Deserialize)]
struct TokenAccountData {
    data: ParsedData,
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    parsed: ParsedAccount,
}

#[derive(Debug, Deserialize)]
struct ParsedAccount {
    info: ParsedInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedInfo {
    token_amount: UiTokenAmount,
}

#[derive(Debug, Deserialize)]
struct UiTokenAmount {
    amount: String,
    decimals: u8,
}

/// Lamports held by `address`.
pub(crate) async fn native_balance(client: &JsonRpcClient, address: &str) -> Result<U256> {
    let balance: WithContext<u64> = client
        .call("getBalance", json!([address, { "commitment": "confirmed" }]))
        .await?;
    Ok(U256::from(balance.value))
}

/// Sum over every token account of `owner` for `mint`; zero when none exist.
pub(crate) async fn token_balance(
    client: &JsonRpcClient,
    mint: &str,
    owner: &str,
    fallback_decimals: u8,
) -> Result<TokenAmount> {
    let accounts: WithContext<Vec<TokenAccount>> = client
        .call(
            "getTokenAccountsByOwner",
            json!([owner, { "mint": mint }, { "encoding": "jsonParsed" }]),
        )
        .await?;

    let mut raw = U256::zero();
    let mut decimals = fallback_decimals;
    for account in accounts.value {
        let amount = &account.account.data.parsed.info.token_amount;
        let units = parse_raw_units(&amount.amount)?;
        raw = raw.saturating_add(units);
        decimals = checked_decimals(amount.decimals, fallback_decimals, mint);
    }
    Ok(TokenAmount { raw, decimals })
}
