// src/gateway/tron.rs

//! TronGrid HTTP API: account balances, TRC-20 constant calls, and
//! create → sign → broadcast for TRX and TRC-20 transfers.

use crate::derivation::decode_tron_address;
use crate::gateway::{checked_decimals, TokenAmount};
use crate::rpc_client::RestClient;
use anyhow::{anyhow, bail, Result};
use ethers::signers::LocalWallet;
use ethers::types::{H256, U256};
use log::{debug, info};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Deserialize)]
struct AccountResponse {
    /// Absent for accounts that were never activated.
    #[serde(default)]
    balance: u64,
}

#[derive(Debug, Deserialize)]
struct ConstantCallResponse {
    #[serde(default)]
    constant_result: Vec<String>,
    #[serde(default)]
    result: Option<CallResult>,
}

#[derive(Debug, Deserialize)]
struct CallResult {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TriggerResponse {
    result: CallResult,
    transaction: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    txid: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// 32-byte ABI word holding the 20-byte account id of a Tron address.
pub(crate) fn abi_encode_address(address: &str) -> Result<String> {
    let account = decode_tron_address(address).map_err(|e| anyhow!("{}", e))?;
    Ok(format!("{:0>64}", hex::encode(account.as_bytes())))
}

pub(crate) fn abi_encode_uint(value: U256) -> String {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    hex::encode(word)
}

/// TronGrid returns error messages hex encoded.
fn decode_message(message: &str) -> String {
    hex::decode(message)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| message.to_string())
}

pub(crate) async fn native_balance(client: &RestClient, address: &str) -> Result<U256> {
    let account: AccountResponse = client
        .post("/wallet/getaccount", &json!({ "address": address, "visible": true }))
        .await?;
    Ok(U256::from(account.balance))
}

async fn constant_call(
    client: &RestClient,
    owner: &str,
    contract: &str,
    selector: &str,
    parameter: &str,
) -> Result<U256> {
    let response: ConstantCallResponse = client
        .post(
            "/wallet/triggerconstantcontract",
            &json!({
                "owner_address": owner,
                "contract_address": contract,
                "function_selector": selector,
                "parameter": parameter,
                "visible": true,
            }),
        )
        .await?;
    if let Some(result) = &response.result {
        if !result.result {
            bail!(
                "{} on {} failed: {}",
                selector,
                contract,
                result.message.as_deref().map(decode_message).unwrap_or_default()
            );
        }
    }
    let word = response
        .constant_result
        .first()
        .ok_or_else(|| anyhow!("{} on {} returned nothing", selector, contract))?;
    U256::from_str_radix(word, 16).map_err(|e| anyhow!("bad {} result {}: {:?}", selector, word, e))
}

pub(crate) async fn token_balance(
    client: &RestClient,
    contract: &str,
    owner: &str,
    fallback_decimals: u8,
) -> Result<TokenAmount> {
    let raw = constant_call(
        client,
        owner,
        contract,
        "balanceOf(address)",
        &abi_encode_address(owner)?,
    )
    .await?;
    let decimals = match constant_call(client, owner, contract, "decimals()", "").await {
        Ok(d) => {
            let reported = if d <= U256::from(u8::MAX) { d.as_u32() as u8 } else { u8::MAX };
            checked_decimals(reported, fallback_decimals, contract)
        }
        Err(_) => fallback_decimals,
    };
    Ok(TokenAmount { raw, decimals })
}

/// Checks `txID == sha256(raw_data_hex)`, signs the id and attaches the signature.
fn sign_transaction(mut tx: Value, wallet: &LocalWallet) -> Result<Value> {
    let tx_id = tx
        .get("txID")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("transaction has no txID"))?;
    let raw_hex = tx
        .get("raw_data_hex")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("transaction has no raw_data_hex"))?;

    let digest = Sha256::digest(hex::decode(raw_hex)?);
    let id_bytes = hex::decode(tx_id)?;
    if digest.as_slice() != id_bytes.as_slice() {
        bail!("txID {} does not match raw_data_hex", tx_id);
    }

    let signature = wallet.sign_hash(H256::from_slice(&id_bytes))?;
    tx["signature"] = json!([hex::encode(signature.to_vec())]);
    Ok(tx)
}

async fn broadcast(client: &RestClient, tx: &Value) -> Result<String> {
    let response: BroadcastResponse = client.post("/wallet/broadcasttransaction", tx).await?;
    if !response.result {
        bail!(
            "broadcast rejected: {} {}",
            response.code.unwrap_or_default(),
            response.message.as_deref().map(decode_message).unwrap_or_default()
        );
    }
    let tx_id = response
        .txid
        .or_else(|| tx.get("txID").and_then(Value::as_str).map(str::to_string))
        .ok_or_else(|| anyhow!("broadcast accepted without a txid"))?;
    info!("📤 Tron transaction broadcast: {}", tx_id);
    Ok(tx_id)
}

pub(crate) async fn send_native(
    client: &RestClient,
    wallet: &LocalWallet,
    from: &str,
    to: &str,
    amount_sun: U256,
) -> Result<String> {
    if amount_sun > U256::from(i64::MAX as u64) {
        bail!("TRX amount {} out of range", amount_sun);
    }
    let tx: Value = client
        .post(
            "/wallet/createtransaction",
            &json!({
                "owner_address": from,
                "to_address": to,
                "amount": amount_sun.as_u64(),
                "visible": true,
            }),
        )
        .await?;
    if let Some(error) = tx.get("Error").and_then(Value::as_str) {
        bail!("createtransaction failed: {}", error);
    }
    debug!("Signing TRX transfer {} → {}", from, to);
    let signed = sign_transaction(tx, wallet)?;
    broadcast(client, &signed).await
}

pub(crate) async fn send_token(
    client: &RestClient,
    wallet: &LocalWallet,
    from: &str,
    contract: &str,
    to: &str,
    amount: U256,
    fee_limit_sun: u64,
) -> Result<String> {
    let parameter = format!("{}{}", abi_encode_address(to)?, abi_encode_uint(amount));
    let response: TriggerResponse = client
        .post(
            "/wallet/triggersmartcontract",
            &json!({
                "owner_address": from,
                "contract_address": contract,
                "function_selector": "transfer(address,uint256)",
                "parameter": parameter,
                "fee_limit": fee_limit_sun,
                "call_value": 0,
                "visible": true,
            }),
        )
        .await?;
    if !response.result.result {
        bail!(
            "triggersmartcontract failed: {}",
            response.result.message.as_deref().map(decode_message).unwrap_or_default()
        );
    }
    let tx = response
        .transaction
        .ok_or_else(|| anyhow!("triggersmartcontract returned no transaction"))?;
    debug!("Signing TRC-20 transfer {} → {} on {}", from, to, contract);
    let signed = sign_transaction(tx, wallet)?;
    broadcast(client, &signed).await
}
