//! Integration tests for balance aggregation and valuation
//!
//! Tests cover:
//! - One item per requested (chain, asset) pair, failures included
//! - Unknown and disabled chains reported without a network call
//! - USD valuation skipping failed, zero and unpriced balances

mod common;

use common::{units, FixedPrices, StaticBalances};
use custody_sweep_sdk::balance_aggregator::{value_balances, BalanceAggregator};
use custody_sweep_sdk::price_cache::PriceCache;
use custody_sweep_sdk::types::NetworkAddress;
use ethers::types::U256;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use uuid::Uuid;

fn address(chain_id: &str) -> NetworkAddress {
    NetworkAddress {
        wallet_id: Uuid::nil(),
        chain_id: chain_id.to_string(),
        address: "0x9858EfFD232B4033E47d90003D41EC34EcaEda94".to_string(),
    }
}

#[tokio::test]
async fn test_every_pair_yields_one_item_even_when_some_fail() {
    let balances = Arc::new(StaticBalances::default());
    balances.set("ethereum", "ETH", units(2, 18));
    balances.fail("ethereum", "USDC", "rate limited");
    balances.fail("bsc", "BNB", "connection reset");
    balances.set("bsc", "USDT", units(10, 18));

    let aggregator = BalanceAggregator::new(balances.clone());
    // ethereum: ETH + USDT + USDC, bsc: BNB + USDT, plus one unknown chain
    let items = aggregator
        .aggregate(&[address("ethereum"), address("bsc"), address("dogecoin")])
        .await;

    assert_eq!(items.len(), 6);
    let failed: Vec<_> = items.iter().filter(|i| !i.is_ok()).collect();
    assert_eq!(failed.len(), 3);
    assert!(failed.iter().any(|i| i.chain_id == "dogecoin"));
    assert!(failed.iter().any(|i| i.chain_id == "bsc" && i.symbol == "BNB"));
    assert!(failed
        .iter()
        .any(|i| i.symbol == "USDC" && i.error.as_deref().unwrap().contains("rate limited")));

    // the unknown chain never reached the balance source
    assert_eq!(balances.calls.load(Ordering::SeqCst), 5);

    let eth = items
        .iter()
        .find(|i| i.chain_id == "ethereum" && i.symbol == "ETH")
        .unwrap();
    assert!(!eth.is_token);
    assert_eq!(eth.amount(), 2.0);

    let usdt = items
        .iter()
        .find(|i| i.chain_id == "ethereum" && i.symbol == "USDT")
        .unwrap();
    assert!(usdt.is_token);
    assert_eq!(usdt.decimals, 6);
    assert_eq!(
        usdt.token_id.as_deref(),
        Some("0xdAC17F958D2ee523a2206206994597C13D831ec7")
    );
}

#[tokio::test]
async fn test_disabled_chain_is_reported_not_queried() {
    let balances = Arc::new(StaticBalances::default());
    let aggregator = BalanceAggregator::new(balances.clone());

    let items = aggregator.aggregate(&[address("sepolia")]).await;
    assert_eq!(items.len(), 1);
    assert!(items[0].error.as_deref().unwrap().contains("disabled"));
    assert_eq!(balances.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_valuation_totals_priced_nonzero_balances() {
    let balances = Arc::new(StaticBalances::default());
    balances.set("ethereum", "ETH", units(12, 18));
    balances.set("ethereum", "USDT", U256::from(50_000_000u64));
    balances.fail("ethereum", "USDC", "timeout");
    balances.set("bsc", "BNB", units(1, 18));

    let prices = PriceCache::new(Arc::new(FixedPrices::new(&[
        ("ethereum", 2_000.0),
        ("tether", 1.0),
        // no binancecoin price: BNB stays unvalued
    ])));

    let aggregator = BalanceAggregator::new(balances);
    let items = aggregator
        .aggregate(&[address("ethereum"), address("bsc")])
        .await;
    let summary = value_balances(&items, &prices).await;

    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.valued.len(), 2);
    assert!((summary.total_usd - 24_050.0).abs() < 1e-6);
    assert!(summary.valued.iter().all(|v| v.price_usd > 0.0));
    assert!(!summary.valued.iter().any(|v| v.item.symbol == "BNB"));
}
