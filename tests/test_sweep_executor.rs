//! Integration tests for the sweep executor
//!
//! Tests cover:
//! - End-to-end EVM sweep: native first, then token, both to the destination
//! - Native fee reserve and GasFeeInsufficient classification
//! - Tron reserve handling
//! - Placeholder families and missing destinations
//! - Ledger entries and notifications

mod common;

use common::*;
use custody_sweep_sdk::chains::{get_chain, ChainFamily};
use custody_sweep_sdk::database::WalletStore;
use custody_sweep_sdk::error::SweepError;
use custody_sweep_sdk::notifications::EventKind;
use custody_sweep_sdk::onboarding::onboard_wallet_on;
use custody_sweep_sdk::sweep::tron::TRX_FEE_RESERVE_SUN;
use custody_sweep_sdk::sweep::SweepExecutor;
use custody_sweep_sdk::types::{
    BalanceItem, Destinations, TransferKind, ValuedBalanceItem, Wallet,
};
use ethers::types::U256;
use std::sync::Arc;

struct Harness {
    store: Arc<MemoryStore>,
    evm: Arc<MockEvm>,
    tron: Arc<MockTron>,
    sink: Arc<RecordingSink>,
    executor: SweepExecutor,
    wallet: Wallet,
}

async fn harness(evm: MockEvm, tron: MockTron, chains: &[&str]) -> Harness {
    let store = Arc::new(MemoryStore::default());
    let evm = Arc::new(evm);
    let tron = Arc::new(tron);
    let sink = Arc::new(RecordingSink::default());

    let chains: Vec<_> = chains.iter().map(|id| get_chain(id).unwrap()).collect();
    let onboarded = onboard_wallet_on(
        store.as_ref(),
        sink.as_ref(),
        "treasury",
        None,
        TEST_PHRASE,
        &chains,
    )
    .await
    .expect("onboarding succeeds");

    let executor = SweepExecutor::new(store.clone(), evm.clone(), tron.clone(), sink.clone());
    Harness {
        store,
        evm,
        tron,
        sink,
        executor,
        wallet: onboarded.wallet,
    }
}

fn valued(wallet: &Wallet, chain_id: &str, symbol: &str, raw: U256, decimals: u8, price: f64) -> ValuedBalanceItem {
    let chain = get_chain(chain_id).unwrap();
    let token = chain.token(symbol);
    let item = BalanceItem {
        chain_id: chain_id.to_string(),
        symbol: symbol.to_string(),
        raw_balance: raw,
        decimals,
        is_token: token.is_some(),
        token_id: token.map(|t| t.locator.id().to_string()),
        source_address: wallet.address_on(chain_id).unwrap_or_default().to_string(),
        error: None,
    };
    let value_usd = custody_sweep_sdk::balance_aggregator::value_of(&item, price).unwrap();
    ValuedBalanceItem {
        item,
        price_usd: price,
        value_usd,
    }
}

fn evm_destinations() -> Destinations {
    Destinations {
        evm: Some(EVM_DESTINATION.to_string()),
        tron: Some(TRON_DESTINATION.to_string()),
        utxo: None,
    }
}

#[tokio::test]
async fn test_native_then_token_to_destination() {
    let h = harness(MockEvm::new(units(12, 18), gwei(10)), MockTron::new(U256::zero()), &["ethereum"]).await;
    assert_eq!(h.wallet.address_on("ethereum"), Some(TEST_EVM_ADDRESS));

    let balances = vec![
        valued(&h.wallet, "ethereum", "ETH", units(12, 18), 18, 2_000.0),
        valued(&h.wallet, "ethereum", "USDT", U256::from(50_000_000u64), 6, 1.0),
    ];
    let outcomes = h
        .executor
        .sweep(&h.wallet, &balances, &evm_destinations())
        .await
        .expect("sweep succeeds");

    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert_eq!(outcome.chain_id, "ethereum");
    assert_eq!(outcome.skipped, None);
    assert_eq!(outcome.transfers.len(), 2);

    // native leaves (21000 + 100000) * 10 gwei behind for fees
    let expected_native = units(12, 18) - gwei(10) * U256::from(121_000u64);
    assert_eq!(outcome.transfers[0].kind, TransferKind::Native);
    assert_eq!(outcome.transfers[0].amount, expected_native);
    assert_eq!(outcome.transfers[1].kind, TransferKind::Token);
    assert_eq!(outcome.transfers[1].symbol, "USDT");
    assert_eq!(outcome.transfers[1].amount, U256::from(50_000_000u64));
    assert!(outcome
        .transfers
        .iter()
        .all(|t| t.destination == EVM_DESTINATION));

    let sent = h.evm.sent();
    assert_eq!(
        sent,
        vec![
            SentTx::Native {
                chain_id: "ethereum".into(),
                to: EVM_DESTINATION.into(),
                amount: expected_native,
            },
            SentTx::Token {
                chain_id: "ethereum".into(),
                token: "0xdAC17F958D2ee523a2206206994597C13D831ec7".into(),
                to: EVM_DESTINATION.into(),
                amount: U256::from(50_000_000u64),
            },
        ]
    );

    let ledger = h.store.ledger();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger[0].kind, "native");
    assert_eq!(ledger[1].kind, "token");
    assert!(ledger.iter().all(|e| e.source == TEST_EVM_ADDRESS));

    let success = h.sink.of_kind(EventKind::SweepSucceeded);
    assert_eq!(success.len(), 1);
    assert_eq!(success[0].tx_hash.as_deref(), Some(outcome.transfers[0].tx_hash.as_str()));
    assert_eq!(success[0].amounts[1], "50 USDT");
    assert!(success[0].total_usd.unwrap() > 24_000.0);
}

#[tokio::test]
async fn test_token_without_fee_balance_is_gas_fee_insufficient() {
    // 50k gas worth of ETH: below the native reserve and below one token transfer fee
    let h = harness(
        MockEvm::new(gwei(10) * U256::from(50_000u64), gwei(10)),
        MockTron::new(U256::zero()),
        &["ethereum"],
    )
    .await;
    let balances = vec![valued(&h.wallet, "ethereum", "USDT", U256::from(500_000_000u64), 6, 1.0)];

    let err = h
        .executor
        .sweep(&h.wallet, &balances, &evm_destinations())
        .await
        .unwrap_err();

    match &err {
        SweepError::GasFeeInsufficient { symbol, required, available, shortfall, .. } => {
            assert_eq!(symbol, "USDT");
            assert_eq!(*required, gwei(10) * U256::from(65_000u64));
            assert_eq!(*available, gwei(10) * U256::from(50_000u64));
            assert_eq!(*shortfall, gwei(10) * U256::from(15_000u64));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(err.needs_fee_top_up());
    assert!(h.evm.sent().is_empty());
    assert!(h.store.ledger().is_empty());

    let failures = h.sink.of_kind(EventKind::SweepFailed);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].classification.as_deref(), Some("top_up_native_fee"));
    assert_eq!(failures[0].chain.as_deref(), Some("ethereum"));
    assert!(h.sink.of_kind(EventKind::SweepSucceeded).is_empty());
}

#[tokio::test]
async fn test_failed_estimate_falls_back_to_default_gas() {
    let mut evm = MockEvm::new(units(1, 18), gwei(10));
    evm.token_gas = None;
    let h = harness(evm, MockTron::new(U256::zero()), &["ethereum"]).await;
    let balances = vec![
        valued(&h.wallet, "ethereum", "ETH", units(1, 18), 18, 2_000.0),
        valued(&h.wallet, "ethereum", "USDT", U256::from(50_000_000u64), 6, 1.0),
    ];

    // the reserve covers exactly one 100k-gas transfer, so the fallback still fits
    let outcomes = h
        .executor
        .sweep(&h.wallet, &balances, &evm_destinations())
        .await
        .unwrap();
    assert_eq!(outcomes[0].transfers.len(), 2);
}

#[tokio::test]
async fn test_partial_transfers_are_recorded_when_a_later_send_fails() {
    let mut evm = MockEvm::new(units(3, 18), gwei(10));
    evm.fail_after = Some(1);
    let h = harness(evm, MockTron::new(U256::zero()), &["ethereum"]).await;
    let balances = vec![
        valued(&h.wallet, "ethereum", "ETH", units(3, 18), 18, 2_000.0),
        valued(&h.wallet, "ethereum", "USDT", U256::from(50_000_000u64), 6, 1.0),
    ];

    let err = h
        .executor
        .sweep(&h.wallet, &balances, &evm_destinations())
        .await
        .unwrap_err();
    assert_eq!(err.classification(), "investigate");

    let ledger = h.store.ledger();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].symbol, "ETH");
    assert_eq!(h.sink.of_kind(EventKind::SweepFailed).len(), 1);
}

#[tokio::test]
async fn test_unconfirmed_broadcast_reaches_ledger_and_failure_event() {
    let mut evm = MockEvm::new(units(3, 18), gwei(10));
    evm.unconfirmed_after = Some(1);
    let h = harness(evm, MockTron::new(U256::zero()), &["ethereum"]).await;
    let balances = vec![
        valued(&h.wallet, "ethereum", "ETH", units(3, 18), 18, 2_000.0),
        valued(&h.wallet, "ethereum", "USDT", U256::from(50_000_000u64), 6, 1.0),
    ];

    let err = h
        .executor
        .sweep(&h.wallet, &balances, &evm_destinations())
        .await
        .unwrap_err();
    assert!(matches!(err, SweepError::TransferNotConfirmed { .. }));
    assert_eq!(err.classification(), "unconfirmed_broadcast");
    let token_hash = format!("0x{:064x}", 2);
    assert_eq!(err.broadcast_tx_hash(), Some(token_hash.as_str()));

    // both sends left the node; only the native one is known to be mined
    assert_eq!(h.evm.sent().len(), 2);
    let ledger = h.store.ledger();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger[0].symbol, "ETH");
    assert!(ledger[0].confirmed);
    assert_eq!(ledger[1].symbol, "USDT");
    assert_eq!(ledger[1].tx_hash, token_hash);
    assert!(!ledger[1].confirmed);

    let failed = h.sink.of_kind(EventKind::SweepFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].tx_hash.as_deref(), Some(token_hash.as_str()));
    assert_eq!(failed[0].classification.as_deref(), Some("unconfirmed_broadcast"));
}

#[tokio::test]
async fn test_first_failing_chain_aborts_later_chains() {
    // ethereum sorts before tron; its failure must keep tron untouched
    let h = harness(
        MockEvm::new(U256::zero(), gwei(10)),
        MockTron::new(U256::from(500_000_000u64)),
        &["ethereum", "tron"],
    )
    .await;
    let balances = vec![
        valued(&h.wallet, "ethereum", "USDT", U256::from(50_000_000u64), 6, 1.0),
        valued(&h.wallet, "tron", "TRX", U256::from(500_000_000u64), 6, 0.1),
    ];

    assert!(h
        .executor
        .sweep(&h.wallet, &balances, &evm_destinations())
        .await
        .is_err());
    assert!(h.tron.sent().is_empty());
}

#[tokio::test]
async fn test_tron_keeps_fee_reserve() {
    let h = harness(
        MockEvm::new(U256::zero(), gwei(1)),
        MockTron::new(U256::from(130_000_000u64)),
        &["tron"],
    )
    .await;
    let balances = vec![
        valued(&h.wallet, "tron", "TRX", U256::from(130_000_000u64), 6, 0.1),
        valued(&h.wallet, "tron", "USDT", U256::from(25_000_000u64), 6, 1.0),
    ];

    let outcomes = h
        .executor
        .sweep(&h.wallet, &balances, &evm_destinations())
        .await
        .unwrap();
    let transfers = &outcomes[0].transfers;
    assert_eq!(transfers.len(), 2);
    assert_eq!(transfers[0].amount, U256::from(130_000_000u64 - TRX_FEE_RESERVE_SUN));
    assert_eq!(transfers[1].symbol, "USDT");
    assert!(transfers.iter().all(|t| t.destination == TRON_DESTINATION));
    assert_eq!(*h.tron.native.lock().unwrap(), U256::from(TRX_FEE_RESERVE_SUN));
}

#[tokio::test]
async fn test_tron_token_without_reserve_fails() {
    let h = harness(
        MockEvm::new(U256::zero(), gwei(1)),
        MockTron::new(U256::from(5_000_000u64)),
        &["tron"],
    )
    .await;
    let balances = vec![valued(&h.wallet, "tron", "USDT", U256::from(25_000_000u64), 6, 1.0)];

    let err = h
        .executor
        .sweep(&h.wallet, &balances, &evm_destinations())
        .await
        .unwrap_err();
    assert!(matches!(err, SweepError::GasFeeInsufficient { ref symbol, .. } if symbol == "USDT"));
    assert!(h.tron.sent().is_empty());
}

#[tokio::test]
async fn test_unimplemented_families_are_logged_not_broadcast() {
    let h = harness(
        MockEvm::new(U256::zero(), gwei(1)),
        MockTron::new(U256::zero()),
        &["bitcoin", "solana"],
    )
    .await;
    let balances = vec![
        valued(&h.wallet, "bitcoin", "BTC", U256::from(10_000_000u64), 8, 60_000.0),
        valued(&h.wallet, "solana", "SOL", U256::from(2_000_000_000u64), 9, 150.0),
    ];
    let destinations = Destinations {
        utxo: Some("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq".into()),
        ..Default::default()
    };

    let outcomes = h.executor.sweep(&h.wallet, &balances, &destinations).await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].family, ChainFamily::Utxo);
    assert_eq!(outcomes[1].family, ChainFamily::Solana);
    for outcome in &outcomes {
        assert!(outcome.transfers.is_empty());
        assert!(outcome.skipped.as_deref().unwrap().contains("not implemented"));
    }
    assert!(h.sink.of_kind(EventKind::SweepSucceeded).is_empty());
}

#[tokio::test]
async fn test_missing_destination_skips_chain() {
    let h = harness(MockEvm::new(units(1, 18), gwei(10)), MockTron::new(U256::zero()), &["ethereum"]).await;
    let balances = vec![valued(&h.wallet, "ethereum", "ETH", units(1, 18), 18, 2_000.0)];

    let outcomes = h
        .executor
        .sweep(&h.wallet, &balances, &Destinations::default())
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].skipped.is_some());
    assert!(h.evm.sent().is_empty());
}

#[tokio::test]
async fn test_signer_must_match_stored_address() {
    let h = harness(MockEvm::new(units(1, 18), gwei(10)), MockTron::new(U256::zero()), &["ethereum"]).await;

    let mut tampered = h.wallet.clone();
    tampered.networks[0].address = EVM_DESTINATION.to_string();
    let balances = vec![valued(&tampered, "ethereum", "ETH", units(1, 18), 18, 2_000.0)];

    let err = h
        .executor
        .sweep(&tampered, &balances, &evm_destinations())
        .await
        .unwrap_err();
    assert!(matches!(err, SweepError::Validation(_)));
    assert!(h.evm.sent().is_empty());
    // the store still holds the real address
    let stored = h.store.wallet_networks(h.wallet.id).await.unwrap();
    assert_eq!(stored[0].address, TEST_EVM_ADDRESS);
}
