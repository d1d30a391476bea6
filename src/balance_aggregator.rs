// src/balance_aggregator.rs

//! Concurrent native + token balance collection for a wallet's addresses.
//!
//! One job per (chain, asset) pair; every job produces exactly one
//! [`BalanceItem`], with failures captured in `BalanceItem::error` instead of
//! aborting the batch.

use crate::chains::{get_chain, ChainDescriptor, TokenDescriptor};
use crate::gateway::BalanceSource;
use crate::metrics;
use crate::price_cache::PriceCache;
use crate::types::conversions::u256_to_decimal;
use crate::types::{BalanceItem, NetworkAddress, ValuedBalanceItem};
use ethers::types::U256;
use futures::future::join_all;
use log::{debug, warn};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Priced view of an aggregation.
#[derive(Debug, Clone, Default)]
pub struct ValuationSummary {
    pub valued: Vec<ValuedBalanceItem>,
    /// Items that carried a fetch error.
    pub failed: Vec<BalanceItem>,
    /// Sum of `valued[*].value_usd`.
    pub total_usd: f64,
}

pub struct BalanceAggregator {
    source: Arc<dyn BalanceSource>,
}

enum Job {
    Native(&'static ChainDescriptor, String),
    Token(&'static ChainDescriptor, &'static TokenDescriptor, String),
    /// Chain unknown or disabled; reported without a network call.
    Rejected(String, String, &'static str),
}

impl BalanceAggregator {
    pub fn new(source: Arc<dyn BalanceSource>) -> Self {
        Self { source }
    }

    /// One item per native asset and per tracked token of every address.
    pub async fn aggregate(&self, addresses: &[NetworkAddress]) -> Vec<BalanceItem> {
        let mut jobs = Vec::new();
        for entry in addresses {
            match get_chain(&entry.chain_id) {
                Some(chain) if chain.enabled => {
                    jobs.push(Job::Native(chain, entry.address.clone()));
                    for token in chain.tokens {
                        jobs.push(Job::Token(chain, token, entry.address.clone()));
                    }
                }
                Some(_) => jobs.push(Job::Rejected(
                    entry.chain_id.clone(),
                    entry.address.clone(),
                    "chain is disabled",
                )),
                None => jobs.push(Job::Rejected(
                    entry.chain_id.clone(),
                    entry.address.clone(),
                    "chain is not in the registry",
                )),
            }
        }

        let items = join_all(jobs.into_iter().map(|job| self.run(job))).await;
        let failures = items.iter().filter(|i| !i.is_ok()).count();
        debug!(
            "Aggregated {} balance items across {} addresses ({} failed)",
            items.len(),
            addresses.len(),
            failures
        );
        items
    }

    async fn run(&self, job: Job) -> BalanceItem {
        match job {
            Job::Native(chain, address) => {
                match self.source.native_balance(chain, &address).await {
                    Ok(raw) => BalanceItem {
                        chain_id: chain.id.to_string(),
                        symbol: chain.native_symbol.to_string(),
                        raw_balance: raw,
                        decimals: chain.decimals,
                        is_token: false,
                        token_id: None,
                        source_address: address,
                        error: None,
                    },
                    Err(e) => {
                        warn!(
                            "⚠️ {} native balance for {} failed: {}",
                            chain.id, address, e
                        );
                        metrics::increment_balance_fetch_error(chain.id);
                        BalanceItem::failed(chain.id, chain.native_symbol, false, &address, e)
                    }
                }
            }
            Job::Token(chain, token, address) => {
                match self.source.token_balance(chain, token, &address).await {
                    Ok(amount) => BalanceItem {
                        chain_id: chain.id.to_string(),
                        symbol: token.symbol.to_string(),
                        raw_balance: amount.raw,
                        decimals: amount.decimals,
                        is_token: true,
                        token_id: Some(token.locator.id().to_string()),
                        source_address: address,
                        error: None,
                    },
                    Err(e) => {
                        warn!(
                            "⚠️ {} {} balance for {} failed: {}",
                            chain.id, token.symbol, address, e
                        );
                        metrics::increment_balance_fetch_error(chain.id);
                        let mut item = BalanceItem::failed(chain.id, token.symbol, true, &address, e);
                        item.token_id = Some(token.locator.id().to_string());
                        item.decimals = token.decimals;
                        item
                    }
                }
            }
            Job::Rejected(chain_id, address, reason) => {
                BalanceItem::failed(&chain_id, "", false, &address, reason)
            }
        }
    }
}

/// USD value of `raw` smallest units at `price_usd`, computed in decimal.
pub fn usd_value(raw: U256, decimals: u8, price_usd: f64) -> Option<f64> {
    let amount = u256_to_decimal(raw, decimals).ok()?;
    let price = Decimal::from_f64(price_usd)?;
    amount.checked_mul(price)?.to_f64()
}

pub fn value_of(item: &BalanceItem, price_usd: f64) -> Option<f64> {
    usd_value(item.raw_balance, item.decimals, price_usd)
}

/// Prices every successful item with a nonzero balance. Items without a
/// positive price are left out of `valued` and contribute nothing to the total.
pub async fn value_balances(items: &[BalanceItem], prices: &PriceCache) -> ValuationSummary {
    let mut summary = ValuationSummary::default();
    let mut price_by_symbol: HashMap<String, f64> = HashMap::new();

    for item in items {
        if !item.is_ok() {
            summary.failed.push(item.clone());
            continue;
        }
        if item.raw_balance.is_zero() {
            continue;
        }

        let key = item.symbol.to_ascii_uppercase();
        let price = match price_by_symbol.get(&key) {
            Some(p) => *p,
            None => {
                let p = prices.price_usd(&item.symbol).await;
                price_by_symbol.insert(key, p);
                p
            }
        };
        if price <= 0.0 {
            debug!("No USD price for {} on {}; not valued", item.symbol, item.chain_id);
            continue;
        }

        let Some(value_usd) = value_of(item, price) else {
            warn!(
                "⚠️ Could not value {} {} on {}",
                item.raw_balance, item.symbol, item.chain_id
            );
            continue;
        };
        summary.total_usd += value_usd;
        summary.valued.push(ValuedBalanceItem {
            item: item.clone(),
            price_usd: price,
            value_usd,
        });
    }
    summary
}
