// src/price_cache.rs

//! Symbol → USD price cache.
//!
//! Entries younger than the TTL are served directly. Older or missing entries go
//! to the [`PriceSource`]; a failed refresh falls back to the last value ever
//! cached for that symbol, and to `0.0` when there is none. Symbols without a
//! price-source mapping resolve to `0.0` without touching the network.

use crate::chains::price_source_id;
use crate::metrics;
use crate::settings::PriceSettings;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_PRICE_TTL: Duration = Duration::from_secs(300);

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// External USD price lookup keyed by the canonical source id (e.g. `"ethereum"`).
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_usd(&self, source_id: &str) -> Result<f64>;
}

#[derive(Debug, Deserialize)]
struct CoinGeckoTokenPrice {
    usd: f64,
}

type CoinGeckoPriceResponse = HashMap<String, CoinGeckoTokenPrice>;

/// CoinGecko `simple/price`, rate limited per minute.
pub struct CoinGeckoSource {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    limiter: DirectRateLimiter,
}

impl CoinGeckoSource {
    pub fn new(settings: &PriceSettings) -> Result<Self> {
        let per_minute = NonZeroU32::new(settings.max_requests_per_minute)
            .ok_or_else(|| anyhow!("price.max_requests_per_minute must be non-zero"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    async fn fetch_usd(&self, source_id: &str) -> Result<f64> {
        self.limiter.until_ready().await;

        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.base_url, source_id
        );
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request failed: {}", e))?;
        if !response.status().is_success() {
            if response.status() == 429 {
                return Err(anyhow!("Rate limited (429)"));
            }
            return Err(anyhow!("HTTP error: {}", response.status()));
        }

        let price_data: CoinGeckoPriceResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("JSON parse failed: {}", e))?;
        price_data
            .get(source_id)
            .map(|p| p.usd)
            .ok_or_else(|| anyhow!("no usd price for {}", source_id))
    }
}

#[derive(Debug, Clone, Copy)]
struct PriceEntry {
    price: f64,
    fetched_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served from cache within TTL.
    Fresh,
    /// Fetched from the source during this lookup.
    Refreshed,
    /// Source failed; last known value returned.
    Stale,
    /// No value available; price reported as zero.
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceQuote {
    pub price_usd: f64,
    pub freshness: Freshness,
}

pub struct PriceCache {
    source: Arc<dyn PriceSource>,
    entries: DashMap<String, PriceEntry>,
    ttl: Duration,
}

impl PriceCache {
    pub fn new(source: Arc<dyn PriceSource>) -> Self {
        Self::with_ttl(source, DEFAULT_PRICE_TTL)
    }

    pub fn with_ttl(source: Arc<dyn PriceSource>, ttl: Duration) -> Self {
        Self {
            source,
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn from_settings(settings: &PriceSettings) -> Result<Self> {
        let source = CoinGeckoSource::new(settings)?;
        Ok(Self::with_ttl(
            Arc::new(source),
            Duration::from_secs(settings.cache_ttl_seconds),
        ))
    }

    /// USD price of `symbol`; `0.0` means "no usable price".
    pub async fn price_usd(&self, symbol: &str) -> f64 {
        self.lookup(symbol).await.price_usd
    }

    pub async fn lookup(&self, symbol: &str) -> PriceQuote {
        let key = symbol.to_ascii_uppercase();

        let cached = self.entries.get(&key).map(|e| *e);
        if let Some(entry) = cached {
            if entry.fetched_at.elapsed() < self.ttl {
                metrics::increment_price_lookup("hit");
                return PriceQuote {
                    price_usd: entry.price,
                    freshness: Freshness::Fresh,
                };
            }
        }

        let Some(source_id) = price_source_id(&key) else {
            debug!("No price source mapping for {}", key);
            metrics::increment_price_lookup("missing");
            return PriceQuote {
                price_usd: 0.0,
                freshness: Freshness::Missing,
            };
        };

        match self.source.fetch_usd(source_id).await {
            Ok(price) if price.is_finite() && price > 0.0 => {
                self.entries.insert(
                    key,
                    PriceEntry {
                        price,
                        fetched_at: Instant::now(),
                    },
                );
                metrics::increment_price_lookup("refreshed");
                PriceQuote {
                    price_usd: price,
                    freshness: Freshness::Refreshed,
                }
            }
            outcome => {
                let reason = match outcome {
                    Ok(price) => format!("invalid price {}", price),
                    Err(e) => e.to_string(),
                };
                match cached {
                    Some(entry) => {
                        warn!(
                            "⚠️ Price refresh for {} failed ({}); using stale ${:.4} from {:?} ago",
                            key,
                            reason,
                            entry.price,
                            entry.fetched_at.elapsed()
                        );
                        metrics::increment_price_lookup("stale");
                        PriceQuote {
                            price_usd: entry.price,
                            freshness: Freshness::Stale,
                        }
                    }
                    None => {
                        warn!("⚠️ Price fetch for {} failed ({}); no cached value", key, reason);
                        metrics::increment_price_lookup("missing");
                        PriceQuote {
                            price_usd: 0.0,
                            freshness: Freshness::Missing,
                        }
                    }
                }
            }
        }
    }

    pub fn cached_symbols(&self) -> usize {
        self.entries.len()
    }
}
