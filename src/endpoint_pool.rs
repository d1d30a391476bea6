// src/endpoint_pool.rs

//! Tiered endpoint resolution with a per-chain connection cache.
//!
//! Every chain has an ordered list of candidate endpoints (registry defaults, or
//! the `[rpc.endpoints]` override from settings). `resolve` walks the list with
//! [`try_in_order`], connecting and health-probing each candidate under the
//! configured timeout, and caches the first one that answers.
//!
//! ## Features
//!
//! - **Tier failover**: candidates are tried strictly in priority order
//! - **Bounded probes**: each connect+probe runs under `rpc.probe_timeout_ms`
//! - **Sticky handles**: a working handle is reused until `invalidate` is called
//! - **Failure trail**: the failures observed by the last probing resolve are kept per chain
//!
//! ## Usage
//!
//! ```rust,ignore
//! let pool = EndpointPool::from_settings(RpcConnector::new()?, &settings.rpc);
//! let handle = pool.resolve("ethereum").await?;
//! // on a use-time failure:
//! pool.invalidate("ethereum");
//! ```

use crate::chains::{get_chain, ChainDescriptor, ChainFamily};
use crate::error::{Result, SweepError};
use crate::metrics;
use crate::rpc_client::{build_http_client, JsonRpcClient, RestClient};
use crate::settings::RpcSettings;
use async_trait::async_trait;
use dashmap::DashMap;
use ethers::middleware::Middleware;
use ethers::prelude::{Http, Provider};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5_000);

/// One candidate that failed to connect or probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierFailure {
    /// Zero-based position in the candidate list.
    pub tier: usize,
    pub endpoint: String,
    pub error: String,
}

/// The first candidate that passed, plus the failures that preceded it.
#[derive(Debug)]
pub struct TierSuccess<T> {
    pub value: T,
    pub tier: usize,
    pub endpoint: String,
    pub failures: Vec<TierFailure>,
}

/// Runs `probe` against each candidate in order, each attempt bounded by `timeout`.
///
/// Returns the first success, or every failure when no candidate passes. An empty
/// candidate list yields an empty failure list.
pub async fn try_in_order<T, F, Fut>(
    candidates: &[String],
    timeout: Duration,
    mut probe: F,
) -> std::result::Result<TierSuccess<T>, Vec<TierFailure>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut failures = Vec::new();
    for (tier, endpoint) in candidates.iter().enumerate() {
        let error = match tokio::time::timeout(timeout, probe(endpoint.clone())).await {
            Ok(Ok(value)) => {
                return Ok(TierSuccess {
                    value,
                    tier,
                    endpoint: endpoint.clone(),
                    failures,
                })
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!("timed out after {}ms", timeout.as_millis()),
        };
        debug!("Tier {} candidate {} failed: {}", tier + 1, endpoint, error);
        failures.push(TierFailure {
            tier,
            endpoint: endpoint.clone(),
            error,
        });
    }
    Err(failures)
}

/// Opens and health-probes a connection to one endpoint.
#[async_trait]
pub trait EndpointConnector: Send + Sync {
    type Client: Clone + Send + Sync + 'static;

    async fn connect(
        &self,
        chain: &'static ChainDescriptor,
        endpoint: &str,
    ) -> anyhow::Result<Self::Client>;
}

/// A resolved, health-checked connection.
#[derive(Debug, Clone)]
pub struct ChainHandle<H> {
    pub chain_id: &'static str,
    pub endpoint: String,
    pub tier: usize,
    pub client: H,
}

/// Per-chain connection cache in front of an [`EndpointConnector`].
pub struct EndpointPool<C: EndpointConnector> {
    connector: C,
    handles: DashMap<&'static str, ChainHandle<C::Client>>,
    overrides: HashMap<String, Vec<String>>,
    probe_timeout: Duration,
    last_failures: DashMap<&'static str, Vec<TierFailure>>,
}

impl<C: EndpointConnector> EndpointPool<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            handles: DashMap::new(),
            overrides: HashMap::new(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            last_failures: DashMap::new(),
        }
    }

    pub fn from_settings(connector: C, settings: &RpcSettings) -> Self {
        Self::new(connector)
            .with_probe_timeout(Duration::from_millis(settings.probe_timeout_ms))
            .with_overrides(settings.endpoints.clone())
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Replaces the registry endpoints for the listed chains. Empty lists are ignored.
    pub fn with_overrides(mut self, overrides: HashMap<String, Vec<String>>) -> Self {
        self.overrides = overrides
            .into_iter()
            .filter(|(_, urls)| !urls.is_empty())
            .collect();
        self
    }

    pub fn candidates(&self, chain: &ChainDescriptor) -> Vec<String> {
        match self.overrides.get(chain.id) {
            Some(urls) => urls.clone(),
            None => chain.endpoints.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Cached handle if present, otherwise the first candidate that connects and probes.
    pub async fn resolve(&self, chain_id: &str) -> Result<ChainHandle<C::Client>> {
        let chain = get_chain(chain_id)
            .ok_or_else(|| SweepError::Validation(format!("unknown chain {}", chain_id)))?;

        if let Some(handle) = self.handles.get(chain.id) {
            return Ok(handle.clone());
        }

        let candidates = self.candidates(chain);
        let outcome = try_in_order(&candidates, self.probe_timeout, |endpoint| async move {
            self.connector.connect(chain, &endpoint).await
        })
        .await;

        match outcome {
            Ok(success) => {
                for failure in &success.failures {
                    warn!(
                        "⚠️ {} tier {} endpoint {} failed: {}",
                        chain.id,
                        failure.tier + 1,
                        failure.endpoint,
                        failure.error
                    );
                    metrics::increment_endpoint_failover(chain.id);
                }
                info!(
                    "✅ {} resolved to tier {} endpoint {}",
                    chain.id,
                    success.tier + 1,
                    success.endpoint
                );
                metrics::increment_endpoint_resolution(chain.id, success.tier);
                self.last_failures.insert(chain.id, success.failures);

                let handle = ChainHandle {
                    chain_id: chain.id,
                    endpoint: success.endpoint,
                    tier: success.tier,
                    client: success.value,
                };
                self.handles.insert(chain.id, handle.clone());
                Ok(handle)
            }
            Err(attempts) => {
                for _ in &attempts {
                    metrics::increment_endpoint_failover(chain.id);
                }
                self.last_failures.insert(chain.id, attempts.clone());
                Err(SweepError::AllEndpointsFailed {
                    chain_id: chain.id.to_string(),
                    attempts,
                })
            }
        }
    }

    /// Drops the cached handle so the next `resolve` probes again from tier 1.
    pub fn invalidate(&self, chain_id: &str) {
        if let Some((_, handle)) = self.handles.remove(chain_id) {
            warn!(
                "🔄 Invalidated {} handle at {} (tier {})",
                chain_id,
                handle.endpoint,
                handle.tier + 1
            );
            metrics::increment_endpoint_invalidation(chain_id);
        }
    }

    /// Resolves `chain_id` and runs `op` on its client.
    ///
    /// An error `op` raises as a [`SweepError`] means the endpoint answered and the
    /// handle stays cached. Any other error drops the handle so the next call
    /// probes the tiers again.
    pub async fn with_client<T, F, Fut>(&self, chain_id: &str, op: F) -> Result<T>
    where
        F: FnOnce(C::Client) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<T>> + Send,
        T: Send,
    {
        let handle = self.resolve(chain_id).await?;
        match op(handle.client).await {
            Ok(value) => Ok(value),
            Err(e) => match e.downcast::<SweepError>() {
                Ok(answered) => Err(answered),
                Err(e) => {
                    self.invalidate(handle.chain_id);
                    Err(SweepError::rpc(handle.chain_id, format!("{:#}", e)))
                }
            },
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn is_cached(&self, chain_id: &str) -> bool {
        self.handles.contains_key(chain_id)
    }

    /// Failures seen by the most recent probing resolve of `chain_id`.
    pub fn last_failures(&self, chain_id: &str) -> Vec<TierFailure> {
        self.last_failures
            .get(chain_id)
            .map(|f| f.clone())
            .unwrap_or_default()
    }
}

/// Live connection to one chain.
#[derive(Clone, Debug)]
pub enum ChainClient {
    Evm(Arc<Provider<Http>>),
    JsonRpc(JsonRpcClient),
    Rest(RestClient),
}

impl ChainClient {
    pub fn as_evm(&self) -> Option<&Arc<Provider<Http>>> {
        match self {
            Self::Evm(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_json_rpc(&self) -> Option<&JsonRpcClient> {
        match self {
            Self::JsonRpc(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_rest(&self) -> Option<&RestClient> {
        match self {
            Self::Rest(c) => Some(c),
            _ => None,
        }
    }
}

/// Connects over HTTP and probes with each family's cheapest "latest block" call.
#[derive(Clone)]
pub struct RpcConnector {
    http: reqwest::Client,
}

impl RpcConnector {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            http: build_http_client()?,
        })
    }
}

#[async_trait]
impl EndpointConnector for RpcConnector {
    type Client = ChainClient;

    async fn connect(
        &self,
        chain: &'static ChainDescriptor,
        endpoint: &str,
    ) -> anyhow::Result<ChainClient> {
        match chain.family {
            ChainFamily::Evm => {
                let provider = Provider::<Http>::try_from(endpoint)?;
                let block = provider.get_block_number().await?;
                debug!("{} probe at {}: block {}", chain.id, endpoint, block);
                Ok(ChainClient::Evm(Arc::new(provider)))
            }
            ChainFamily::Solana => {
                let client = JsonRpcClient::new(self.http.clone(), endpoint);
                let slot: u64 = client.call("getSlot", Vec::<serde_json::Value>::new()).await?;
                debug!("{} probe at {}: slot {}", chain.id, endpoint, slot);
                Ok(ChainClient::JsonRpc(client))
            }
            ChainFamily::Tron => {
                let client = RestClient::new(self.http.clone(), endpoint);
                let block: serde_json::Value = client
                    .post("/wallet/getnowblock", &serde_json::json!({}))
                    .await?;
                if block.get("block_header").is_none() {
                    anyhow::bail!("getnowblock returned no block header");
                }
                Ok(ChainClient::Rest(client))
            }
            ChainFamily::CosmosBech32 => {
                let client = RestClient::new(self.http.clone(), endpoint);
                let block: serde_json::Value = client
                    .get("/cosmos/base/tendermint/v1beta1/blocks/latest")
                    .await?;
                if block.get("block").is_none() && block.get("sdk_block").is_none() {
                    anyhow::bail!("latest block response has no block");
                }
                Ok(ChainClient::Rest(client))
            }
            ChainFamily::Utxo => {
                let client = RestClient::new(self.http.clone(), endpoint);
                let height: serde_json::Value = client.get("/blocks/tip/height").await?;
                debug!("{} probe at {}: height {}", chain.id, endpoint, height);
                Ok(ChainClient::Rest(client))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn urls(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("https://tier{}.example", i)).collect()
    }

    #[tokio::test]
    async fn test_try_in_order_returns_first_success() {
        let candidates = urls(3);
        let result = try_in_order(&candidates, Duration::from_secs(1), |endpoint| async move {
            if endpoint.contains("tier3") {
                Ok(endpoint.len())
            } else {
                Err(anyhow::anyhow!("refused"))
            }
        })
        .await
        .unwrap();

        assert_eq!(result.tier, 2);
        assert_eq!(result.endpoint, "https://tier3.example");
        assert_eq!(result.failures.len(), 2);
        assert_eq!(result.failures[0].tier, 0);
        assert_eq!(result.failures[1].error, "refused");
    }

    #[tokio::test]
    async fn test_try_in_order_times_out_slow_candidates() {
        let candidates = urls(2);
        let result = try_in_order(&candidates, Duration::from_millis(20), |endpoint| async move {
            if endpoint.contains("tier1") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok::<_, anyhow::Error>(())
        })
        .await
        .unwrap();
        assert_eq!(result.tier, 1);
        assert!(result.failures[0].error.contains("timed out"));
    }

    #[tokio::test]
    async fn test_try_in_order_exhaustion_reports_every_tier() {
        let calls = AtomicUsize::new(0);
        let candidates = urls(3);
        let failures = try_in_order(&candidates, Duration::from_secs(1), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(anyhow::anyhow!("down")) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(failures.len(), 3);

        let none: Vec<String> = Vec::new();
        let empty = try_in_order(&none, Duration::from_secs(1), |_| async {
            Ok::<_, anyhow::Error>(())
        })
        .await
        .unwrap_err();
        assert!(empty.is_empty());
    }

    struct CountingConnector {
        connects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EndpointConnector for CountingConnector {
        type Client = String;

        async fn connect(
            &self,
            _chain: &'static ChainDescriptor,
            endpoint: &str,
        ) -> anyhow::Result<String> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(endpoint.to_string())
        }
    }

    #[tokio::test]
    async fn test_resolve_caches_until_invalidated() {
        let connects = Arc::new(AtomicUsize::new(0));
        let pool = EndpointPool::new(CountingConnector {
            connects: connects.clone(),
        });

        let first = pool.resolve("ethereum").await.unwrap();
        let second = pool.resolve("ethereum").await.unwrap();
        assert_eq!(first.endpoint, second.endpoint);
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert!(pool.is_cached("ethereum"));

        pool.invalidate("ethereum");
        assert!(!pool.is_cached("ethereum"));
        pool.resolve("ethereum").await.unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_overrides_replace_registry_endpoints() {
        let mut overrides = HashMap::new();
        overrides.insert("bsc".to_string(), vec!["http://localhost:8545".to_string()]);
        overrides.insert("polygon".to_string(), Vec::new());
        let pool = EndpointPool::new(CountingConnector {
            connects: Arc::new(AtomicUsize::new(0)),
        })
        .with_overrides(overrides);

        let handle = pool.resolve("bsc").await.unwrap();
        assert_eq!(handle.client, "http://localhost:8545");

        let polygon = get_chain("polygon").unwrap();
        assert_eq!(pool.candidates(polygon).len(), polygon.endpoints.len());
    }

    #[tokio::test]
    async fn test_resolve_rejects_unknown_chain() {
        let pool = EndpointPool::new(CountingConnector {
            connects: Arc::new(AtomicUsize::new(0)),
        });
        assert!(matches!(
            pool.resolve("dogecoin").await,
            Err(SweepError::Validation(_))
        ));
    }
}
