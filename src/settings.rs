// src/settings.rs

use crate::chains::all_chains;
use crate::error::SweepError;
use crate::types::Destinations;
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct RpcSettings {
    /// Upper bound for one connect + health probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Per-chain endpoint tiers replacing the registry defaults, highest priority first.
    #[serde(default)]
    pub endpoints: HashMap<String, Vec<String>>,
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            endpoints: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PriceSettings {
    #[serde(default = "default_price_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_price_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,
}

fn default_price_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}
fn default_price_cache_ttl_seconds() -> u64 {
    300 // 5 minutes
}
fn default_max_requests_per_minute() -> u32 {
    30 // CoinGecko free tier
}

impl Default for PriceSettings {
    fn default() -> Self {
        Self {
            base_url: default_price_base_url(),
            api_key: None,
            cache_ttl_seconds: default_price_cache_ttl_seconds(),
            max_requests_per_minute: default_max_requests_per_minute(),
        }
    }
}

/// What happens when a wallet is still above threshold on the next cycle.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResweepPolicy {
    /// Sweep every cycle the total is above threshold.
    #[default]
    EveryCycle,
    /// Sweep only when the total crosses the threshold from below.
    OnCrossing,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorSettings {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_threshold_usd")]
    pub threshold_usd: f64,
    #[serde(default)]
    pub resweep_policy: ResweepPolicy,
    /// Fallback destinations when the store holds no monitor configuration.
    #[serde(default)]
    pub destinations: Destinations,
}

fn default_interval_ms() -> u64 {
    60_000
}
fn default_threshold_usd() -> f64 {
    100.0
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            threshold_usd: default_threshold_usd(),
            resweep_policy: ResweepPolicy::default(),
            destinations: Destinations::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExplorerKind {
    /// Blockstream / mempool.space `address/{addr}` with chain_stats.
    Esplora,
    /// Blockcypher `addrs/{addr}/balance`.
    Blockcypher,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ExplorerConfig {
    pub kind: ExplorerKind,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UtxoSettings {
    #[serde(default = "default_explorers")]
    pub explorers: Vec<ExplorerConfig>,
    #[serde(default = "default_explorer_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_explorers() -> Vec<ExplorerConfig> {
    vec![
        ExplorerConfig {
            kind: ExplorerKind::Esplora,
            base_url: "https://blockstream.info/api".to_string(),
        },
        ExplorerConfig {
            kind: ExplorerKind::Esplora,
            base_url: "https://mempool.space/api".to_string(),
        },
        ExplorerConfig {
            kind: ExplorerKind::Blockcypher,
            base_url: "https://api.blockcypher.com/v1/btc/main".to_string(),
        },
    ]
}
fn default_explorer_timeout_ms() -> u64 {
    10_000
}

impl Default for UtxoSettings {
    fn default() -> Self {
        Self {
            explorers: default_explorers(),
            timeout_ms: default_explorer_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationSettings {
    /// JSON events are POSTed here when set; otherwise they are only logged.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Symmetric key for the encrypted seed column.
    #[serde(default)]
    pub seed_encryption_key: Option<String>,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            seed_encryption_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub rpc: RpcSettings,
    #[serde(default)]
    pub price: PriceSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub utxo: UtxoSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
}

impl Settings {
    /// Reads `Config.toml` from the working directory (optional) plus `SWEEP_*` overrides.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_file("Config.toml")
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Loads and validates; the form used by the binary.
    pub fn load(path: &str) -> crate::error::Result<Self> {
        let settings = Self::from_file(path).map_err(|e| SweepError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.monitor.interval_ms == 0 {
            return Err(SweepError::Config("monitor.interval_ms must be non-zero".into()));
        }
        if !self.monitor.threshold_usd.is_finite() || self.monitor.threshold_usd < 0.0 {
            return Err(SweepError::Config(format!(
                "monitor.threshold_usd must be a non-negative number, got {}",
                self.monitor.threshold_usd
            )));
        }
        if self.price.max_requests_per_minute == 0 {
            return Err(SweepError::Config(
                "price.max_requests_per_minute must be non-zero".into(),
            ));
        }
        for chain_id in self.rpc.endpoints.keys() {
            if !all_chains().iter().any(|c| c.id == chain_id) {
                return Err(SweepError::Config(format!(
                    "rpc.endpoints has an entry for unknown chain {}",
                    chain_id
                )));
            }
        }
        self.monitor.destinations.validate()
    }

    fn apply_env_overrides(&mut self) {
        // SWEEP_RPC_<CHAIN>_URLS, e.g. SWEEP_RPC_ETHEREUM_URLS="https://a,https://b"
        for chain in all_chains() {
            let key = format!("SWEEP_RPC_{}_URLS", chain.id.to_ascii_uppercase());
            if let Ok(raw) = env::var(&key) {
                if let Some(list) = parse_string_list(&raw) {
                    if !list.is_empty() {
                        self.rpc.endpoints.insert(chain.id.to_string(), list);
                    }
                }
            }
        }

        if let Some(v) = env_non_empty("SWEEP_MONITOR_THRESHOLD_USD") {
            match v.parse() {
                Ok(threshold) => self.monitor.threshold_usd = threshold,
                Err(e) => eprintln!("Failed to parse SWEEP_MONITOR_THRESHOLD_USD: {}", e),
            }
        }
        if let Some(v) = env_non_empty("SWEEP_MONITOR_INTERVAL_MS") {
            match v.parse() {
                Ok(interval) => self.monitor.interval_ms = interval,
                Err(e) => eprintln!("Failed to parse SWEEP_MONITOR_INTERVAL_MS: {}", e),
            }
        }
        if let Some(v) = env_non_empty("SWEEP_DESTINATION_EVM") {
            self.monitor.destinations.evm = Some(v);
        }
        if let Some(v) = env_non_empty("SWEEP_DESTINATION_UTXO") {
            self.monitor.destinations.utxo = Some(v);
        }
        if let Some(v) = env_non_empty("SWEEP_DESTINATION_TRON") {
            self.monitor.destinations.tron = Some(v);
        }
        if let Some(v) = env_non_empty("SWEEP_PRICE_API_KEY") {
            self.price.api_key = Some(v);
        }
        if let Some(v) = env_non_empty("SWEEP_NOTIFICATIONS_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(v);
        }
        if let Some(v) = env_non_empty("SWEEP_DATABASE_URL").or_else(|| env_non_empty("DATABASE_URL")) {
            self.database.url = Some(v);
        }
        if let Some(v) = env_non_empty("SWEEP_SEED_ENCRYPTION_KEY") {
            self.database.seed_encryption_key = Some(v);
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts a JSON array (`["a","b"]`), a bracketed list without quotes, or a plain
/// comma-separated string.
pub(crate) fn parse_string_list(input: &str) -> Option<Vec<String>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(vec![]);
    }

    if trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Vec<String>>(trimmed) {
            return Some(v);
        }
        let without_brackets = trimmed.trim_start_matches('[').trim_end_matches(']');
        return Some(split_list(without_brackets));
    }

    Some(split_list(trimmed))
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
