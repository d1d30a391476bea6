// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, gauge};

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "endpoint_resolutions_total",
        Unit::Count,
        "Endpoint resolutions that probed candidates, labeled by chain and winning tier."
    );
    describe_counter!(
        "endpoint_failovers_total",
        Unit::Count,
        "Candidate endpoints that failed their probe, labeled by chain."
    );
    describe_counter!(
        "endpoint_invalidations_total",
        Unit::Count,
        "Cached handles dropped after a use-time failure, labeled by chain."
    );
    describe_counter!(
        "price_cache_lookups_total",
        Unit::Count,
        "Price lookups labeled by outcome (hit, refreshed, stale, missing)."
    );
    describe_counter!(
        "balance_fetch_errors_total",
        Unit::Count,
        "Balance items returned with an error, labeled by chain."
    );
    describe_counter!(
        "sweeps_total",
        Unit::Count,
        "Per-chain sweep results labeled by chain and outcome."
    );
    describe_gauge!(
        "monitor_last_cycle_wallets",
        "Wallets checked during the last monitor cycle."
    );
}

/// Starts the Prometheus scrape endpoint.
#[cfg(feature = "observability")]
pub fn install_exporter(listen: std::net::SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()?;
    describe_metrics();
    Ok(())
}

pub fn increment_endpoint_resolution(chain_id: &str, tier: usize) {
    counter!("endpoint_resolutions_total", 1, "chain" => chain_id.to_string(), "tier" => (tier + 1).to_string());
}

pub fn increment_endpoint_failover(chain_id: &str) {
    counter!("endpoint_failovers_total", 1, "chain" => chain_id.to_string());
}

pub fn increment_endpoint_invalidation(chain_id: &str) {
    counter!("endpoint_invalidations_total", 1, "chain" => chain_id.to_string());
}

pub fn increment_price_lookup(outcome: &'static str) {
    counter!("price_cache_lookups_total", 1, "outcome" => outcome);
}

pub fn increment_balance_fetch_error(chain_id: &str) {
    counter!("balance_fetch_errors_total", 1, "chain" => chain_id.to_string());
}

pub fn increment_sweep(chain_id: &str, outcome: &'static str) {
    counter!("sweeps_total", 1, "chain" => chain_id.to_string(), "outcome" => outcome);
}

pub fn set_last_cycle_wallets(count: usize) {
    gauge!("monitor_last_cycle_wallets", count as f64);
}
