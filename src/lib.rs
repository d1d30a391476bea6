//! # Custody Sweep SDK
//!
//! A Rust library for multi-chain custodial wallets: deterministic key derivation,
//! tiered RPC endpoint failover, balance aggregation with USD valuation, and
//! threshold-triggered consolidation of funds into operator-controlled destinations.
//!
//! ## Overview
//!
//! One seed phrase yields one address per supported chain. The engine watches the
//! combined USD value of every wallet and, once it rises above a configured
//! threshold, sweeps native and token balances to a per-family destination.
//!
//! - **Derivation**: EVM, Tron, UTXO, Solana and Cosmos addresses from one mnemonic
//! - **Resolution**: ordered endpoint tiers per chain, probed with a timeout, cached until invalidated
//! - **Aggregation**: concurrent per-asset balance reads, failures captured per item
//! - **Consolidation**: fee-reserve aware EVM and Tron sweeps with failure classification
//!
//! ## Architecture
//!
//! ### Registry & Keys
//! A static chain catalog drives family-specific derivation and address encoding.
//!
//! ### Chain Access
//! The endpoint pool resolves a live client per chain; gateways expose balance reads
//! and transfers behind traits so the core can run against mocks.
//!
//! ### Valuation
//! Balances are priced through a TTL cache in front of an external price source.
//!
//! ### Monitoring & Sweeping
//! A timer-driven monitor evaluates wallets sequentially and hands the ones above
//! threshold to the sweep executor, reporting every outcome to a notification sink.

// Core Types
/// Common types and data structures
pub mod types;
/// Static chain catalog
pub mod chains;
/// Error taxonomy
pub mod error;

// Keys
/// Seed phrase handling and per-family key derivation
pub mod derivation;
/// Wallet onboarding (derive, persist, announce)
pub mod onboarding;

// Chain Access
/// Tiered endpoint resolution with per-chain client cache
pub mod endpoint_pool;
/// JSON-RPC and REST clients
pub mod rpc_client;
/// Balance and transfer gateways per chain family
pub mod gateway;
/// Smart contract ABIs
pub mod contracts;

// Valuation
/// Concurrent balance aggregation and USD valuation
pub mod balance_aggregator;
/// USD price cache with stale fallback
pub mod price_cache;

// Monitoring & Sweeping
/// Threshold monitor
pub mod monitor;
/// Sweep executor
pub mod sweep;
/// Operator notifications
pub mod notifications;

// Infrastructure
/// PostgreSQL wallet store
pub mod database;
/// Metrics and observability
pub mod metrics;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use balance_aggregator::BalanceAggregator;
pub use database::{PgWalletStore, WalletStore};
pub use endpoint_pool::EndpointPool;
pub use error::{Result, SweepError};
pub use gateway::LiveGateway;
pub use monitor::ThresholdMonitor;
pub use notifications::NotificationSink;
pub use price_cache::PriceCache;
pub use settings::Settings;
pub use sweep::SweepExecutor;
