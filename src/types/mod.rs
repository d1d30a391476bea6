//! Data model shared across the engine.

pub mod balances;
pub mod conversions;
pub mod wallet;

pub use balances::{BalanceItem, SweepOutcome, TransferKind, TransferRecord, ValuedBalanceItem};
pub use wallet::{Destinations, LedgerEntry, MonitorConfig, NetworkAddress, Wallet};
