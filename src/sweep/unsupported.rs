// src/sweep/unsupported.rs

use crate::chains::ChainDescriptor;
use crate::error::SweepError;
use crate::types::{SweepOutcome, ValuedBalanceItem};
use log::info;

/// Families without a broadcast path: log what would have moved and report the
/// chain as skipped.
pub(crate) fn log_intent(
    chain: &'static ChainDescriptor,
    source: &str,
    destination: Option<&str>,
    items: &[&ValuedBalanceItem],
) -> SweepOutcome {
    let destination = destination.unwrap_or("<no destination configured>");
    for valued in items {
        info!(
            "📝 {} sweep intent: {} {} (${:.2}) from {} to {}",
            chain.id,
            valued.item.amount(),
            valued.item.symbol,
            valued.value_usd,
            source,
            destination
        );
    }
    SweepOutcome {
        chain_id: chain.id.to_string(),
        family: chain.family,
        source_address: source.to_string(),
        transfers: Vec::new(),
        skipped: Some(SweepError::Unimplemented { family: chain.family }.to_string()),
    }
}
