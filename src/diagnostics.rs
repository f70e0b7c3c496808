// 📋 Diagnostics - side-channel event stream for non-fatal problems
// Every event is mirrored to `tracing` and kept for the diagnostics report.

use crate::error::EnrichmentFailure;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ============================================================================
// DIAGNOSTIC EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// Raw family suffix absent from the mapping
    UnmappedFamily { suffix: String },

    /// Explorer lookup for one pair failed
    EnrichmentFailed {
        address: String,
        chain: String,
        failure: EnrichmentFailure,
    },

    /// Address already totalled under another chain; this chain's inflow
    /// is kept out of the per-address total
    AddressChainConflict {
        address: String,
        recorded_chain: String,
        chain: String,
    },
}

impl Diagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::UnmappedFamily { .. } => "unmapped_family",
            Diagnostic::EnrichmentFailed { .. } => "enrichment_failed",
            Diagnostic::AddressChainConflict { .. } => "address_chain_conflict",
        }
    }

    /// What the event is about (suffix or address)
    pub fn subject(&self) -> &str {
        match self {
            Diagnostic::UnmappedFamily { suffix } => suffix,
            Diagnostic::EnrichmentFailed { address, .. } => address,
            Diagnostic::AddressChainConflict { address, .. } => address,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Diagnostic::UnmappedFamily { .. } => "unmapped".to_string(),
            Diagnostic::EnrichmentFailed { chain, failure, .. } => {
                format!("{}: {}", chain, failure)
            }
            Diagnostic::AddressChainConflict {
                recorded_chain,
                chain,
                ..
            } => format!("total kept from {}, {} not counted", recorded_chain, chain),
        }
    }
}

// ============================================================================
// COLLECTOR
// ============================================================================

#[derive(Debug, Default)]
pub struct Diagnostics {
    events: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: Diagnostic) {
        match &event {
            Diagnostic::UnmappedFamily { suffix } => {
                warn!(suffix = %suffix, "unmapped family suffix");
            }
            Diagnostic::EnrichmentFailed {
                address,
                chain,
                failure,
            } => {
                warn!(
                    address = %address,
                    chain = %chain,
                    reason = %failure,
                    "enrichment failed, pair skipped"
                );
            }
            Diagnostic::AddressChainConflict {
                address,
                recorded_chain,
                chain,
            } => {
                warn!(
                    address = %address,
                    recorded_chain = %recorded_chain,
                    chain = %chain,
                    "address seen under a second chain, keeping first total"
                );
            }
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[Diagnostic] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn enrichment_failures(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Diagnostic::EnrichmentFailed { .. }))
            .count()
    }
}
