// 💾 Fetch Snapshot - persist fetched outcomes, replay them without network
//
// Replaying a snapshot through the same fold yields the same reports as the
// run that recorded it.

use crate::deduplication::AddressChainKey;
use crate::error::EnrichmentFailure;
use crate::explorer::{FetchResult, SummarySource};
use crate::fetch_pool::FetchOutcome;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSnapshot {
    pub recorded_at: DateTime<Utc>,
    pub endpoint: String,
    /// Outcomes in input order
    pub outcomes: Vec<FetchOutcome>,
}

impl FetchSnapshot {
    pub fn new(endpoint: &str, outcomes: Vec<FetchOutcome>) -> Self {
        FetchSnapshot {
            recorded_at: Utc::now(),
            endpoint: endpoint.to_string(),
            outcomes,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to encode snapshot")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse snapshot JSON")
    }
}

/// `SummarySource` answering from a recorded snapshot.
///
/// Pairs the snapshot never saw fail with `NotInSnapshot`.
pub struct SnapshotSource {
    results: HashMap<AddressChainKey, FetchResult>,
}

impl SnapshotSource {
    pub fn new(snapshot: FetchSnapshot) -> Self {
        SnapshotSource {
            results: snapshot
                .outcomes
                .into_iter()
                .map(|o| (o.key, o.result))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl SummarySource for SnapshotSource {
    fn fetch_summary(&self, key: &AddressChainKey) -> FetchResult {
        self.results
            .get(key)
            .cloned()
            .unwrap_or(Err(EnrichmentFailure::NotInSnapshot))
    }
}
