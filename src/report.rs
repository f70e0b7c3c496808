// 📑 Report Builder - final tables derived from the folded state
//
// Every table is a plain Vec of serializable rows so the writer can stay
// format-agnostic.

use crate::aggregation::{AddressTotals, AggregationState, MonthlyChainAggregate};
use crate::deduplication::{AddressChainKey, Deduplicated};
use crate::family::FamilyLabel;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Bucket for families observed fewer than `family_min_count` times
pub const OTHERS_FAMILY: &str = "others";

pub const DEFAULT_FAMILY_MIN_COUNT: usize = 6;
pub const DEFAULT_TOP_N: usize = 20;

// ============================================================================
// ROW TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyCount {
    pub family: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailCount {
    pub email_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainAddressCount {
    pub chain: String,
    pub address_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopAddress {
    pub address: String,
    pub inflow_usd: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTotal {
    pub month: String,
    pub receive_usd: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyChainTotal {
    pub month: String,
    pub chain: String,
    pub receive_usd: Decimal,
}

// ============================================================================
// TABLE BUILDERS
// ============================================================================

/// Count families, fold every family seen fewer than `min_count` times into
/// `"others"`, then regroup by name. Sorted by family name.
pub fn family_histogram<'a, I>(families: I, min_count: usize) -> Vec<FamilyCount>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for family in families {
        *counts.entry(family).or_insert(0) += 1;
    }

    let mut grouped: BTreeMap<&str, usize> = BTreeMap::new();
    for (family, count) in counts {
        let name = if count < min_count { OTHERS_FAMILY } else { family };
        *grouped.entry(name).or_insert(0) += count;
    }

    grouped
        .into_iter()
        .map(|(family, count)| FamilyCount {
            family: family.to_string(),
            count,
        })
        .collect()
}

/// Unique pairs per chain, in order of each chain's first appearance.
///
/// Counts pairs, not addresses, and includes pairs whose enrichment failed.
pub fn chain_address_counts(keys: &[AddressChainKey]) -> Vec<ChainAddressCount> {
    let mut rows: Vec<ChainAddressCount> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for key in keys {
        match index.get(key.chain.as_str()) {
            Some(&i) => rows[i].address_count += 1,
            None => {
                index.insert(key.chain.as_str(), rows.len());
                rows.push(ChainAddressCount {
                    chain: key.chain.clone(),
                    address_count: 1,
                });
            }
        }
    }

    rows
}

/// Highest-inflow addresses, descending; ties keep encounter order.
pub fn top_addresses(totals: &AddressTotals, n: usize) -> Vec<TopAddress> {
    let mut ranked: Vec<_> = totals.entries().iter().collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.total_usd.cmp(&a.total_usd));

    ranked
        .into_iter()
        .take(n)
        .map(|entry| TopAddress {
            address: entry.address.clone(),
            inflow_usd: entry.total_usd.normalize(),
        })
        .collect()
}

/// Chains collapsed into one USD figure per month, ascending by month.
pub fn monthly_totals(monthly: &MonthlyChainAggregate) -> Vec<MonthlyTotal> {
    monthly
        .iter()
        .map(|(month, chains)| MonthlyTotal {
            month: month.clone(),
            receive_usd: chains.values().copied().sum::<Decimal>().normalize(),
        })
        .collect()
}

/// Month × chain breakdown, ascending by month then chain.
pub fn monthly_chain_totals(monthly: &MonthlyChainAggregate) -> Vec<MonthlyChainTotal> {
    monthly
        .iter()
        .flat_map(|(month, chains)| {
            chains.iter().map(move |(chain, usd)| MonthlyChainTotal {
                month: month.clone(),
                chain: chain.clone(),
                receive_usd: usd.normalize(),
            })
        })
        .collect()
}

// ============================================================================
// REPORT SET
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSettings {
    pub family_min_count: usize,
    pub top_n: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        ReportSettings {
            family_min_count: DEFAULT_FAMILY_MIN_COUNT,
            top_n: DEFAULT_TOP_N,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reports {
    pub family_histogram: Vec<FamilyCount>,
    pub email_count: EmailCount,
    pub chain_counts: Vec<ChainAddressCount>,
    pub top_addresses: Vec<TopAddress>,
    pub monthly_totals: Vec<MonthlyTotal>,
    pub monthly_chain_totals: Vec<MonthlyChainTotal>,
}

impl Reports {
    pub fn build(
        families: &[FamilyLabel],
        deduped: &Deduplicated,
        state: &AggregationState,
        settings: &ReportSettings,
    ) -> Self {
        Reports {
            family_histogram: family_histogram(
                families.iter().map(FamilyLabel::name),
                settings.family_min_count,
            ),
            email_count: EmailCount {
                email_count: deduped.email_count(),
            },
            chain_counts: chain_address_counts(&deduped.keys),
            top_addresses: top_addresses(&state.address_totals, settings.top_n),
            monthly_totals: monthly_totals(&state.monthly),
            monthly_chain_totals: monthly_chain_totals(&state.monthly),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} families, {} emails, {} chains, {} ranked addresses, {} months",
            self.family_histogram.len(),
            self.email_count.email_count,
            self.chain_counts.len(),
            self.top_addresses.len(),
            self.monthly_totals.len()
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
