// 📊 Aggregation - fold per-address summaries into inflow totals
//
// Each fetched pair is one event. `AggregationState::apply` is the reducer:
//   state + outcome -> state'
// Outcomes must be applied in input order; first-write-wins for address totals
// depends on it.

use crate::currency::RateTable;
use crate::deduplication::AddressChainKey;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::EnrichmentFailure;
use crate::explorer::TransactionItem;
use crate::fetch_pool::FetchOutcome;
use chrono::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// `YYYY-MM` → USD received in that month
pub type MonthlyReceiveBucket = BTreeMap<String, Decimal>;

/// `YYYY-MM` → chain → USD received
pub type MonthlyChainAggregate = BTreeMap<String, BTreeMap<String, Decimal>>;

// ============================================================================
// PER-ADDRESS BUCKETING
// ============================================================================

/// UTC calendar month of an epoch-millisecond timestamp
pub fn bucket_month(epoch_millis: i64) -> Option<String> {
    DateTime::from_timestamp_millis(epoch_millis).map(|dt| dt.format("%Y-%m").to_string())
}

/// Bucket one address's transactions by last-seen month, in USD.
///
/// The chain identifier doubles as the currency code, so every item on a chain
/// converts at that chain's single static rate.
pub fn aggregate_address(
    key: &AddressChainKey,
    items: &[TransactionItem],
    rates: &RateTable,
) -> Result<MonthlyReceiveBucket, EnrichmentFailure> {
    let mut buckets = MonthlyReceiveBucket::new();

    for item in items {
        let month = bucket_month(item.last_seen_epoch_millis).ok_or_else(|| {
            EnrichmentFailure::Malformed(format!(
                "lastTransactionTime {} out of range",
                item.last_seen_epoch_millis
            ))
        })?;

        let slot = buckets.entry(month).or_insert(Decimal::ZERO);
        *slot = rates
            .to_usd(item.receive_amount_native, &key.chain)
            .and_then(|usd| slot.checked_add(usd))
            .ok_or_else(amount_overflow)?;
    }

    Ok(buckets)
}

fn amount_overflow() -> EnrichmentFailure {
    EnrichmentFailure::Malformed("amount overflow".to_string())
}

// ============================================================================
// ADDRESS TOTALS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressIncoming {
    pub address: String,
    pub total_usd: Decimal,
    pub chain: String,
}

/// Address → (total, chain), in first-encounter order.
///
/// Only the first chain an address is enriched under is recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressTotals {
    entries: Vec<AddressIncoming>,
    index: HashMap<String, usize>,
}

impl AddressTotals {
    /// Record a total unless the address already has one. Returns the
    /// existing entry when the insert was refused.
    pub fn record_first(&mut self, entry: AddressIncoming) -> Option<&AddressIncoming> {
        if let Some(&i) = self.index.get(&entry.address) {
            return Some(&self.entries[i]);
        }
        self.index.insert(entry.address.clone(), self.entries.len());
        self.entries.push(entry);
        None
    }

    pub fn get(&self, address: &str) -> Option<&AddressIncoming> {
        self.index.get(address).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, address: &str) -> bool {
        self.index.contains_key(address)
    }

    /// Entries in encounter order
    pub fn entries(&self) -> &[AddressIncoming] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// FOLD STATE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationState {
    pub address_totals: AddressTotals,
    pub monthly: MonthlyChainAggregate,
    pub enriched_pairs: usize,
    pub failed_pairs: usize,
}

impl AggregationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fetch outcome into the state.
    ///
    /// Failed pairs touch neither the address totals nor the monthly
    /// aggregate; they are reported on the diagnostics channel.
    pub fn apply(
        mut self,
        outcome: &FetchOutcome,
        rates: &RateTable,
        diagnostics: &mut Diagnostics,
    ) -> Self {
        let key = &outcome.key;

        let folded = outcome
            .result
            .as_ref()
            .map_err(Clone::clone)
            .and_then(|items| aggregate_address(key, items, rates))
            .and_then(|buckets| self.fold_amounts(&key.chain, buckets));

        let (total, monthly) = match folded {
            Ok(folded) => folded,
            Err(failure) => {
                diagnostics.emit(Diagnostic::EnrichmentFailed {
                    address: key.address.clone(),
                    chain: key.chain.clone(),
                    failure,
                });
                self.failed_pairs += 1;
                return self;
            }
        };

        let refused = self.address_totals.record_first(AddressIncoming {
            address: key.address.clone(),
            total_usd: total,
            chain: key.chain.clone(),
        });
        if let Some(existing) = refused {
            diagnostics.emit(Diagnostic::AddressChainConflict {
                address: key.address.clone(),
                recorded_chain: existing.chain.clone(),
                chain: key.chain.clone(),
            });
        }

        for (month, usd) in monthly {
            self.monthly
                .entry(month)
                .or_default()
                .insert(key.chain.clone(), usd);
        }

        self.enriched_pairs += 1;
        self
    }

    /// Address total plus the updated monthly slots for `chain`, computed
    /// without touching the state so an overflow leaves it unchanged.
    fn fold_amounts(
        &self,
        chain: &str,
        buckets: MonthlyReceiveBucket,
    ) -> Result<(Decimal, MonthlyReceiveBucket), EnrichmentFailure> {
        let mut total = Decimal::ZERO;
        let mut updated = MonthlyReceiveBucket::new();

        for (month, usd) in buckets {
            total = total.checked_add(usd).ok_or_else(amount_overflow)?;

            let current = self
                .monthly
                .get(&month)
                .and_then(|chains| chains.get(chain))
                .copied()
                .unwrap_or(Decimal::ZERO);
            updated.insert(month, current.checked_add(usd).ok_or_else(amount_overflow)?);
        }

        Ok((total, updated))
    }

    /// Combine two partial states, `self` covering the earlier inputs.
    ///
    /// Associative. Monthly sums and counters commute; address totals keep
    /// the left-hand entry on conflict, so order matters there.
    pub fn merge(mut self, other: AggregationState) -> Self {
        for entry in other.address_totals.entries {
            self.address_totals.record_first(entry);
        }

        for (month, chains) in other.monthly {
            let slot = self.monthly.entry(month).or_default();
            for (chain, usd) in chains {
                let sum = slot.entry(chain).or_insert(Decimal::ZERO);
                *sum = sum.saturating_add(usd);
            }
        }

        self.enriched_pairs += other.enriched_pairs;
        self.failed_pairs += other.failed_pairs;
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // 2021-02-01T00:00:00Z and 2021-02-20T00:00:00Z
    const FEB_1: i64 = 1_612_137_600_000;
    const FEB_20: i64 = 1_613_779_200_000;
    // 2021-03-05T00:00:00Z
    const MAR_5: i64 = 1_614_902_400_000;

    fn create_test_outcome(address: &str, chain: &str, items: Vec<(i64, i64)>) -> FetchOutcome {
        FetchOutcome {
            key: AddressChainKey::new(address, chain),
            result: Ok(items
                .into_iter()
                .map(|(ts, amount)| TransactionItem::new(ts, Decimal::from(amount)))
                .collect()),
        }
    }

    fn create_failed_outcome(address: &str, chain: &str) -> FetchOutcome {
        FetchOutcome {
            key: AddressChainKey::new(address, chain),
            result: Err(EnrichmentFailure::HttpStatus(500)),
        }
    }

    #[test]
    fn test_bucket_month_is_utc() {
        assert_eq!(bucket_month(FEB_1).as_deref(), Some("2021-02"));
        // One millisecond before Feb 1 UTC is still January
        assert_eq!(bucket_month(FEB_1 - 1).as_deref(), Some("2021-01"));
        assert_eq!(bucket_month(i64::MAX), None);
    }

    #[test]
    fn test_btc_items_sum_in_shared_month() {
        let key = AddressChainKey::new("bc1qaaa", "BTC");
        let items = vec![
            TransactionItem::new(FEB_1, Decimal::from(1)),
            TransactionItem::new(FEB_20, Decimal::from(2)),
        ];

        let buckets = aggregate_address(&key, &items, &RateTable::default()).unwrap();

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets["2021-02"], Decimal::from(204_000));
    }

    #[test]
    fn test_first_seen_does_not_affect_bucket() {
        let key = AddressChainKey::new("bc1qaaa", "BTC");
        let mut item = TransactionItem::new(MAR_5, Decimal::from(1));
        item.first_seen_epoch_millis = Some(FEB_1);

        let buckets = aggregate_address(&key, &[item], &RateTable::default()).unwrap();

        assert_eq!(buckets.keys().collect::<Vec<_>>(), vec!["2021-03"]);
    }

    #[test]
    fn test_unknown_chain_contributes_zero() {
        let key = AddressChainKey::new("0xabc", "ETH");
        let items = vec![TransactionItem::new(FEB_1, Decimal::from(10))];

        let buckets = aggregate_address(&key, &items, &RateTable::default()).unwrap();

        assert_eq!(buckets["2021-02"], Decimal::ZERO);
    }

    #[test]
    fn test_fold_records_totals_and_monthly() {
        let rates = RateTable::default();
        let mut diagnostics = Diagnostics::new();

        let state = AggregationState::new()
            .apply(
                &create_test_outcome("bc1qaaa", "BTC", vec![(FEB_1, 1), (MAR_5, 1)]),
                &rates,
                &mut diagnostics,
            )
            .apply(
                &create_test_outcome("TXbbb", "USDT", vec![(FEB_20, 500)]),
                &rates,
                &mut diagnostics,
            );

        assert_eq!(state.enriched_pairs, 2);
        assert_eq!(state.address_totals.len(), 2);
        assert_eq!(
            state.address_totals.get("bc1qaaa").unwrap().total_usd,
            Decimal::from(136_000)
        );
        assert_eq!(state.monthly["2021-02"]["BTC"], Decimal::from(68_000));
        assert_eq!(state.monthly["2021-02"]["USDT"], Decimal::from(500));
        assert_eq!(state.monthly["2021-03"]["BTC"], Decimal::from(68_000));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_first_write_wins_for_address_total() {
        let rates = RateTable::default();
        let mut diagnostics = Diagnostics::new();

        let state = AggregationState::new()
            .apply(
                &create_test_outcome("shared", "USDT", vec![(FEB_1, 10)]),
                &rates,
                &mut diagnostics,
            )
            .apply(
                &create_test_outcome("shared", "BTC", vec![(FEB_1, 1)]),
                &rates,
                &mut diagnostics,
            );

        let total = state.address_totals.get("shared").unwrap();
        assert_eq!(total.total_usd, Decimal::from(10));
        assert_eq!(total.chain, "USDT");

        // The second chain still lands in the monthly aggregate
        assert_eq!(state.monthly["2021-02"]["BTC"], Decimal::from(68_000));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.events()[0].kind(), "address_chain_conflict");
    }

    #[test]
    fn test_failed_pair_is_excluded() {
        let rates = RateTable::default();
        let mut diagnostics = Diagnostics::new();

        let state = AggregationState::new().apply(
            &create_failed_outcome("bc1qdead", "BTC"),
            &rates,
            &mut diagnostics,
        );

        assert_eq!(state.failed_pairs, 1);
        assert!(state.address_totals.is_empty());
        assert!(state.monthly.is_empty());
        assert_eq!(diagnostics.enrichment_failures(), 1);
    }

    #[test]
    fn test_failed_pair_does_not_claim_address() {
        let rates = RateTable::default();
        let mut diagnostics = Diagnostics::new();

        let state = AggregationState::new()
            .apply(&create_failed_outcome("addr", "BTC"), &rates, &mut diagnostics)
            .apply(
                &create_test_outcome("addr", "USDT", vec![(FEB_1, 7)]),
                &rates,
                &mut diagnostics,
            );

        assert_eq!(state.address_totals.get("addr").unwrap().chain, "USDT");
    }

    #[test]
    fn test_out_of_range_timestamp_fails_pair() {
        let rates = RateTable::default();
        let mut diagnostics = Diagnostics::new();

        let state = AggregationState::new().apply(
            &create_test_outcome("bc1q", "BTC", vec![(i64::MAX, 1)]),
            &rates,
            &mut diagnostics,
        );

        assert_eq!(state.failed_pairs, 1);
        assert!(state.monthly.is_empty());
    }

    #[test]
    fn test_overflowing_amount_fails_pair() {
        let rates = RateTable::default();
        let mut diagnostics = Diagnostics::new();
        let huge = FetchOutcome {
            key: AddressChainKey::new("bc1qhuge", "BTC"),
            result: Ok(vec![TransactionItem::new(FEB_1, Decimal::MAX)]),
        };

        let state = AggregationState::new()
            .apply(&huge, &rates, &mut diagnostics)
            .apply(
                &create_test_outcome("bc1qaaa", "BTC", vec![(FEB_1, 1)]),
                &rates,
                &mut diagnostics,
            );

        assert_eq!(state.failed_pairs, 1);
        assert_eq!(state.enriched_pairs, 1);
        assert!(!state.address_totals.contains("bc1qhuge"));
        assert_eq!(state.monthly["2021-02"]["BTC"], Decimal::from(68_000));
        match &diagnostics.events()[0] {
            Diagnostic::EnrichmentFailed { failure, .. } => assert_eq!(
                failure,
                &EnrichmentFailure::Malformed("amount overflow".to_string())
            ),
            other => panic!("unexpected diagnostic: {:?}", other),
        }
    }

    #[test]
    fn test_monthly_overflow_leaves_state_unchanged() {
        let rates = RateTable::default();
        let mut diagnostics = Diagnostics::new();
        let create_max_outcome = |address: &str| FetchOutcome {
            key: AddressChainKey::new(address, "USDT"),
            result: Ok(vec![TransactionItem::new(FEB_1, Decimal::MAX)]),
        };

        let state = AggregationState::new()
            .apply(&create_max_outcome("TXone"), &rates, &mut diagnostics)
            .apply(&create_max_outcome("TXtwo"), &rates, &mut diagnostics);

        assert_eq!(state.enriched_pairs, 1);
        assert_eq!(state.failed_pairs, 1);
        assert_eq!(state.monthly["2021-02"]["USDT"], Decimal::MAX);
        assert!(!state.address_totals.contains("TXtwo"));
    }

    #[test]
    fn test_merge_matches_sequential_fold() {
        let rates = RateTable::default();
        let outcomes = vec![
            create_test_outcome("a", "BTC", vec![(FEB_1, 1)]),
            create_test_outcome("b", "USDT", vec![(FEB_20, 3), (MAR_5, 4)]),
            create_failed_outcome("c", "BTC"),
            create_test_outcome("a", "USDT", vec![(MAR_5, 9)]),
        ];

        let mut diagnostics = Diagnostics::new();
        let sequential = outcomes
            .iter()
            .fold(AggregationState::new(), |s, o| s.apply(o, &rates, &mut diagnostics));

        let (left, right) = outcomes.split_at(2);
        let mut scratch = Diagnostics::new();
        let left = left
            .iter()
            .fold(AggregationState::new(), |s, o| s.apply(o, &rates, &mut scratch));
        let right = right
            .iter()
            .fold(AggregationState::new(), |s, o| s.apply(o, &rates, &mut scratch));

        assert_eq!(left.merge(right), sequential);
    }

    #[test]
    fn test_reapplying_same_outcomes_is_deterministic() {
        let rates = RateTable::default();
        let outcomes = vec![
            create_test_outcome("a", "BTC", vec![(FEB_1, 1)]),
            create_test_outcome("b", "USDT", vec![(FEB_20, 3)]),
        ];

        let run = || {
            let mut diagnostics = Diagnostics::new();
            outcomes
                .iter()
                .fold(AggregationState::new(), |s, o| s.apply(o, &rates, &mut diagnostics))
        };

        assert_eq!(run(), run());
    }
}
