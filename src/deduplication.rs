// 🔍 Deduplication - collapse repeated (address, chain) pairs and emails
// Pairs are compared by exact value; the first encounter fixes the order.

use crate::parser::RawRow;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

// ============================================================================
// ADDRESS/CHAIN KEY
// ============================================================================

/// Identity of one unit of work for the explorer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressChainKey {
    pub address: String,
    pub chain: String,
}

impl AddressChainKey {
    pub fn new(address: &str, chain: &str) -> Self {
        AddressChainKey {
            address: address.to_string(),
            chain: chain.to_string(),
        }
    }
}

impl fmt::Display for AddressChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.address, self.chain)
    }
}

// ============================================================================
// DEDUPLICATED OUTPUT
// ============================================================================

/// Unique pairs in first-encounter order, plus the unique contact emails.
#[derive(Debug, Default, Clone)]
pub struct Deduplicated {
    pub keys: Vec<AddressChainKey>,
    pub emails: BTreeSet<String>,
}

impl Deduplicated {
    pub fn email_count(&self) -> usize {
        self.emails.len()
    }
}

/// Collapse rows into unique (address, chain) keys and unique non-empty emails.
pub fn dedupe(rows: &[RawRow]) -> Deduplicated {
    let mut seen: HashSet<(&str, &str)> = HashSet::with_capacity(rows.len());
    let mut out = Deduplicated::default();

    for row in rows {
        if seen.insert((row.address.as_str(), row.chain.as_str())) {
            out.keys.push(AddressChainKey::new(&row.address, &row.chain));
        }

        if let Some(email) = row.email.as_deref() {
            if !email.trim().is_empty() {
                out.emails.insert(email.to_string());
            }
        }
    }

    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_rows() -> Vec<RawRow> {
        vec![
            RawRow::new("bc1qaaa", "BTC").with_email("one@evil.io"),
            RawRow::new("TXbbb", "USDT"),
            RawRow::new("bc1qaaa", "BTC").with_email("one@evil.io"),
            RawRow::new("bc1qaaa", "USDT").with_email("two@evil.io"),
            RawRow::new("bc1qaaa", "btc").with_email(""),
        ]
    }

    #[test]
    fn test_pairs_are_unique_and_keep_first_order() {
        let rows = create_test_rows();
        let deduped = dedupe(&rows);

        assert_eq!(
            deduped.keys,
            vec![
                AddressChainKey::new("bc1qaaa", "BTC"),
                AddressChainKey::new("TXbbb", "USDT"),
                AddressChainKey::new("bc1qaaa", "USDT"),
                AddressChainKey::new("bc1qaaa", "btc"),
            ]
        );
        assert!(deduped.keys.len() <= rows.len());

        let unique: HashSet<_> = deduped.keys.iter().collect();
        assert_eq!(unique.len(), deduped.keys.len());
    }

    #[test]
    fn test_emails_unique_and_non_empty() {
        let deduped = dedupe(&create_test_rows());

        assert_eq!(deduped.email_count(), 2);
        assert!(deduped.emails.contains("one@evil.io"));
        assert!(!deduped.emails.contains(""));
    }

    #[test]
    fn test_empty_input() {
        let deduped = dedupe(&[]);
        assert!(deduped.keys.is_empty());
        assert_eq!(deduped.email_count(), 0);
    }
}
