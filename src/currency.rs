// 💱 Currency Converter - static USD rate table

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Code → USD multiplier. Codes are stored uppercase; lookups ignore case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Decimal>", into = "BTreeMap<String, Decimal>")]
pub struct RateTable {
    rates: BTreeMap<String, Decimal>,
}

impl RateTable {
    pub fn new() -> Self {
        RateTable {
            rates: BTreeMap::new(),
        }
    }

    pub fn with_rate(mut self, code: &str, rate: Decimal) -> Self {
        self.insert(code, rate);
        self
    }

    pub fn insert(&mut self, code: &str, rate: Decimal) {
        self.rates.insert(code.to_uppercase(), rate);
    }

    /// Unknown codes have rate 0
    pub fn rate(&self, code: &str) -> Decimal {
        self.rates
            .get(&code.to_uppercase())
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Convert a native amount to USD; `None` if the product overflows.
    pub fn to_usd(&self, amount_native: Decimal, currency_code: &str) -> Option<Decimal> {
        amount_native.checked_mul(self.rate(currency_code))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> + '_ {
        self.rates.iter().map(|(code, rate)| (code.as_str(), *rate))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl Default for RateTable {
    fn default() -> Self {
        RateTable::new()
            .with_rate("BTC", Decimal::from(68_000))
            .with_rate("USDT", Decimal::ONE)
    }
}

impl From<BTreeMap<String, Decimal>> for RateTable {
    fn from(map: BTreeMap<String, Decimal>) -> Self {
        let mut table = RateTable::new();
        for (code, rate) in map {
            table.insert(&code, rate);
        }
        table
    }
}

impl From<RateTable> for BTreeMap<String, Decimal> {
    fn from(table: RateTable) -> Self {
        table.rates
    }
}
