// ⚙️ Pipeline Configuration
// Precedence (low → high): defaults, TOML file, environment, CLI flags

use crate::currency::RateTable;
use crate::explorer::DEFAULT_ENDPOINT;
use crate::report::{ReportSettings, DEFAULT_FAMILY_MIN_COUNT, DEFAULT_TOP_N};
use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const API_KEY_ENV: &str = "OKLINK_API_KEY";
pub const ENDPOINT_ENV: &str = "RANSOM_LEDGER_ENDPOINT";

pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Explorer address-summary endpoint
    pub endpoint: String,

    /// Explorer credential; only required for live runs
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Chain code → USD rate
    pub rates: RateTable,

    /// Families seen fewer times than this go to "others"
    pub family_min_count: usize,

    /// Length of the top-addresses table
    pub top_n: usize,

    /// Concurrent explorer requests
    pub workers: usize,

    /// Per-request timeout; unset keeps the transport default
    pub request_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            rates: RateTable::default(),
            family_min_count: DEFAULT_FAMILY_MIN_COUNT,
            top_n: DEFAULT_TOP_N,
            workers: DEFAULT_WORKERS,
            request_timeout_secs: None,
        }
    }
}

impl PipelineConfig {
    /// Read a TOML config file; keys it omits keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        toml::from_str(&content).context("Failed to parse config TOML")
    }

    /// Defaults, then the optional file, then environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Some(key) = env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(endpoint) = env::var(ENDPOINT_ENV).ok().filter(|e| !e.trim().is_empty()) {
            self.endpoint = endpoint;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.top_n == 0 {
            bail!("top_n must be at least 1");
        }
        for (code, rate) in self.rates.iter() {
            if rate < Decimal::ZERO {
                bail!("rate for {} is negative: {}", code, rate);
            }
        }
        Ok(())
    }

    /// API key for live runs; missing key is a configuration error
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .with_context(|| {
                format!(
                    "no explorer API key: set {} or api_key in the config file",
                    API_KEY_ENV
                )
            })
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn report_settings(&self) -> ReportSettings {
        ReportSettings {
            family_min_count: self.family_min_count,
            top_n: self.top_n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();

        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.family_min_count, 6);
        assert_eq!(config.top_n, 20);
        assert_eq!(config.rates.rate("BTC"), Decimal::from(68_000));
        assert_eq!(config.request_timeout(), None);
        assert!(config.require_api_key().is_err());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "workers = 8\n\
             request_timeout_secs = 15\n\
             api_key = \"k-123\"\n\n\
             [rates]\n\
             BTC = 60000\n\
             ETH = 3000\n"
        )
        .unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();

        assert_eq!(config.workers, 8);
        assert_eq!(config.top_n, 20);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.require_api_key().unwrap(), "k-123");
        assert_eq!(config.rates.rate("eth"), Decimal::from(3000));
        // A [rates] table replaces the default table
        assert_eq!(config.rates.rate("USDT"), Decimal::ZERO);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = PipelineConfig::default();
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.rates.insert("BTC", Decimal::from(-1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unparsable_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "workers = \"many\"").unwrap();

        assert!(PipelineConfig::from_file(file.path()).is_err());
    }
}
