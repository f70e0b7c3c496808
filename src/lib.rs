// Ransom Ledger - Core Library
// Ransomware address inflow aggregation: CLI and tests build on these modules

pub mod aggregation;
pub mod config;
pub mod currency;
pub mod deduplication;
pub mod diagnostics;
pub mod error;
pub mod explorer;
pub mod family;
pub mod fetch_pool;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod snapshot;

// Re-export commonly used types
pub use aggregation::{
    aggregate_address, bucket_month, AddressIncoming, AddressTotals, AggregationState,
    MonthlyChainAggregate, MonthlyReceiveBucket,
};
pub use config::PipelineConfig;
pub use currency::RateTable;
pub use deduplication::{dedupe, AddressChainKey, Deduplicated};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{EnrichmentFailure, PipelineError};
pub use explorer::{ExplorerClient, FetchResult, SummarySource, TransactionItem};
pub use family::{FamilyLabel, FamilyMapping, UNKNOWN_FAMILY};
pub use fetch_pool::{fetch_all, FetchOutcome};
pub use output::RunManifest;
pub use parser::{load_directory, load_rows, RawRow};
pub use pipeline::{run, PipelineRun, RunMode, RunRequest};
pub use report::{ReportSettings, Reports, OTHERS_FAMILY};
pub use snapshot::{FetchSnapshot, SnapshotSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
