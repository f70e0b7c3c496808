// 🚨 Error Taxonomy
// Fatal run errors vs. per-pair enrichment failures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// FATAL ERRORS
// ============================================================================

/// Errors that abort a run.
///
/// `Configuration` and `Input` abort before any aggregation happens,
/// `Output` aborts after computation when a report cannot be persisted.
/// The binary maps each to its own exit code so operators can tell
/// "no output produced" apart from a partial-data run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0:#}")]
    Configuration(anyhow::Error),

    #[error("input error: {0:#}")]
    Input(anyhow::Error),

    #[error("failed to write {}: {source:#}", .path.display())]
    Output {
        path: PathBuf,
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Configuration(_) | PipelineError::Input(_) => 2,
            PipelineError::Output { .. } => 3,
        }
    }
}

// ============================================================================
// PER-PAIR FAILURES
// ============================================================================

/// Why one (address, chain) pair could not be enriched.
///
/// Never fatal: the pair is skipped for aggregation and the run goes on.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EnrichmentFailure {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("explorer returned HTTP {0}")]
    HttpStatus(u16),

    #[error("explorer returned code {code}: {message}")]
    Api { code: String, message: String },

    #[error("response has no `data` field")]
    MissingData,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("pair not present in snapshot")]
    NotInSnapshot,
}
