// 🔄 Pipeline - rows → classified/deduplicated → fetched → folded → reports
//
// Fatal errors: mapping/config problems before any fetch, write problems
// after computation. Everything per-pair is a diagnostic.

use crate::aggregation::AggregationState;
use crate::config::PipelineConfig;
use crate::deduplication::{dedupe, Deduplicated};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::PipelineError;
use crate::explorer::SummarySource;
use crate::family::{FamilyLabel, FamilyMapping};
use crate::fetch_pool::{fetch_all, FetchOutcome};
use crate::output::{write_manifest, write_reports, RunManifest};
use crate::parser::{load_directory, LoadedInput, RawRow};
use crate::report::Reports;
use crate::snapshot::FetchSnapshot;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::info;

// ============================================================================
// STAGES
// ============================================================================

/// Classified, deduplicated input ready for enrichment
#[derive(Debug)]
pub struct PreparedInput {
    pub input: LoadedInput,
    pub families: Vec<FamilyLabel>,
    pub deduped: Deduplicated,
}

/// Classify every row's suffix. Rows without a suffix classify as "".
pub fn classify_rows(
    rows: &[RawRow],
    mapping: &FamilyMapping,
    diagnostics: &mut Diagnostics,
) -> Vec<FamilyLabel> {
    rows.iter()
        .map(|row| mapping.classify(row.family_suffix.as_deref().unwrap_or(""), diagnostics))
        .collect()
}

/// Load the mapping and the input sheets, then classify and dedupe.
pub fn prepare(
    input_dir: &Path,
    mapping_path: &Path,
    diagnostics: &mut Diagnostics,
) -> Result<PreparedInput, PipelineError> {
    let mapping = FamilyMapping::from_file(mapping_path).map_err(PipelineError::Configuration)?;
    info!(entries = mapping.len(), "family mapping loaded");

    let input = load_directory(input_dir).map_err(PipelineError::Input)?;

    let families = classify_rows(&input.rows, &mapping, diagnostics);
    let deduped = dedupe(&input.rows);
    info!(
        rows = input.rows.len(),
        unique_pairs = deduped.keys.len(),
        emails = deduped.email_count(),
        "input prepared"
    );

    Ok(PreparedInput {
        input,
        families,
        deduped,
    })
}

/// Fetch every unique pair and fold the outcomes, in input order.
pub fn enrich(
    deduped: &Deduplicated,
    source: &dyn SummarySource,
    config: &PipelineConfig,
    diagnostics: &mut Diagnostics,
) -> (AggregationState, Vec<FetchOutcome>) {
    let mut state = AggregationState::new();
    let mut outcomes = Vec::with_capacity(deduped.keys.len());

    fetch_all(&deduped.keys, source, config.workers, |outcome| {
        state = std::mem::take(&mut state).apply(&outcome, &config.rates, diagnostics);
        outcomes.push(outcome);
    });

    (state, outcomes)
}

// ============================================================================
// FULL RUN
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Live,
    Replay,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Live => "live",
            RunMode::Replay => "replay",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input_dir: PathBuf,
    pub mapping_path: PathBuf,
    pub output_dir: PathBuf,
    pub mode: RunMode,
    /// Where to record fetched outcomes (live runs)
    pub snapshot_out: Option<PathBuf>,
    /// Label stored in the snapshot
    pub endpoint: String,
}

#[derive(Debug)]
pub struct PipelineRun {
    pub reports: Reports,
    pub manifest: RunManifest,
    pub diagnostics: Vec<Diagnostic>,
    pub written: Vec<PathBuf>,
}

impl PipelineRun {
    /// Some pairs could not be enriched
    pub fn is_partial(&self) -> bool {
        self.manifest.partial
    }
}

/// Run every stage and write the reports.
pub fn run(
    request: &RunRequest,
    source: &dyn SummarySource,
    config: &PipelineConfig,
) -> Result<PipelineRun, PipelineError> {
    let started_at = Utc::now();
    let run_id = uuid::Uuid::new_v4().to_string();
    info!(run_id = %run_id, mode = request.mode.as_str(), "run started");

    let mut diagnostics = Diagnostics::new();
    let prepared = prepare(&request.input_dir, &request.mapping_path, &mut diagnostics)?;

    let (state, outcomes) = enrich(&prepared.deduped, source, config, &mut diagnostics);

    let reports = Reports::build(
        &prepared.families,
        &prepared.deduped,
        &state,
        &config.report_settings(),
    );
    info!(summary = %reports.summary(), "reports built");

    let mut written = write_reports(&request.output_dir, &reports, diagnostics.events())?;

    if let Some(path) = &request.snapshot_out {
        FetchSnapshot::new(&request.endpoint, outcomes)
            .save(path)
            .map_err(|source| PipelineError::Output {
                path: path.clone(),
                source,
            })?;
        written.push(path.clone());
    }

    let manifest = RunManifest {
        run_id,
        started_at,
        finished_at: Utc::now(),
        mode: request.mode.as_str().to_string(),
        rows: prepared.input.rows.len(),
        rows_dropped: prepared.input.rows_dropped(),
        unique_pairs: prepared.deduped.keys.len(),
        enriched_pairs: state.enriched_pairs,
        failed_pairs: state.failed_pairs,
        unmapped_families: prepared.families.iter().filter(|f| f.is_unmapped()).count(),
        partial: state.failed_pairs > 0,
        inputs: prepared.input.files,
    };
    written.push(write_manifest(&request.output_dir, &manifest)?);

    info!(
        run_id = %manifest.run_id,
        enriched = manifest.enriched_pairs,
        failed = manifest.failed_pairs,
        partial = manifest.partial,
        "run finished"
    );

    Ok(PipelineRun {
        reports,
        manifest,
        diagnostics: diagnostics.events().to_vec(),
        written,
    })
}

// ============================================================================
// TESTS
// ============================================================================
