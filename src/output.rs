// 📤 Report Writer - CSV tables + run manifest
// Any write failure is fatal for the run and names the file that failed.

use crate::diagnostics::Diagnostic;
use crate::error::PipelineError;
use crate::parser::SourceFile;
use crate::report::Reports;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const FAMILY_REPORT: &str = "ransomware_family_statistics.csv";
pub const EMAIL_REPORT: &str = "hacker_email_statistics.csv";
pub const CHAIN_REPORT: &str = "address_counts_by_currency.csv";
pub const TOP_REPORT: &str = "top_20_addresses.csv";
pub const MONTHLY_REPORT: &str = "monthly_totals.csv";
pub const MONTHLY_CHAIN_REPORT: &str = "monthly_totals_by_chain.csv";
pub const DIAGNOSTICS_REPORT: &str = "diagnostics.csv";
pub const MANIFEST: &str = "run_manifest.json";

// ============================================================================
// RUN MANIFEST
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: String,
    pub inputs: Vec<SourceFile>,
    pub rows: usize,
    pub rows_dropped: usize,
    pub unique_pairs: usize,
    pub enriched_pairs: usize,
    pub failed_pairs: usize,
    pub unmapped_families: usize,
    /// True when at least one pair could not be enriched
    pub partial: bool,
}

#[derive(Debug, Serialize)]
struct DiagnosticRow<'a> {
    kind: &'a str,
    subject: &'a str,
    detail: String,
}

// ============================================================================
// WRITERS
// ============================================================================

/// Header is written up front so an empty table still carries its columns.
fn write_csv<T: Serialize>(
    path: &Path,
    header: &[&str],
    rows: &[T],
) -> Result<(), PipelineError> {
    let result = (|| -> anyhow::Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .context("Failed to create file")?;
        writer.write_record(header).context("Failed to write header")?;
        for row in rows {
            writer.serialize(row).context("Failed to serialize row")?;
        }
        writer.flush().context("Failed to flush")?;
        Ok(())
    })();

    result.map_err(|source| PipelineError::Output {
        path: path.to_path_buf(),
        source,
    })
}

fn write_table<T: Serialize>(
    dir: &Path,
    name: &str,
    header: &[&str],
    rows: &[T],
    written: &mut Vec<PathBuf>,
) -> Result<(), PipelineError> {
    let path = dir.join(name);
    write_csv(&path, header, rows)?;
    written.push(path);
    Ok(())
}

/// Write the report tables and the diagnostics log into `dir`.
/// Returns the paths written, in order.
pub fn write_reports(
    dir: &Path,
    reports: &Reports,
    diagnostics: &[Diagnostic],
) -> Result<Vec<PathBuf>, PipelineError> {
    fs::create_dir_all(dir).map_err(|e| PipelineError::Output {
        path: dir.to_path_buf(),
        source: e.into(),
    })?;

    let mut written = Vec::new();
    write_table(
        dir,
        FAMILY_REPORT,
        &["family", "count"],
        &reports.family_histogram,
        &mut written,
    )?;
    write_table(
        dir,
        EMAIL_REPORT,
        &["email_count"],
        std::slice::from_ref(&reports.email_count),
        &mut written,
    )?;
    write_table(
        dir,
        CHAIN_REPORT,
        &["chain", "address_count"],
        &reports.chain_counts,
        &mut written,
    )?;
    write_table(
        dir,
        TOP_REPORT,
        &["address", "inflow_usd"],
        &reports.top_addresses,
        &mut written,
    )?;
    write_table(
        dir,
        MONTHLY_REPORT,
        &["month", "receive_usd"],
        &reports.monthly_totals,
        &mut written,
    )?;
    write_table(
        dir,
        MONTHLY_CHAIN_REPORT,
        &["month", "chain", "receive_usd"],
        &reports.monthly_chain_totals,
        &mut written,
    )?;

    let rows: Vec<DiagnosticRow> = diagnostics
        .iter()
        .map(|d| DiagnosticRow {
            kind: d.kind(),
            subject: d.subject(),
            detail: d.detail(),
        })
        .collect();
    write_table(
        dir,
        DIAGNOSTICS_REPORT,
        &["kind", "subject", "detail"],
        &rows,
        &mut written,
    )?;

    Ok(written)
}

pub fn write_manifest(dir: &Path, manifest: &RunManifest) -> Result<PathBuf, PipelineError> {
    let path = dir.join(MANIFEST);
    let result = serde_json::to_string_pretty(manifest)
        .context("Failed to encode manifest")
        .and_then(|json| fs::write(&path, json).context("Failed to write file"));

    result.map_err(|source| PipelineError::Output {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
