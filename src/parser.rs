// 🏗️ Input Loader - sheet exports → typed rows
// One CSV file per exported sheet; rows without address or chain are dropped here

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ============================================================================
// CORE TYPES
// ============================================================================

/// RawRow - one well-formed incident record
///
/// Address and chain are guaranteed non-empty. Suffix and email are optional,
/// exactly as they arrive from the sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub address: String,
    pub chain: String,
    pub family_suffix: Option<String>,
    pub email: Option<String>,

    // Provenance
    pub source_file: String,
    pub line_number: usize,
}

impl RawRow {
    pub fn new(address: &str, chain: &str) -> Self {
        RawRow {
            address: address.to_string(),
            chain: chain.to_string(),
            family_suffix: None,
            email: None,
            source_file: String::new(),
            line_number: 0,
        }
    }

    /// Builder pattern: add raw family suffix
    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.family_suffix = Some(suffix.to_string());
        self
    }

    /// Builder pattern: add contact email
    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
}

/// Row shape as exported from the workbook.
///
/// Headers are accepted in the source workbook's Chinese names or in English.
#[derive(Debug, Deserialize)]
struct SheetRow {
    #[serde(default, rename = "黑客币址", alias = "address")]
    address: Option<String>,

    #[serde(default, rename = "币类型（单位）", alias = "chain")]
    chain: Option<String>,

    #[serde(default, rename = "后缀名称", alias = "family_suffix", alias = "suffix")]
    family_suffix: Option<String>,

    #[serde(default, rename = "黑客联系邮箱", alias = "email")]
    email: Option<String>,
}

/// Per-file provenance, kept for the run manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub sha256: String,
    pub rows_read: usize,
    pub rows_kept: usize,
}

#[derive(Debug, Default)]
pub struct LoadedInput {
    pub rows: Vec<RawRow>,
    pub files: Vec<SourceFile>,
}

impl LoadedInput {
    pub fn rows_dropped(&self) -> usize {
        self.files.iter().map(|f| f.rows_read - f.rows_kept).sum()
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Treat blank cells the same as missing ones
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse one exported sheet.
pub fn load_rows(file_path: &Path) -> Result<(Vec<RawRow>, SourceFile)> {
    let bytes = fs::read(file_path)
        .with_context(|| format!("Failed to open file: {}", file_path.display()))?;

    let sha256 = format!("{:x}", Sha256::digest(&bytes));

    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.csv")
        .to_string();

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let mut rows = Vec::new();
    let mut rows_read = 0;

    for (line_num, result) in reader.deserialize::<SheetRow>().enumerate() {
        rows_read += 1;
        let record = match result {
            Ok(record) => record,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                return Err(e).with_context(|| {
                    format!("Failed to read {} at line {}", filename, line_num + 2)
                });
            }
            Err(e) => {
                warn!(
                    file = %filename,
                    line = line_num + 2,
                    error = %e,
                    "unparsable row dropped"
                );
                continue;
            }
        };

        let (address, chain) = match (non_blank(record.address), non_blank(record.chain)) {
            (Some(a), Some(c)) => (a, c),
            _ => {
                debug!(
                    file = %filename,
                    line = line_num + 2,
                    "row without address or chain dropped"
                );
                continue;
            }
        };

        rows.push(RawRow {
            address,
            chain,
            family_suffix: record.family_suffix,
            email: non_blank(record.email),
            source_file: filename.clone(),
            line_number: line_num + 2, // +2 because: 1-indexed + header row
        });
    }

    let source = SourceFile {
        path: file_path.to_path_buf(),
        sha256,
        rows_read,
        rows_kept: rows.len(),
    };

    Ok((rows, source))
}

/// Load every `*.csv` in a directory, in file-name order.
pub fn load_directory(dir: &Path) -> Result<LoadedInput> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read input directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut input = LoadedInput::default();
    for path in &paths {
        let (rows, source) = load_rows(path)?;
        info!(
            file = %path.display(),
            kept = source.rows_kept,
            read = source.rows_read,
            "loaded sheet"
        );
        input.rows.extend(rows);
        input.files.push(source);
    }

    Ok(input)
}

// ============================================================================
// TESTS
// ============================================================================
