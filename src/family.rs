// 🏷️ Family Classifier - Rules as Data
// Raw ransom-note suffixes → canonical ransomware family names

use crate::diagnostics::{Diagnostic, Diagnostics};
use anyhow::{Context as AnyhowContext, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Bucket for suffixes the mapping does not know
pub const UNKNOWN_FAMILY: &str = "unknown";

// ============================================================================
// FAMILY LABEL
// ============================================================================

/// Result of classifying one suffix. Classification is total: every input
/// lands in exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FamilyLabel {
    Known(String),
    Unmapped,
}

impl FamilyLabel {
    /// Canonical name used in reports
    pub fn name(&self) -> &str {
        match self {
            FamilyLabel::Known(name) => name,
            FamilyLabel::Unmapped => UNKNOWN_FAMILY,
        }
    }

    pub fn is_unmapped(&self) -> bool {
        matches!(self, FamilyLabel::Unmapped)
    }
}

impl fmt::Display for FamilyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// FAMILY MAPPING
// ============================================================================

/// Flat raw-suffix → canonical-name table, read once per run.
#[derive(Debug, Clone, Default)]
pub struct FamilyMapping {
    entries: HashMap<String, String>,
}

impl FamilyMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load mapping from a flat JSON object file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read family mapping: {:?}", path.as_ref()))?;

        let entries: HashMap<String, String> = serde_json::from_str(&content)
            .context("Failed to parse family mapping JSON")?;

        Ok(FamilyMapping { entries })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        FamilyMapping {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Exact-string lookup; a miss yields `Unmapped` and one diagnostic.
    pub fn classify(&self, raw_suffix: &str, diagnostics: &mut Diagnostics) -> FamilyLabel {
        match self.entries.get(raw_suffix) {
            Some(name) => FamilyLabel::Known(name.clone()),
            None => {
                diagnostics.emit(Diagnostic::UnmappedFamily {
                    suffix: raw_suffix.to_string(),
                });
                FamilyLabel::Unmapped
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
