//! The analysis report and its assembly.
//!
//! [`AnalysisReport`] is the terminal artifact of a run: immutable once
//! built, shared as `Arc<AnalysisReport>`, and serialized to JSON with
//! stable snake_case field names. [`AnalysisReportBuilder`] assembles it and
//! keeps its compact JSON encoding within `max_report_bytes`.
//!
//! # Example
//!
//! ```rust,ignore
//! let report = analyzer.analyze(&df)?;
//! println!("{}", report.to_json_pretty()?);
//!
//! // Or write next to other outputs
//! write_report(&report, Path::new("output"), "transactions")?;
//! ```

mod builder;
mod context;

pub use builder::{AnalysisReportBuilder, ReportParts};
pub use context::{ContextKind, ContextRenderer};

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analysis::DataQualitySummary;
use crate::error::Result;
use crate::types::{
    ColumnProfile, CorrelationMatrix, CorrelationPair, DomainMetrics, OutlierReport,
    QuantileMethod, SampleSet,
};

// ============================================================================
// Report Sections
// ============================================================================

/// How the table was traversed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingSummary {
    /// `in_memory` for a single whole-table pass, `chunked` otherwise.
    pub mode: String,
    pub chunk_size: usize,
    pub chunk_count: usize,
    pub quantile_method: QuantileMethod,
    pub parallel: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CorrelationSection {
    /// The full matrix plus the pairs above the strong threshold.
    Matrix {
        matrix: CorrelationMatrix,
        strong_pairs: Vec<CorrelationPair>,
    },
    /// Only the highest-magnitude pairs, for wide tables or tight budgets.
    TopPairs {
        numeric_columns: usize,
        pairs: Vec<CorrelationPair>,
    },
}

impl CorrelationSection {
    pub fn pairs(&self) -> &[CorrelationPair] {
        match self {
            Self::Matrix { strong_pairs, .. } => strong_pairs,
            Self::TopPairs { pairs, .. } => pairs,
        }
    }
}

/// Sampled row indices with the cell text of those rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSection {
    #[serde(flatten)]
    pub set: SampleSet,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub rows: Vec<Vec<Option<String>>>,
}

/// Which sections were reduced to fit the size budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationFlags {
    pub categorical_top_k: bool,
    pub sample: bool,
    pub correlation: bool,
    pub outliers: bool,
    pub temporal_buckets: bool,
    pub columns: bool,
    pub warnings: bool,
    pub domain_metrics: bool,
}

impl TruncationFlags {
    pub fn any(&self) -> bool {
        self.categorical_top_k
            || self.sample
            || self.correlation
            || self.outliers
            || self.temporal_buckets
            || self.columns
            || self.warnings
            || self.domain_metrics
    }
}

// ============================================================================
// Analysis Report
// ============================================================================

/// Bounded statistical digest of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub row_count: usize,
    pub column_count: usize,
    pub chunking: ChunkingSummary,
    pub columns: Vec<ColumnProfile>,
    pub data_quality: DataQualitySummary,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub correlation: Option<CorrelationSection>,
    pub outliers: OutlierReport,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub domain_metrics: Option<DomainMetrics>,
    pub sample: SampleSection,
    pub warnings: Vec<String>,
    pub truncated: TruncationFlags,
    /// Length in bytes of this report's compact JSON encoding.
    pub byte_size: usize,
}

static_assertions::assert_impl_all!(AnalysisReport: Send, Sync);

impl AnalysisReport {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Write the pretty JSON report as `<name>_digest.json` under `dir`.
pub fn write_report(report: &AnalysisReport, dir: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{name}_digest.json"));
    let mut file = File::create(&path)?;
    file.write_all(report.to_json_pretty()?.as_bytes())?;
    info!("Report saved: {}", path.display());
    Ok(path)
}
