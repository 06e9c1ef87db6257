//! Progress reporting and cancellation for analysis runs.
//!
//! Cancellation is cooperative: the chunked passes check the token before
//! each chunk, so a cancelled run stops at the next chunk boundary and
//! returns [`AnalysisError::Cancelled`](crate::error::AnalysisError::Cancelled).
//!
//! # Example
//!
//! ```rust,ignore
//! use lex_digest::{DatasetAnalyzer, CancellationToken};
//!
//! let token = CancellationToken::new();
//! let handle = token.clone();
//! std::thread::spawn(move || handle.cancel());
//!
//! let result = DatasetAnalyzer::builder()
//!     .cancellation_token(token)
//!     .on_progress(|update| println!("[{:?}] {}", update.stage, update.message))
//!     .build()?
//!     .analyze(&df);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Phases of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    /// Validating the table and planning chunks
    Initializing,
    /// Tallying parse votes per column
    TypeInference,
    /// Per-column statistics and correlation moments
    Aggregation,
    /// Outliers, domain metrics and strata membership
    RowAnalysis,
    /// Drawing the representative sample
    Sampling,
    /// Assembling and budgeting the report
    ReportAssembly,
    Complete,
    Cancelled,
    Failed,
}

impl AnalysisStage {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::TypeInference => "Inferring Types",
            Self::Aggregation => "Aggregating Columns",
            Self::RowAnalysis => "Analyzing Rows",
            Self::Sampling => "Sampling Rows",
            Self::ReportAssembly => "Assembling Report",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// Share of the whole run spent in this stage (terminal stages are 0).
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.02,
            Self::TypeInference => 0.20,
            Self::Aggregation => 0.40,
            Self::RowAnalysis => 0.25,
            Self::Sampling => 0.05,
            Self::ReportAssembly => 0.08,
            Self::Complete | Self::Cancelled | Self::Failed => 0.0,
        }
    }

    /// Cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Initializing => 0.0,
            Self::TypeInference => 0.02,
            Self::Aggregation => 0.22,
            Self::RowAnalysis => 0.62,
            Self::Sampling => 0.87,
            Self::ReportAssembly => 0.92,
            Self::Complete => 1.0,
            Self::Cancelled | Self::Failed => 0.0,
        }
    }
}

/// A progress event emitted by the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: AnalysisStage,

    /// Finer position, e.g. "Chunk 3/12"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    pub fn new(stage: AnalysisStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let stage_progress = stage_progress.clamp(0.0, 1.0);
        Self {
            stage,
            sub_stage: None,
            progress: (stage.base_progress() + stage.weight() * stage_progress).clamp(0.0, 1.0),
            stage_progress,
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Progress through `current` of `total` items (chunks) of a stage.
    pub fn with_items(
        stage: AnalysisStage,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self {
            sub_stage: Some(format!("Chunk {current}/{total}")),
            items_processed: Some(current),
            items_total: Some(total),
            ..Self::new(stage, stage_progress, message)
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            progress: 1.0,
            stage_progress: 1.0,
            ..Self::new(AnalysisStage::Complete, 1.0, message)
        }
    }

    pub fn cancelled() -> Self {
        Self::new(AnalysisStage::Cancelled, 0.0, "Analysis cancelled")
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(AnalysisStage::Failed, 0.0, message)
    }
}

/// Receives progress updates during analysis.
///
/// Chunks are processed on the rayon pool, so `report` may be called from
/// several threads at once and out of chunk order.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// [`ProgressReporter`] backed by a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Shared flag for cancelling a running analysis from another thread.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation; takes effect at the next chunk boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
