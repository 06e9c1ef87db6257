//! Pipeline module.
//!
//! This module provides the dataset analyzer and its progress and
//! cancellation plumbing.

mod analyzer;
pub mod progress;

pub use analyzer::{DatasetAnalyzer, DatasetAnalyzerBuilder};
pub use progress::{
    AnalysisStage, CancellationToken, ClosureProgressReporter, ProgressReporter, ProgressUpdate,
};
