//! Dataset Analysis & Sampling Engine
//!
//! Bounded statistical digests of tabular datasets, built with Rust and Polars.
//!
//! # Overview
//!
//! The engine turns a table of any size into an [`AnalysisReport`] whose
//! JSON encoding never exceeds a configured byte budget, so a downstream
//! question-answering layer can reason about the data without seeing it:
//!
//! - **Type Inference**: numeric, boolean, temporal, categorical or text per column
//! - **Column Profiling**: moments, exact or sketched quartiles, top-K frequencies
//! - **Chunked Aggregation**: mergeable accumulators, optionally in parallel
//! - **Correlation & Outliers**: pairwise Pearson coefficients, IQR fences
//! - **Domain Metrics**: binary-class balance, amount per class, temporal buckets
//! - **Sampling**: head/tail, seeded random, proportional stratified
//! - **Progress Reporting**: stage updates with cancellation between chunks
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lex_digest::{AnalysisConfig, DatasetAnalyzer, SampleStrategy};
//! use polars::prelude::*;
//!
//! let df = CsvReadOptions::default()
//!     .with_has_header(true)
//!     .try_into_reader_with_file_path(Some("transactions.csv".into()))?
//!     .finish()?;
//!
//! let config = AnalysisConfig::builder()
//!     .sample_strategy(SampleStrategy::Stratified)
//!     .max_report_bytes(32 * 1024)
//!     .build()?;
//!
//! let report = DatasetAnalyzer::builder()
//!     .config(config)
//!     .build()?
//!     .analyze(&df)?;
//!
//! println!("{} columns profiled", report.columns.len());
//! println!("{}", report.to_json()?);
//! ```
//!
//! # Configuration
//!
//! [`AnalysisConfig`] can be built fluently, parsed from JSON, or read from
//! `LEX_DIGEST_*` environment variables:
//!
//! ```rust,ignore
//! let config = AnalysisConfig::from_json_str(r#"{"sample_size": 50, "random_seed": 7}"#)?;
//! let config = AnalysisConfig::from_env()?;
//! ```
//!
//! # Caching
//!
//! A [`DigestCache`] keeps the latest report keyed by a content fingerprint,
//! so repeated questions about the same upload reuse one analysis:
//!
//! ```rust,ignore
//! let cache = DigestCache::new();
//! let report = analyzer.analyze_cached(&df, &cache)?;
//! let context = ContextRenderer::render(&report, ContextKind::Quick);
//! ```

pub mod aggregate;
pub mod analysis;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod insight;
pub mod pipeline;
pub mod profiler;
pub mod reporting;
pub mod sampling;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use aggregate::{ChunkPlan, ChunkedAggregator, ColumnAggregate, FrequencyCounter};
pub use analysis::{CorrelationAccumulator, DataQualityScan, DataQualitySummary, OutlierDetector};
pub use cache::{DigestCache, Fingerprint};
pub use config::{
    AnalysisConfig, AnalysisConfigBuilder, ConfigValidationError, OutlierMethod, SampleStrategy,
};
pub use domain::DomainMetricsExtractor;
pub use error::{AnalysisError, Result as AnalysisResult, ResultExt};
pub use insight::InsightProvider;
pub use pipeline::{
    AnalysisStage, CancellationToken, ClosureProgressReporter, DatasetAnalyzer,
    DatasetAnalyzerBuilder, ProgressReporter, ProgressUpdate,
};
pub use profiler::{ColumnProfiler, ColumnTypeInferencer, QuantileSketch, RunningStats};
pub use reporting::{
    AnalysisReport, AnalysisReportBuilder, ContextKind, ContextRenderer, CorrelationSection,
    TruncationFlags,
};
pub use sampling::{SamplingEngine, Strata};
pub use types::{
    ColumnProfile, ColumnType, CorrelationMatrix, DomainMetrics, OutlierReport, SampleSet,
    SampleStatus, TypeStats,
};
