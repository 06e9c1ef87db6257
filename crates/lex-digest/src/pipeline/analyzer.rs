//! The dataset analyzer.
//!
//! [`DatasetAnalyzer`] runs three passes over one shared chunk plan:
//!
//! 1. type votes per column, resolved into [`InferredType`]s
//! 2. column aggregates plus pairwise co-moments for correlation
//! 3. row-level work that needs the profiles: outlier flags, domain metrics,
//!    and strata for stratified sampling
//!
//! It then draws the sample, scans data quality and hands everything to the
//! [`AnalysisReportBuilder`].

use polars::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::aggregate::{
    ChunkPlan, ChunkedAggregator, ColumnAggregate, QuantileMode, TypedValues, extract_typed,
};
use crate::analysis::{CorrelationAccumulator, DataQualityScan, OutlierAccumulator, OutlierDetector};
use crate::cache::{DigestCache, Fingerprint};
use crate::config::{AnalysisConfig, ConfigValidationError, SampleStrategy};
use crate::domain::{ColumnRef, DomainMetricsExtractor, DomainPlan, DomainState};
use crate::error::{AnalysisError, Result, ResultExt};
use crate::pipeline::progress::{
    AnalysisStage, CancellationToken, ClosureProgressReporter, ProgressReporter, ProgressUpdate,
};
use crate::profiler::{ColumnProfiler, ColumnTypeInferencer, InferredType, TypeVotes};
use crate::reporting::{AnalysisReport, AnalysisReportBuilder, ChunkingSummary, ReportParts};
use crate::sampling::{SamplingEngine, Strata};
use crate::types::{ColumnProfile, ColumnType, QuantileMethod, SampleSet};
use crate::utils::series_to_strings;

/// Produces an [`AnalysisReport`] for a table.
///
/// Use [`DatasetAnalyzer::builder()`] to create one.
///
/// # Example
///
/// ```rust,ignore
/// use lex_digest::{AnalysisConfig, CancellationToken, DatasetAnalyzer};
///
/// let token = CancellationToken::new();
/// let report = DatasetAnalyzer::builder()
///     .config(AnalysisConfig::builder().sample_size(50).build()?)
///     .cancellation_token(token.clone())
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .analyze(&df)?;
///
/// println!("{}", report.to_json_pretty()?);
/// ```
pub struct DatasetAnalyzer {
    config: AnalysisConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
}

static_assertions::assert_impl_all!(DatasetAnalyzer: Send, Sync);

/// Partial state of the aggregation pass.
struct AggregationState {
    columns: Vec<ColumnAggregate>,
    correlation: CorrelationAccumulator,
}

/// Partial state of the row pass.
struct RowState {
    outliers: Vec<OutlierAccumulator>,
    domain: DomainState,
    strata: Option<Strata>,
}

impl DatasetAnalyzer {
    pub fn builder() -> DatasetAnalyzerBuilder {
        DatasetAnalyzerBuilder::default()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze a table.
    ///
    /// # Errors
    ///
    /// - [`AnalysisError::Schema`] when the table has no rows or no columns
    /// - [`AnalysisError::ColumnNotFound`] when the configured stratify column is absent
    /// - [`AnalysisError::Cancelled`] when the token was set between chunks
    pub fn analyze(&self, df: &DataFrame) -> Result<Arc<AnalysisReport>> {
        match self.analyze_internal(df) {
            Ok(report) => {
                self.report_progress(ProgressUpdate::complete("Analysis completed"));
                Ok(report)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.report_progress(ProgressUpdate::cancelled());
                } else {
                    self.report_progress(ProgressUpdate::failed(e.to_string()));
                }
                error!("Analysis error: {}", e);
                Err(e)
            }
        }
    }

    /// Analyze a table, reusing the cached report when the table and
    /// configuration fingerprint match.
    pub fn analyze_cached(
        &self,
        df: &DataFrame,
        cache: &DigestCache,
    ) -> Result<Arc<AnalysisReport>> {
        let fingerprint = Fingerprint::compute(df, &self.config)?;
        cache.get_or_try_insert_with(fingerprint, || self.analyze(df))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        Ok(())
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn validate_schema(df: &DataFrame) -> Result<()> {
        if df.width() == 0 {
            return Err(AnalysisError::Schema("table has no columns".to_string()));
        }
        if df.height() == 0 {
            return Err(AnalysisError::Schema("table has no rows".to_string()));
        }
        Ok(())
    }

    fn analyze_internal(&self, df: &DataFrame) -> Result<Arc<AnalysisReport>> {
        let start = Instant::now();
        let config = &self.config;

        info!("Starting analysis of {} rows x {} columns", df.height(), df.width());
        self.report_progress(ProgressUpdate::new(
            AnalysisStage::Initializing,
            0.0,
            "Validating table...",
        ));
        Self::validate_schema(df)?;

        let plan = ChunkPlan::for_rows(df.height(), config);
        let aggregator = ChunkedAggregator::new(plan)
            .parallel(config.parallel)
            .cancellation_token(Some(self.cancellation_token.clone()))
            .progress_reporter(self.progress_reporter.clone());
        debug!(
            chunks = plan.chunk_count(),
            chunk_size = plan.chunk_size,
            in_memory = plan.in_memory,
            "Planned chunks"
        );

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let mut warnings = Vec::new();

        // Pass 1: types
        let inferred = self.infer_types(df, &aggregator, &names, &mut warnings)?;
        self.check_cancelled()?;

        // Pass 2: aggregates and co-moments
        let quantile_mode = plan.quantile_mode(config);
        let aggregation = self.aggregate(df, &aggregator, &names, &inferred, quantile_mode)?;
        let profiler = ColumnProfiler::new(config);
        let profiles: Vec<ColumnProfile> = names
            .iter()
            .zip(&inferred)
            .zip(aggregation.columns)
            .map(|((name, inferred), aggregate)| profiler.profile(name, inferred, aggregate))
            .collect();
        for profile in &profiles {
            debug!(
                column = %profile.name,
                column_type = %profile.column_type,
                missing = profile.missing_count,
                distinct = profile.distinct_count,
                "Profiled column"
            );
        }
        let correlation = aggregation.correlation.finish(config.min_joint_samples);
        self.check_cancelled()?;

        // Pass 3: rows
        let detector = OutlierDetector::new(config);
        let extractor = DomainMetricsExtractor::new(config);
        let domain_plan = extractor.plan(&profiles, &inferred);
        let stratify = self.stratify_target(&profiles, &domain_plan, &mut warnings)?;
        let row_state = self.scan_rows(
            df,
            &aggregator,
            &profiles,
            &inferred,
            &detector,
            &extractor,
            &domain_plan,
            stratify.as_ref(),
        )?;
        self.check_cancelled()?;

        let (outlier_columns, domain_state, strata) = match row_state {
            Some(state) => (
                state.outliers.into_iter().map(OutlierAccumulator::finish).collect(),
                Some(state.domain),
                state.strata,
            ),
            None => (Vec::new(), None, None),
        };
        let outliers = detector.report(outlier_columns);
        let domain_metrics = match domain_state {
            Some(state) if !domain_plan.is_empty() => Some(extractor.finish(&domain_plan, state)),
            _ => None,
        };

        // Sampling
        self.report_progress(ProgressUpdate::new(
            AnalysisStage::Sampling,
            0.0,
            format!("Drawing {} sample rows...", config.sample_size),
        ));
        let engine = SamplingEngine::new(config.random_seed);
        let sample = engine.sample(
            config.sample_strategy,
            df.height(),
            config.sample_size,
            strata.as_ref(),
        )?;
        info!(
            "Sampled {} rows ({})",
            sample.len(),
            sample.strategy.as_str()
        );
        let (sample_fields, sample_rows) = if config.include_sample_rows {
            (names.clone(), Self::sample_rows(df, &sample)?)
        } else {
            (Vec::new(), Vec::new())
        };

        // Report
        self.report_progress(ProgressUpdate::new(
            AnalysisStage::ReportAssembly,
            0.0,
            "Assembling report...",
        ));
        let data_quality = DataQualityScan::scan(df, &profiles).context("Scanning data quality")?;
        let parts = ReportParts {
            row_count: df.height(),
            column_count: df.width(),
            chunking: ChunkingSummary {
                mode: if plan.in_memory { "in_memory" } else { "chunked" }.to_string(),
                chunk_size: plan.chunk_size,
                chunk_count: plan.chunk_count(),
                quantile_method: match quantile_mode {
                    QuantileMode::Exact => QuantileMethod::Exact,
                    QuantileMode::Sketch { .. } => QuantileMethod::Approximate,
                },
                parallel: config.parallel,
            },
            columns: profiles,
            data_quality,
            correlation: Some(correlation),
            outliers,
            domain_metrics,
            sample,
            sample_fields,
            sample_rows,
            warnings,
        };
        let report = AnalysisReportBuilder::new(config).build(parts)?;
        if report.truncated.any() {
            warn!(
                "Report truncated to fit {} bytes: {:?}",
                config.max_report_bytes, report.truncated
            );
        }

        info!(
            "Analysis complete in {:.2?}: {} bytes",
            start.elapsed(),
            report.byte_size
        );
        Ok(Arc::new(report))
    }

    fn infer_types(
        &self,
        df: &DataFrame,
        aggregator: &ChunkedAggregator,
        names: &[String],
        warnings: &mut Vec<String>,
    ) -> Result<Vec<InferredType>> {
        let inferencer = ColumnTypeInferencer::new(&self.config);
        let votes = aggregator
            .run(
                df,
                AnalysisStage::TypeInference,
                |chunk| {
                    let votes = chunk
                        .frame
                        .get_columns()
                        .iter()
                        .map(|c| inferencer.votes(c.as_materialized_series()))
                        .collect::<PolarsResult<Vec<TypeVotes>>>()?;
                    Ok(votes)
                },
                |mut left, right| {
                    for (mine, theirs) in left.iter_mut().zip(&right) {
                        mine.merge(theirs);
                    }
                    left
                },
            )?
            .ok_or_else(|| AnalysisError::Internal("type inference saw no chunks".to_string()))?;

        let inferred: Vec<InferredType> = votes.iter().map(|v| inferencer.resolve(v)).collect();
        for (name, inferred) in names.iter().zip(&inferred) {
            if inferred.ambiguous {
                warn!("Column '{}' has an ambiguous type, treated as text", name);
                warnings.push(format!(
                    "Column '{name}' has an ambiguous type and was treated as text"
                ));
            }
        }
        info!("Inferred types for {} columns", inferred.len());
        Ok(inferred)
    }

    fn aggregate(
        &self,
        df: &DataFrame,
        aggregator: &ChunkedAggregator,
        names: &[String],
        inferred: &[InferredType],
        quantile_mode: QuantileMode,
    ) -> Result<AggregationState> {
        let config = &self.config;
        let numeric_names: Vec<String> = names
            .iter()
            .zip(inferred)
            .filter(|(_, t)| t.column_type == ColumnType::Numeric)
            .map(|(name, _)| name.clone())
            .collect();

        let state = aggregator
            .run(
                df,
                AnalysisStage::Aggregation,
                |chunk| {
                    let mut columns = Vec::with_capacity(inferred.len());
                    let mut numeric: Vec<Vec<Option<f64>>> =
                        Vec::with_capacity(numeric_names.len());
                    for (column, inferred) in chunk.frame.get_columns().iter().zip(inferred) {
                        let typed = extract_typed(column.as_materialized_series(), inferred)?;
                        let mut aggregate =
                            ColumnAggregate::new(inferred.column_type, config, quantile_mode);
                        aggregate.absorb(&typed);
                        columns.push(aggregate);
                        if let TypedValues::Numeric(values) = typed.values {
                            numeric.push(values);
                        }
                    }
                    let mut correlation = CorrelationAccumulator::new(numeric_names.clone());
                    let views: Vec<&[Option<f64>]> = numeric.iter().map(Vec::as_slice).collect();
                    correlation.absorb(&views);
                    Ok(AggregationState { columns, correlation })
                },
                |mut left, right| {
                    for (mine, theirs) in left.columns.iter_mut().zip(&right.columns) {
                        mine.merge(theirs);
                    }
                    left.correlation.merge(&right.correlation);
                    left
                },
            )?
            .ok_or_else(|| AnalysisError::Internal("aggregation saw no chunks".to_string()))?;
        info!(
            "Aggregated {} columns ({} numeric)",
            state.columns.len(),
            numeric_names.len()
        );
        Ok(state)
    }

    /// Column to stratify on, when the stratified strategy is configured.
    fn stratify_target(
        &self,
        profiles: &[ColumnProfile],
        domain_plan: &DomainPlan,
        warnings: &mut Vec<String>,
    ) -> Result<Option<ColumnRef>> {
        if self.config.sample_strategy != SampleStrategy::Stratified {
            return Ok(None);
        }
        if let Some(name) = &self.config.stratify_column {
            let index = profiles
                .iter()
                .position(|p| &p.name == name)
                .ok_or_else(|| AnalysisError::ColumnNotFound(name.clone()))?;
            return Ok(Some(ColumnRef {
                index,
                name: name.clone(),
            }));
        }
        if let Some(class) = &domain_plan.class_column {
            return Ok(Some(class.column.clone()));
        }
        let fallback = profiles
            .iter()
            .enumerate()
            .find(|(_, p)| matches!(p.column_type, ColumnType::Categorical | ColumnType::Boolean));
        match fallback {
            Some((index, p)) => Ok(Some(ColumnRef {
                index,
                name: p.name.clone(),
            })),
            None => {
                warn!("No categorical column to stratify on, sampling at random");
                warnings.push(
                    "No categorical column to stratify on; sampled at random instead".to_string(),
                );
                Ok(None)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_rows(
        &self,
        df: &DataFrame,
        aggregator: &ChunkedAggregator,
        profiles: &[ColumnProfile],
        inferred: &[InferredType],
        detector: &OutlierDetector,
        extractor: &DomainMetricsExtractor<'_>,
        domain_plan: &DomainPlan,
        stratify: Option<&ColumnRef>,
    ) -> Result<Option<RowState>> {
        let targets: Vec<_> = profiles
            .iter()
            .enumerate()
            .filter_map(|(index, p)| detector.bounds(p).map(|bounds| (index, bounds)))
            .collect();
        if targets.is_empty() && domain_plan.is_empty() && stratify.is_none() {
            debug!("Row pass skipped");
            return Ok(None);
        }

        let state = aggregator.run(
            df,
            AnalysisStage::RowAnalysis,
            |chunk| {
                let columns = chunk.frame.get_columns();
                let mut outliers = Vec::with_capacity(targets.len());
                for &(index, bounds) in &targets {
                    let mut acc = detector.accumulator(profiles[index].name.clone(), bounds);
                    let typed =
                        extract_typed(columns[index].as_materialized_series(), &inferred[index])?;
                    if let Some(values) = typed.as_numeric() {
                        acc.absorb(chunk.offset, values);
                    }
                    outliers.push(acc);
                }

                let mut domain = extractor.state(domain_plan);
                domain.absorb_chunk(chunk, domain_plan)?;

                let strata = match stratify {
                    Some(column) => {
                        let labels = extract_typed(
                            columns[column.index].as_materialized_series(),
                            &inferred[column.index],
                        )?
                        .labels();
                        let mut strata = Strata::new(column.name.clone());
                        strata.absorb(chunk.offset, &labels);
                        Some(strata)
                    }
                    None => None,
                };
                Ok(RowState {
                    outliers,
                    domain,
                    strata,
                })
            },
            |mut left, right| {
                for (mine, theirs) in left.outliers.iter_mut().zip(&right.outliers) {
                    mine.merge(theirs);
                }
                left.domain.merge(&right.domain);
                if let (Some(mine), Some(theirs)) = (left.strata.as_mut(), right.strata.as_ref()) {
                    mine.merge(theirs);
                }
                left
            },
        )?;
        info!("Scanned rows for {} outlier columns", targets.len());
        Ok(state)
    }

    /// Cell text of the sampled rows, in index order.
    fn sample_rows(df: &DataFrame, sample: &SampleSet) -> Result<Vec<Vec<Option<String>>>> {
        if sample.is_empty() {
            return Ok(Vec::new());
        }
        let indices: Vec<IdxSize> = sample.indices.iter().map(|&i| i as IdxSize).collect();
        let taken = df
            .take(&IdxCa::from_vec("sample".into(), indices))
            .context("Collecting sample rows")?;
        let columns = taken
            .get_columns()
            .iter()
            .map(|c| series_to_strings(c.as_materialized_series()))
            .collect::<PolarsResult<Vec<_>>>()?;
        Ok((0..taken.height())
            .map(|row| columns.iter().map(|c| c[row].clone()).collect())
            .collect())
    }
}

/// Builder for [`DatasetAnalyzer`].
#[derive(Default)]
pub struct DatasetAnalyzerBuilder {
    config: Option<AnalysisConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
}

static_assertions::assert_impl_all!(DatasetAnalyzerBuilder: Send);

impl DatasetAnalyzerBuilder {
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a progress reporter for receiving updates during analysis.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// ```rust,ignore
    /// let analyzer = DatasetAnalyzer::builder()
    ///     .on_progress(|update| {
    ///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
    ///     })
    ///     .build()?;
    /// ```
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Set a cancellation token.
    ///
    /// The token is checked before every chunk of every pass, so a cancel
    /// from another thread takes effect after the chunks already running.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<DatasetAnalyzer, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Ok(DatasetAnalyzer {
            config,
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
        })
    }
}
