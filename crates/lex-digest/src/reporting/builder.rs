//! Report assembly and size budgeting.

use tracing::{debug, warn};

use super::{AnalysisReport, ChunkingSummary, CorrelationSection, SampleSection, TruncationFlags};
use crate::analysis::DataQualitySummary;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::sampling::SamplingEngine;
use crate::types::{ColumnProfile, CorrelationMatrix, DomainMetrics, OutlierReport, SampleSet};

/// Everything a report is made of, before budgeting.
#[derive(Debug, Clone)]
pub struct ReportParts {
    pub row_count: usize,
    pub column_count: usize,
    pub chunking: ChunkingSummary,
    pub columns: Vec<ColumnProfile>,
    pub data_quality: DataQualitySummary,
    pub correlation: Option<CorrelationMatrix>,
    pub outliers: OutlierReport,
    pub domain_metrics: Option<DomainMetrics>,
    pub sample: SampleSet,
    pub sample_fields: Vec<String>,
    pub sample_rows: Vec<Vec<Option<String>>>,
    pub warnings: Vec<String>,
}

/// Composes [`AnalysisReport`]s that fit within `max_report_bytes`.
///
/// Sections are reduced in a fixed order until the compact JSON encoding
/// fits:
///
/// 1. categorical top-K tables are halved
/// 2. the sample is halved, keeping its strategy's shape
/// 3. wide correlation matrices become a top-pairs list
/// 4. any matrix becomes a top-pairs list, which is then halved
/// 5. outlier index lists are halved, then whole entries dropped
/// 6. temporal buckets are halved, then whole patterns dropped
/// 7. warnings are dropped
/// 8. domain metrics, correlation and strata are dropped
/// 9. column profiles are dropped from the tail
/// 10. the stratify column name is dropped
///
/// Column profiles go last among the content sections. Once step 10 has
/// run only fixed-size fields remain, and those fit in the smallest
/// accepted budget. Every step that removes content sets its flag in
/// [`AnalysisReport::truncated`].
pub struct AnalysisReportBuilder<'a> {
    config: &'a AnalysisConfig,
    engine: SamplingEngine,
}

impl<'a> AnalysisReportBuilder<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self {
            config,
            engine: SamplingEngine::new(config.random_seed),
        }
    }

    pub fn build(&self, parts: ReportParts) -> Result<AnalysisReport> {
        let correlation = parts
            .correlation
            .filter(|matrix| !matrix.is_empty())
            .map(|matrix| CorrelationSection::Matrix {
                strong_pairs: matrix.strong_pairs(self.config.strong_correlation_threshold),
                matrix,
            });

        let mut report = AnalysisReport {
            row_count: parts.row_count,
            column_count: parts.column_count,
            chunking: parts.chunking,
            columns: parts.columns,
            data_quality: parts.data_quality,
            correlation,
            outliers: parts.outliers,
            domain_metrics: parts.domain_metrics.filter(|d| !d.is_empty()),
            sample: SampleSection {
                set: parts.sample,
                fields: parts.sample_fields,
                rows: parts.sample_rows,
            },
            warnings: parts.warnings,
            truncated: TruncationFlags::default(),
            byte_size: 0,
        };

        self.enforce_budget(&mut report)?;
        settle_byte_size(&mut report)?;
        debug!(
            byte_size = report.byte_size,
            truncated = report.truncated.any(),
            "Report assembled"
        );
        Ok(report)
    }

    fn enforce_budget(&self, report: &mut AnalysisReport) -> Result<()> {
        let budget = self.config.max_report_bytes;
        // The final byte_size never has more digits than the budget.
        report.byte_size = budget;
        let over = |r: &AnalysisReport| -> Result<bool> { Ok(encoded_len(r)? > budget) };

        if !over(report)? {
            return Ok(());
        }
        debug!(budget, "Report exceeds budget, truncating");

        self.shrink_categoricals(report, &over)?;
        self.shrink_sample(report, &over)?;
        self.collapse_correlation(report, &over)?;
        shrink_outliers(report, &over)?;
        shrink_temporal(report, &over)?;

        if over(report)? && !report.warnings.is_empty() {
            report.warnings.clear();
            report.truncated.warnings = true;
        }
        if over(report)? && report.domain_metrics.take().is_some() {
            report.truncated.domain_metrics = true;
        }
        if over(report)? && report.correlation.take().is_some() {
            report.truncated.correlation = true;
        }
        if over(report)? && !report.sample.set.strata.is_empty() {
            report.sample.set.strata.clear();
            report.truncated.sample = true;
        }

        shrink_columns(report, &over)?;

        if over(report)? && report.sample.set.stratify_column.take().is_some() {
            report.truncated.sample = true;
        }
        if over(report)? {
            warn!(
                size = encoded_len(report)?,
                budget, "Report still over budget after truncation"
            );
        }
        Ok(())
    }

    fn shrink_categoricals<F>(&self, report: &mut AnalysisReport, over: &F) -> Result<()>
    where
        F: Fn(&AnalysisReport) -> Result<bool>,
    {
        let mut k = self.config.categorical_top_k;
        while k > 0 && over(report)? {
            k /= 2;
            for stats in report
                .columns
                .iter_mut()
                .filter_map(ColumnProfile::categorical_stats_mut)
            {
                if stats.top_values.len() > k {
                    stats.shrink_to(k);
                    report.truncated.categorical_top_k = true;
                }
            }
        }
        Ok(())
    }

    fn shrink_sample<F>(&self, report: &mut AnalysisReport, over: &F) -> Result<()>
    where
        F: Fn(&AnalysisReport) -> Result<bool>,
    {
        let mut k = report.sample.set.len();
        while k > 0 && over(report)? {
            k /= 2;
            let (set, kept) = self.engine.shrink(&report.sample.set, k);
            let rows = std::mem::take(&mut report.sample.rows);
            if !rows.is_empty() {
                report.sample.rows = kept.iter().filter_map(|&p| rows.get(p).cloned()).collect();
            }
            report.sample.set = set;
            report.truncated.sample = true;
        }
        if report.sample.rows.is_empty() {
            report.sample.fields.clear();
        }
        Ok(())
    }

    fn collapse_correlation<F>(&self, report: &mut AnalysisReport, over: &F) -> Result<()>
    where
        F: Fn(&AnalysisReport) -> Result<bool>,
    {
        let wide = match &report.correlation {
            Some(CorrelationSection::Matrix { matrix, .. }) => {
                matrix.len() > self.config.high_column_threshold
            }
            _ => false,
        };
        if wide && over(report)? {
            self.replace_matrix(report);
        }
        if over(report)? {
            self.replace_matrix(report);
        }
        while over(report)?
            && let Some(CorrelationSection::TopPairs { pairs, .. }) = report.correlation.as_mut()
            && !pairs.is_empty()
        {
            pairs.truncate(pairs.len() / 2);
            report.truncated.correlation = true;
        }
        Ok(())
    }

    fn replace_matrix(&self, report: &mut AnalysisReport) {
        let section = match &report.correlation {
            Some(CorrelationSection::Matrix { matrix, .. }) => CorrelationSection::TopPairs {
                numeric_columns: matrix.len(),
                pairs: matrix.top_pairs(self.config.top_correlation_pairs),
            },
            _ => return,
        };
        report.correlation = Some(section);
        report.truncated.correlation = true;
    }
}

fn shrink_outliers<F>(report: &mut AnalysisReport, over: &F) -> Result<()>
where
    F: Fn(&AnalysisReport) -> Result<bool>,
{
    let mut cap = report
        .outliers
        .columns
        .iter()
        .map(|c| c.indices.len())
        .max()
        .unwrap_or(0);
    while cap > 0 && over(report)? {
        cap /= 2;
        for column in &mut report.outliers.columns {
            if column.indices.len() > cap {
                column.indices.truncate(cap);
                column.indices_truncated = true;
            }
        }
        report.truncated.outliers = true;
    }
    while over(report)? && report.outliers.columns.pop().is_some() {
        report.truncated.outliers = true;
    }
    Ok(())
}

fn shrink_temporal<F>(report: &mut AnalysisReport, over: &F) -> Result<()>
where
    F: Fn(&AnalysisReport) -> Result<bool>,
{
    let mut cap = report
        .domain_metrics
        .as_ref()
        .and_then(|d| d.temporal_patterns.iter().map(|p| p.buckets.len()).max())
        .unwrap_or(0);
    while cap > 0 && over(report)? {
        cap /= 2;
        if let Some(domain) = report.domain_metrics.as_mut() {
            for pattern in &mut domain.temporal_patterns {
                pattern.truncate_buckets(cap);
            }
        }
        report.truncated.temporal_buckets = true;
    }
    while over(report)?
        && let Some(domain) = report.domain_metrics.as_mut()
        && domain.temporal_patterns.pop().is_some()
    {
        report.truncated.temporal_buckets = true;
    }
    Ok(())
}

fn shrink_columns<F>(report: &mut AnalysisReport, over: &F) -> Result<()>
where
    F: Fn(&AnalysisReport) -> Result<bool>,
{
    if over(report)? && !report.data_quality.columns_with_missing.is_empty() {
        report.data_quality.columns_with_missing.clear();
        report.truncated.columns = true;
    }
    while over(report)? && !report.columns.is_empty() {
        let drop = (report.columns.len() / 8).max(1);
        let keep = report.columns.len() - drop;
        report.columns.truncate(keep);
        report.truncated.columns = true;
    }
    Ok(())
}

fn encoded_len(report: &AnalysisReport) -> Result<usize> {
    Ok(serde_json::to_vec(report)?.len())
}

/// Set `byte_size` to the length of the encoding that contains it.
fn settle_byte_size(report: &mut AnalysisReport) -> Result<()> {
    for _ in 0..8 {
        let len = encoded_len(report)?;
        if len == report.byte_size {
            return Ok(());
        }
        report.byte_size = len;
    }
    Err(AnalysisError::Internal(
        "report byte size did not converge".to_string(),
    ))
}
