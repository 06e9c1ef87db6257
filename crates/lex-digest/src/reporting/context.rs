//! Plain-text rendering of reports for a downstream question-answering layer.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

use super::{AnalysisReport, CorrelationSection};
use crate::types::{ColumnProfile, TypeStats};

/// How much of the report to render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// Overview and sample.
    Quick,
    /// Overview and per-column statistics.
    Statistical,
    /// Everything, including quality, correlations and domain metrics.
    #[default]
    Comprehensive,
}

impl ContextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Statistical => "statistical",
            Self::Comprehensive => "comprehensive",
        }
    }
}

impl std::str::FromStr for ContextKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quick" => Ok(Self::Quick),
            "statistical" => Ok(Self::Statistical),
            "comprehensive" => Ok(Self::Comprehensive),
            other => Err(format!("unknown context kind '{other}'")),
        }
    }
}

/// Renders an [`AnalysisReport`] as sectioned prompt text.
pub struct ContextRenderer;

impl ContextRenderer {
    pub fn render(report: &AnalysisReport, kind: ContextKind) -> String {
        let mut sections = vec![Self::overview(report)];
        match kind {
            ContextKind::Quick => sections.push(Self::sample(report)),
            ContextKind::Statistical => sections.push(Self::statistics(report)),
            ContextKind::Comprehensive => {
                sections.push(Self::quality(report));
                sections.push(Self::statistics(report));
                sections.push(Self::sample(report));
                sections.push(Self::patterns(report));
            }
        }
        sections.join("\n\n")
    }

    /// Wrap a rendered context and a user question into one prompt.
    pub fn prompt(question: &str, report: &AnalysisReport, kind: ContextKind) -> String {
        format!(
            "You are a data analyst. Answer using only the dataset summary below.\n\n\
            {}\n\n\
            QUESTION: {}\n\n\
            ANSWER: ",
            Self::render(report, kind),
            question.trim()
        )
    }

    fn overview(report: &AnalysisReport) -> String {
        let mut out = String::from("=== DATASET OVERVIEW ===\n");
        let _ = writeln!(out, "- Total rows: {}", report.row_count);
        let _ = writeln!(out, "- Total columns: {}", report.column_count);
        let _ = writeln!(
            out,
            "- Memory usage: {:.2} MB",
            report.data_quality.estimated_size_bytes as f64 / (1024.0 * 1024.0)
        );
        let names: Vec<&str> = report.columns.iter().map(|c| c.name.as_str()).collect();
        let _ = write!(out, "- Columns: {}", names.join(", "));
        if report.truncated.columns {
            out.push_str(" (list truncated)");
        }
        out
    }

    fn quality(report: &AnalysisReport) -> String {
        let quality = &report.data_quality;
        let mut out = String::from("=== DATA QUALITY ASSESSMENT ===\n");
        let missing: Vec<&ColumnProfile> = report
            .columns
            .iter()
            .filter(|c| c.missing_count > 0)
            .collect();
        if missing.is_empty() {
            out.push_str("- No missing values detected\n");
        } else {
            out.push_str("Missing values:\n");
            for column in missing {
                let _ = writeln!(
                    out,
                    "  - {}: {} ({:.2}%)",
                    column.name, column.missing_count, column.missing_percentage
                );
            }
        }
        if quality.duplicate_rows > 0 {
            let _ = writeln!(
                out,
                "- Duplicate rows: {} ({:.2}%)",
                quality.duplicate_rows, quality.duplicate_percentage
            );
        } else {
            out.push_str("- No duplicate rows detected\n");
        }

        out.push_str("\nData types:\n");
        for column in &report.columns {
            let _ = writeln!(
                out,
                "  - {}: {} ({} unique values{})",
                column.name,
                column.column_type,
                column.distinct_count,
                if column.distinct_count_exact { "" } else { " or more" }
            );
        }
        out.trim_end().to_string()
    }

    fn statistics(report: &AnalysisReport) -> String {
        let mut out = String::from("=== STATISTICAL SUMMARY ===\n");
        for column in &report.columns {
            match &column.stats {
                TypeStats::Numeric(s) => {
                    let _ = writeln!(
                        out,
                        "  - {}: mean={:.4}, std={:.4}, min={}, q1={}, median={}, q3={}, max={}",
                        column.name,
                        s.mean,
                        s.std_dev,
                        s.min,
                        s.quartiles.q1,
                        s.quartiles.median,
                        s.quartiles.q3,
                        s.max
                    );
                }
                TypeStats::Categorical(s) => {
                    let top: Vec<String> = s
                        .top_values
                        .iter()
                        .take(3)
                        .map(|b| format!("{}: {}", b.value, b.count))
                        .collect();
                    let _ = writeln!(
                        out,
                        "  - {}: {} unique values, top values: {{{}}}",
                        column.name,
                        column.distinct_count,
                        top.join(", ")
                    );
                }
                TypeStats::Boolean(s) => {
                    let _ = writeln!(
                        out,
                        "  - {}: {} true / {} false ({:.1}% true)",
                        column.name,
                        s.true_count,
                        s.false_count,
                        s.true_ratio * 100.0
                    );
                }
                TypeStats::Temporal(s) => {
                    let _ = writeln!(
                        out,
                        "  - {}: {} to {} ({} days)",
                        column.name, s.min, s.max, s.span_days
                    );
                }
                TypeStats::Text(s) => {
                    let _ = writeln!(
                        out,
                        "  - {}: text, average length {:.1}",
                        column.name, s.mean_length
                    );
                }
                TypeStats::Empty => {
                    let _ = writeln!(out, "  - {}: no usable values", column.name);
                }
            }
        }
        out.trim_end().to_string()
    }

    fn sample(report: &AnalysisReport) -> String {
        let sample = &report.sample;
        let mut out = String::from("=== DATA SAMPLE ===\n");
        let _ = writeln!(out, "Sample strategy: {}", sample.set.strategy.as_str());
        if let Some(column) = &sample.set.stratify_column {
            let _ = writeln!(
                out,
                "Stratified by {} with {} categories",
                column,
                sample.set.strata.len()
            );
        }
        let _ = writeln!(out, "Sample size: {} rows", sample.set.len());
        if !sample.rows.is_empty() {
            let _ = writeln!(out, "\nrow | {}", sample.fields.join(" | "));
            for (index, row) in sample.set.indices.iter().zip(&sample.rows) {
                let cells: Vec<&str> = row.iter().map(|c| c.as_deref().unwrap_or("")).collect();
                let _ = writeln!(out, "{} | {}", index, cells.join(" | "));
            }
        }
        out.trim_end().to_string()
    }

    fn patterns(report: &AnalysisReport) -> String {
        let mut out = String::from("=== PATTERN ANALYSIS ===\n");
        match &report.correlation {
            Some(section) if !section.pairs().is_empty() => {
                let label = match section {
                    CorrelationSection::Matrix { .. } => "Strong correlations:",
                    CorrelationSection::TopPairs { .. } => "Top correlations:",
                };
                let _ = writeln!(out, "{label}");
                for pair in section.pairs() {
                    let _ = writeln!(
                        out,
                        "  - {} <-> {}: {:.3}",
                        pair.left, pair.right, pair.coefficient
                    );
                }
            }
            Some(_) => out.push_str("- No strong correlations detected\n"),
            None => {}
        }

        for column in &report.outliers.columns {
            if column.outlier_count > 0 {
                let _ = writeln!(
                    out,
                    "- {}: {} outliers ({:.2}%) outside [{:.4}, {:.4}]",
                    column.column,
                    column.outlier_count,
                    column.outlier_percentage,
                    column.lower_bound,
                    column.upper_bound
                );
            }
        }

        for column in &report.columns {
            if let Some(skew) = column.numeric_stats().and_then(|s| s.skewness)
                && skew.abs() > 1.0
            {
                let direction = if skew > 0.0 { "right" } else { "left" };
                let _ = writeln!(
                    out,
                    "- {}: highly skewed {} (skew: {:.2})",
                    column.name, direction, skew
                );
            }
        }

        if let Some(domain) = &report.domain_metrics {
            if let Some(balance) = &domain.class_balance {
                let _ = writeln!(
                    out,
                    "- Class balance on {}: minority '{}', imbalance ratio {:.2}",
                    balance.column, balance.minority_class, balance.imbalance_ratio
                );
                for class in &balance.classes {
                    let _ = writeln!(
                        out,
                        "  - {}: {} ({:.2}%)",
                        class.label,
                        class.count,
                        class.ratio * 100.0
                    );
                }
                for amount in &balance.amount_by_class {
                    let _ = writeln!(
                        out,
                        "  - {} {}: mean={:.2}, total={:.2} ({:.1}% of total)",
                        amount.label,
                        balance.amount_column.as_deref().unwrap_or("amount"),
                        amount.mean,
                        amount.total,
                        amount.share_of_total * 100.0
                    );
                }
            }
            for pattern in &domain.temporal_patterns {
                let busiest = pattern.buckets.iter().max_by_key(|b| b.count);
                let _ = write!(
                    out,
                    "- {}: {} {:?} periods",
                    pattern.column,
                    pattern.buckets.len(),
                    pattern.granularity
                );
                if let Some(bucket) = busiest {
                    let _ = write!(out, ", busiest {} ({} rows)", bucket.period, bucket.count);
                }
                out.push('\n');
            }
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::pipeline::DatasetAnalyzer;
    use polars::prelude::*;

    fn report() -> std::sync::Arc<AnalysisReport> {
        let df = df![
            "amount" => [10.0, 20.0, 30.0, 1000.0, 15.0, 25.0],
            "Class" => ["0", "0", "0", "1", "0", "0"],
            "city" => ["Lisbon", "Porto", "Lisbon", "Lisbon", "Porto", "Faro"],
        ]
        .unwrap();
        DatasetAnalyzer::builder()
            .config(AnalysisConfig::default())
            .build()
            .unwrap()
            .analyze(&df)
            .unwrap()
    }

    #[test]
    fn test_quick_context_has_overview_and_sample() {
        let text = ContextRenderer::render(&report(), ContextKind::Quick);
        assert!(text.contains("=== DATASET OVERVIEW ==="));
        assert!(text.contains("- Total rows: 6"));
        assert!(text.contains("=== DATA SAMPLE ==="));
        assert!(!text.contains("=== STATISTICAL SUMMARY ==="));
    }

    #[test]
    fn test_comprehensive_context_has_all_sections() {
        let text = ContextRenderer::render(&report(), ContextKind::Comprehensive);
        for header in [
            "=== DATA QUALITY ASSESSMENT ===",
            "=== STATISTICAL SUMMARY ===",
            "=== DATA SAMPLE ===",
            "=== PATTERN ANALYSIS ===",
        ] {
            assert!(text.contains(header), "missing {header}");
        }
        assert!(text.contains("Class balance on Class"));
    }

    #[test]
    fn test_prompt_wraps_question() {
        let prompt = ContextRenderer::prompt(
            "  Which city is most common? ",
            &report(),
            ContextKind::Statistical,
        );
        assert!(prompt.contains("QUESTION: Which city is most common?"));
        assert!(prompt.ends_with("ANSWER: "));
    }

    #[test]
    fn test_context_kind_from_str() {
        assert_eq!("Quick".parse::<ContextKind>().unwrap(), ContextKind::Quick);
        assert!("verbose".parse::<ContextKind>().is_err());
    }
}
