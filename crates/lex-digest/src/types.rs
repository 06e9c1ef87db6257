use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::SampleStrategy;

// ============================================================================
// Column Types and Profiles
// ============================================================================

/// Semantic type assigned to every column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numeric,
    Boolean,
    Temporal,
    Categorical,
    Text,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Boolean => "boolean",
            Self::Temporal => "temporal",
            Self::Categorical => "categorical",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// How quartiles were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantileMethod {
    /// Linear interpolation over the sorted values.
    Exact,
    /// Read from a mergeable quantile sketch.
    Approximate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quartiles {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
}

impl Quartiles {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub variance: f64,
    pub sum: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skewness: Option<f64>,
    pub quartiles: Quartiles,
    pub quantile_method: QuantileMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanStats {
    pub true_count: usize,
    pub false_count: usize,
    pub true_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalStats {
    pub min: NaiveDateTime,
    pub max: NaiveDateTime,
    pub span_days: i64,
    pub span_hours: i64,
    /// Period used to bucket this column over time.
    pub granularity: TemporalGranularity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// One entry of a top-K frequency table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBucket {
    pub value: String,
    pub count: usize,
    pub percentage: f64,
}

/// Everything outside the top-K, collapsed into a single bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtherBucket {
    pub count: usize,
    pub distinct_values: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalStats {
    pub top_values: Vec<FrequencyBucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other: Option<OtherBucket>,
}

impl CategoricalStats {
    /// Keep the first `k` buckets and fold the rest into the other bucket.
    pub fn shrink_to(&mut self, k: usize) {
        if self.top_values.len() <= k {
            return;
        }
        let dropped = self.top_values.split_off(k);
        let other = self.other.get_or_insert_with(OtherBucket::default);
        for bucket in dropped {
            other.count += bucket.count;
            other.distinct_values += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStats {
    pub min_length: usize,
    pub max_length: usize,
    pub mean_length: f64,
}

/// Statistics that depend on the column type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeStats {
    Numeric(NumericStats),
    Boolean(BooleanStats),
    Temporal(TemporalStats),
    Categorical(CategoricalStats),
    Text(TextStats),
    /// The column held no usable values.
    Empty,
}

/// Profile of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub column_type: ColumnType,
    /// Non-missing values that parsed as `column_type`.
    pub count: usize,
    pub missing_count: usize,
    pub missing_percentage: f64,
    /// Non-missing cells that failed to parse as `column_type`.
    pub invalid_count: usize,
    pub distinct_count: usize,
    /// False once the bounded frequency counter overflowed; `distinct_count` is then a lower bound.
    pub distinct_count_exact: bool,
    pub type_ambiguous: bool,
    pub stats: TypeStats,
}

impl ColumnProfile {
    pub fn numeric_stats(&self) -> Option<&NumericStats> {
        match &self.stats {
            TypeStats::Numeric(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn temporal_stats(&self) -> Option<&TemporalStats> {
        match &self.stats {
            TypeStats::Temporal(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn categorical_stats_mut(&mut self) -> Option<&mut CategoricalStats> {
        match &mut self.stats {
            TypeStats::Categorical(stats) => Some(stats),
            _ => None,
        }
    }
}

// ============================================================================
// Correlation
// ============================================================================

/// Symmetric Pearson matrix over the numeric columns.
///
/// `None` entries mark pairs whose coefficient is undefined: fewer than the
/// minimum joint samples, or zero variance on either side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
    #[serde(skip)]
    pub joint_counts: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub left: String,
    pub right: String,
    pub coefficient: f64,
    pub joint_count: usize,
}

impl CorrelationMatrix {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.values.get(i).and_then(|row| row.get(j)).copied().flatten()
    }

    /// Look up a coefficient by column names.
    pub fn coefficient(&self, left: &str, right: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == left)?;
        let j = self.columns.iter().position(|c| c == right)?;
        self.get(i, j)
    }

    /// All defined off-diagonal pairs, upper triangle only.
    pub fn pairs(&self) -> Vec<CorrelationPair> {
        let mut pairs = Vec::new();
        for i in 0..self.len() {
            for j in (i + 1)..self.len() {
                if let Some(coefficient) = self.get(i, j) {
                    pairs.push(CorrelationPair {
                        left: self.columns[i].clone(),
                        right: self.columns[j].clone(),
                        coefficient,
                        joint_count: self
                            .joint_counts
                            .get(i)
                            .and_then(|row| row.get(j))
                            .copied()
                            .unwrap_or(0),
                    });
                }
            }
        }
        pairs
    }

    /// The `n` pairs with the largest absolute coefficient.
    ///
    /// Ties keep matrix order so the selection is deterministic.
    pub fn top_pairs(&self, n: usize) -> Vec<CorrelationPair> {
        let mut pairs = self.pairs();
        pairs.sort_by(|a, b| b.coefficient.abs().total_cmp(&a.coefficient.abs()));
        pairs.truncate(n);
        pairs
    }

    /// Pairs whose absolute coefficient reaches `threshold`.
    pub fn strong_pairs(&self, threshold: f64) -> Vec<CorrelationPair> {
        let mut pairs: Vec<_> = self
            .pairs()
            .into_iter()
            .filter(|p| p.coefficient.abs() >= threshold)
            .collect();
        pairs.sort_by(|a, b| b.coefficient.abs().total_cmp(&a.coefficient.abs()));
        pairs
    }
}

// ============================================================================
// Outliers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnOutliers {
    pub column: String,
    pub q1: f64,
    pub q3: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub quantile_method: QuantileMethod,
    /// Values compared against the bounds.
    pub evaluated_count: usize,
    pub outlier_count: usize,
    pub outlier_percentage: f64,
    /// Row indices of flagged values, ascending. May hold fewer than `outlier_count`.
    pub indices: Vec<usize>,
    pub indices_truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierReport {
    pub method: crate::config::OutlierMethod,
    pub multiplier: f64,
    pub columns: Vec<ColumnOutliers>,
}

impl OutlierReport {
    pub fn total_outliers(&self) -> usize {
        self.columns.iter().map(|c| c.outlier_count).sum()
    }

    pub fn for_column(&self, name: &str) -> Option<&ColumnOutliers> {
        self.columns.iter().find(|c| c.column == name)
    }
}

// ============================================================================
// Domain Metrics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassCount {
    pub label: String,
    pub count: usize,
    pub ratio: f64,
}

/// Amount statistics for the rows of one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassAmountSummary {
    pub label: String,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub total: f64,
    pub share_of_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassBalance {
    pub column: String,
    pub classes: Vec<ClassCount>,
    pub minority_class: String,
    /// Majority count divided by minority count.
    pub imbalance_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_column: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub amount_by_class: Vec<ClassAmountSummary>,
}

impl ClassBalance {
    pub fn ratio_of(&self, label: &str) -> Option<f64> {
        self.classes.iter().find(|c| c.label == label).map(|c| c.ratio)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalGranularity {
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalBucket {
    pub period: String,
    pub count: usize,
}

/// Row counts per period for one temporal column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalPatternSummary {
    pub column: String,
    pub granularity: TemporalGranularity,
    pub buckets: Vec<TemporalBucket>,
    /// Rows of the periods that did not fit in `buckets`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_periods: Option<OtherBucket>,
}

impl TemporalPatternSummary {
    /// Keep the first `max` buckets, merging the rest into `other_periods`.
    pub fn truncate_buckets(&mut self, max: usize) {
        if self.buckets.len() <= max {
            return;
        }
        let dropped = self.buckets.split_off(max);
        let other = self.other_periods.get_or_insert_with(OtherBucket::default);
        for bucket in dropped {
            other.count += bucket.count;
            other.distinct_values += 1;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_balance: Option<ClassBalance>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub temporal_patterns: Vec<TemporalPatternSummary>,
}

impl DomainMetrics {
    pub fn is_empty(&self) -> bool {
        self.class_balance.is_none() && self.temporal_patterns.is_empty()
    }
}

// ============================================================================
// Samples
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    /// Fewer rows than available were drawn.
    Sampled,
    /// The request covered the whole table so every row was returned.
    Exhaustive,
    /// Rows were requested from an empty table.
    Impossible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumAllocation {
    pub label: String,
    pub population: usize,
    pub allocated: usize,
}

/// Row indices selected by the sampling engine, ascending and unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    pub strategy: SampleStrategy,
    pub requested: usize,
    pub status: SampleStatus,
    pub indices: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stratify_column: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub strata: Vec<StratumAllocation>,
    /// Position in `strata` of each entry of `indices`.
    #[serde(skip)]
    pub membership: Vec<usize>,
}

impl SampleSet {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
