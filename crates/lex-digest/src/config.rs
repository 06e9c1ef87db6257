//! Configuration types for dataset analysis.
//!
//! [`AnalysisConfig`] can be assembled three ways: the fluent builder,
//! JSON (e.g. from a calling service), or `LEX_DIGEST_*` environment
//! variables. All three paths end in [`AnalysisConfig::validate`].

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Smallest report budget accepted. A report skeleton with every optional
/// section dropped must still fit.
pub const MIN_REPORT_BYTES: usize = 1024;

/// Strategy used by the sampling engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SampleStrategy {
    /// First `ceil(k/2)` and last `floor(k/2)` rows.
    #[default]
    HeadTail,
    /// Seeded uniform sample without replacement.
    Random,
    /// Proportional allocation across the strata of one column.
    Stratified,
}

impl SampleStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeadTail => "head_tail",
            Self::Random => "random",
            Self::Stratified => "stratified",
        }
    }
}

impl FromStr for SampleStrategy {
    type Err = ConfigValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "head_tail" | "headtail" | "head-tail" => Ok(Self::HeadTail),
            "random" => Ok(Self::Random),
            "stratified" => Ok(Self::Stratified),
            other => Err(ConfigValidationError::UnknownVariant {
                field: "sample_strategy".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Outlier detection method. Only the interquartile-range rule is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    /// Values outside `[Q1 - m*IQR, Q3 + m*IQR]`.
    #[default]
    Iqr,
}

/// Configuration for dataset analysis.
///
/// Use [`AnalysisConfig::builder()`] for a validated configuration.
///
/// # Example
///
/// ```rust,ignore
/// use lex_digest::config::{AnalysisConfig, SampleStrategy};
///
/// let config = AnalysisConfig::builder()
///     .chunk_size(5_000)
///     .sample_strategy(SampleStrategy::Stratified)
///     .max_report_bytes(32 * 1024)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Rows per chunk on the streaming path.
    /// Default: 10000
    pub chunk_size: usize,

    /// Tables with more rows than this go through the chunked path and use
    /// approximate quartiles; smaller tables get one whole-table pass with
    /// exact order statistics.
    /// Default: 100000
    pub in_memory_row_limit: usize,

    /// Hard upper bound on the serialized report size in bytes.
    /// Default: 65536
    pub max_report_bytes: usize,

    /// Target number of sampled rows.
    /// Default: 100
    pub sample_size: usize,

    /// Sampling strategy.
    /// Default: HeadTail
    pub sample_strategy: SampleStrategy,

    /// Seed for random and stratified sampling.
    /// Default: 42
    pub random_seed: u64,

    /// Explicit buckets kept per categorical column before the "other" bucket.
    /// Default: 50
    pub categorical_top_k: usize,

    /// Outlier detection method.
    /// Default: Iqr
    pub outlier_method: OutlierMethod,

    /// IQR fence multiplier.
    /// Default: 1.5
    pub iqr_multiplier: f64,

    /// Column names (case-insensitive) that mark a binary class column.
    /// Default: ["class", "fraud", "is_fraud"]
    pub domain_alias_columns: Vec<String>,

    /// Name fragments (case-insensitive) that mark an amount-like column.
    /// Default: ["amount", "value"]
    pub amount_alias_columns: Vec<String>,

    /// Column used for stratified sampling. When unset the class column (if
    /// any) or the first categorical/boolean column is used.
    /// Default: None
    pub stratify_column: Option<String>,

    /// Maximum temporal buckets before the remainder folds into "other period".
    /// Default: 24
    pub max_temporal_buckets: usize,

    /// Numeric column count above which the budget policy may replace the
    /// correlation matrix with top pairs.
    /// Default: 30
    pub high_column_threshold: usize,

    /// Number of ranked pairs kept when the matrix is replaced.
    /// Default: 20
    pub top_correlation_pairs: usize,

    /// `|r|` at or above which a pair is reported as strong.
    /// Default: 0.7
    pub strong_correlation_threshold: f64,

    /// Minimum pairwise-complete rows for a correlation coefficient.
    /// Default: 2
    pub min_joint_samples: usize,

    /// Distinct keys tracked per column before overflow.
    /// Default: 10000
    pub frequency_capacity: usize,

    /// Share of non-missing values that must parse for numeric/temporal types.
    /// Default: 0.95
    pub type_parse_threshold: f64,

    /// `distinct / count` below which a string column is categorical.
    /// Default: 0.5
    pub categorical_ratio_threshold: f64,

    /// Accuracy parameter of the approximate quantile sketch.
    /// Default: 256
    pub quantile_sketch_k: usize,

    /// Row indices listed per column in the outlier section.
    /// Default: 1000
    pub max_outlier_indices: usize,

    /// Whether the sample carries cell text for each sampled row.
    /// Default: true
    pub include_sample_rows: bool,

    /// Whether chunk work runs on the rayon pool.
    /// Default: true
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10_000,
            in_memory_row_limit: 100_000,
            max_report_bytes: 64 * 1024,
            sample_size: 100,
            sample_strategy: SampleStrategy::default(),
            random_seed: 42,
            categorical_top_k: 50,
            outlier_method: OutlierMethod::default(),
            iqr_multiplier: 1.5,
            domain_alias_columns: default_domain_aliases(),
            amount_alias_columns: default_amount_aliases(),
            stratify_column: None,
            max_temporal_buckets: 24,
            high_column_threshold: 30,
            top_correlation_pairs: 20,
            strong_correlation_threshold: 0.7,
            min_joint_samples: 2,
            frequency_capacity: 10_000,
            type_parse_threshold: 0.95,
            categorical_ratio_threshold: 0.5,
            quantile_sketch_k: 256,
            max_outlier_indices: 1000,
            include_sample_rows: true,
            parallel: true,
        }
    }
}

fn default_domain_aliases() -> Vec<String> {
    ["class", "fraud", "is_fraud"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_amount_aliases() -> Vec<String> {
    ["amount", "value"].iter().map(|s| s.to_string()).collect()
}

impl AnalysisConfig {
    /// Create a new configuration builder.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigValidationError> {
        let config: AnalysisConfig = serde_json::from_str(json)
            .map_err(|e| ConfigValidationError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from `LEX_DIGEST_*` environment variables on top
    /// of the defaults.
    pub fn from_env() -> Result<Self, ConfigValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("LEX_DIGEST_CHUNK_SIZE") {
            config.chunk_size = parse_env("LEX_DIGEST_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("LEX_DIGEST_IN_MEMORY_ROW_LIMIT") {
            config.in_memory_row_limit = parse_env("LEX_DIGEST_IN_MEMORY_ROW_LIMIT", &v)?;
        }
        if let Some(v) = lookup("LEX_DIGEST_MAX_REPORT_BYTES") {
            config.max_report_bytes = parse_env("LEX_DIGEST_MAX_REPORT_BYTES", &v)?;
        }
        if let Some(v) = lookup("LEX_DIGEST_SAMPLE_SIZE") {
            config.sample_size = parse_env("LEX_DIGEST_SAMPLE_SIZE", &v)?;
        }
        if let Some(v) = lookup("LEX_DIGEST_SAMPLE_STRATEGY") {
            config.sample_strategy = v.parse()?;
        }
        if let Some(v) = lookup("LEX_DIGEST_RANDOM_SEED") {
            config.random_seed = parse_env("LEX_DIGEST_RANDOM_SEED", &v)?;
        }
        if let Some(v) = lookup("LEX_DIGEST_CATEGORICAL_TOP_K") {
            config.categorical_top_k = parse_env("LEX_DIGEST_CATEGORICAL_TOP_K", &v)?;
        }
        if let Some(v) = lookup("LEX_DIGEST_DOMAIN_ALIAS_COLUMNS") {
            config.domain_alias_columns = split_list(&v);
        }
        if let Some(v) = lookup("LEX_DIGEST_STRATIFY_COLUMN") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                config.stratify_column = Some(trimmed.to_string());
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let non_zero = [
            ("chunk_size", self.chunk_size),
            ("in_memory_row_limit", self.in_memory_row_limit),
            ("categorical_top_k", self.categorical_top_k),
            ("max_temporal_buckets", self.max_temporal_buckets),
            ("top_correlation_pairs", self.top_correlation_pairs),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigValidationError::ZeroValue(field.to_string()));
            }
        }

        if self.max_report_bytes < MIN_REPORT_BYTES {
            return Err(ConfigValidationError::ReportBudgetTooSmall(
                self.max_report_bytes,
            ));
        }

        if self.frequency_capacity < self.categorical_top_k {
            return Err(ConfigValidationError::FrequencyCapacityTooSmall {
                capacity: self.frequency_capacity,
                top_k: self.categorical_top_k,
            });
        }

        if self.min_joint_samples < 2 {
            return Err(ConfigValidationError::InvalidMinJointSamples(
                self.min_joint_samples,
            ));
        }

        if self.quantile_sketch_k < 8 {
            return Err(ConfigValidationError::InvalidSketchK(self.quantile_sketch_k));
        }

        if !self.iqr_multiplier.is_finite() || self.iqr_multiplier <= 0.0 {
            return Err(ConfigValidationError::InvalidMultiplier(self.iqr_multiplier));
        }

        let ratios = [
            ("type_parse_threshold", self.type_parse_threshold),
            ("categorical_ratio_threshold", self.categorical_ratio_threshold),
            (
                "strong_correlation_threshold",
                self.strong_correlation_threshold,
            ),
        ];
        for (field, value) in ratios {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigValidationError::InvalidThreshold {
                    field: field.to_string(),
                    value,
                });
            }
        }

        Ok(())
    }

    /// Whether a column name matches the class alias set.
    pub fn is_domain_alias(&self, column: &str) -> bool {
        let lower = column.trim().to_lowercase();
        self.domain_alias_columns
            .iter()
            .any(|alias| alias.trim().to_lowercase() == lower)
    }

    /// Whether a column name looks amount-like.
    pub fn is_amount_alias(&self, column: &str) -> bool {
        let lower = column.to_lowercase();
        self.amount_alias_columns
            .iter()
            .any(|alias| !alias.is_empty() && lower.contains(&alias.to_lowercase()))
    }
}

fn parse_env<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigValidationError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigValidationError::InvalidEnvValue {
            var: var.to_string(),
            value: value.to_string(),
        })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("'{0}' must be greater than zero")]
    ZeroValue(String),

    #[error("Invalid threshold for '{field}': {value} (must be in (0.0, 1.0])")]
    InvalidThreshold { field: String, value: f64 },

    #[error("max_report_bytes {0} is below the minimum of {min}", min = MIN_REPORT_BYTES)]
    ReportBudgetTooSmall(usize),

    #[error("frequency_capacity {capacity} must be at least categorical_top_k {top_k}")]
    FrequencyCapacityTooSmall { capacity: usize, top_k: usize },

    #[error("min_joint_samples {0} must be at least 2")]
    InvalidMinJointSamples(usize),

    #[error("quantile_sketch_k {0} must be at least 8")]
    InvalidSketchK(usize),

    #[error("iqr_multiplier {0} must be a positive finite number")]
    InvalidMultiplier(f64),

    #[error("Unknown value '{value}' for '{field}'")]
    UnknownVariant { field: String, value: String },

    #[error("Environment variable {var} has invalid value '{value}'")]
    InvalidEnvValue { var: String, value: String },

    #[error("Malformed configuration: {0}")]
    Malformed(String),
}

/// Builder for [`AnalysisConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn chunk_size(mut self, rows: usize) -> Self {
        self.config.chunk_size = rows;
        self
    }

    pub fn in_memory_row_limit(mut self, rows: usize) -> Self {
        self.config.in_memory_row_limit = rows;
        self
    }

    pub fn max_report_bytes(mut self, bytes: usize) -> Self {
        self.config.max_report_bytes = bytes;
        self
    }

    pub fn sample_size(mut self, k: usize) -> Self {
        self.config.sample_size = k;
        self
    }

    pub fn sample_strategy(mut self, strategy: SampleStrategy) -> Self {
        self.config.sample_strategy = strategy;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;
        self
    }

    pub fn categorical_top_k(mut self, k: usize) -> Self {
        self.config.categorical_top_k = k;
        self
    }

    pub fn outlier_method(mut self, method: OutlierMethod) -> Self {
        self.config.outlier_method = method;
        self
    }

    pub fn iqr_multiplier(mut self, multiplier: f64) -> Self {
        self.config.iqr_multiplier = multiplier;
        self
    }

    /// Replace the class-column alias set.
    pub fn domain_alias_columns<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.domain_alias_columns = aliases.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the amount-column name fragments.
    pub fn amount_alias_columns<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.amount_alias_columns = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn stratify_column(mut self, column: impl Into<String>) -> Self {
        self.config.stratify_column = Some(column.into());
        self
    }

    pub fn max_temporal_buckets(mut self, buckets: usize) -> Self {
        self.config.max_temporal_buckets = buckets;
        self
    }

    pub fn high_column_threshold(mut self, columns: usize) -> Self {
        self.config.high_column_threshold = columns;
        self
    }

    pub fn top_correlation_pairs(mut self, pairs: usize) -> Self {
        self.config.top_correlation_pairs = pairs;
        self
    }

    pub fn strong_correlation_threshold(mut self, threshold: f64) -> Self {
        self.config.strong_correlation_threshold = threshold;
        self
    }

    pub fn min_joint_samples(mut self, rows: usize) -> Self {
        self.config.min_joint_samples = rows;
        self
    }

    pub fn frequency_capacity(mut self, keys: usize) -> Self {
        self.config.frequency_capacity = keys;
        self
    }

    pub fn type_parse_threshold(mut self, threshold: f64) -> Self {
        self.config.type_parse_threshold = threshold;
        self
    }

    pub fn categorical_ratio_threshold(mut self, threshold: f64) -> Self {
        self.config.categorical_ratio_threshold = threshold;
        self
    }

    pub fn quantile_sketch_k(mut self, k: usize) -> Self {
        self.config.quantile_sketch_k = k;
        self
    }

    pub fn max_outlier_indices(mut self, indices: usize) -> Self {
        self.config.max_outlier_indices = indices;
        self
    }

    pub fn include_sample_rows(mut self, include: bool) -> Self {
        self.config.include_sample_rows = include;
        self
    }

    /// Enable or disable running chunk work on the rayon pool.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `AnalysisConfig` or an error if validation fails.
    pub fn build(self) -> Result<AnalysisConfig, ConfigValidationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert_eq!(config.chunk_size, 10_000);
        assert_eq!(config.categorical_top_k, 50);
        assert_eq!(config.sample_strategy, SampleStrategy::HeadTail);
        assert_eq!(config.outlier_method, OutlierMethod::Iqr);
        assert_eq!(config.iqr_multiplier, 1.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = AnalysisConfig::builder()
            .chunk_size(500)
            .sample_size(20)
            .sample_strategy(SampleStrategy::Random)
            .random_seed(7)
            .domain_alias_columns(["label"])
            .build()
            .unwrap();

        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.sample_size, 20);
        assert_eq!(config.sample_strategy, SampleStrategy::Random);
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.domain_alias_columns, vec!["label".to_string()]);
    }

    #[test]
    fn test_validation_zero_chunk_size() {
        let result = AnalysisConfig::builder().chunk_size(0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::ZeroValue(field) if field == "chunk_size"
        ));
    }

    #[test]
    fn test_validation_budget_floor() {
        let result = AnalysisConfig::builder().max_report_bytes(100).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::ReportBudgetTooSmall(100)
        ));
    }

    #[test]
    fn test_validation_threshold_range() {
        let result = AnalysisConfig::builder().type_parse_threshold(1.5).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidThreshold { .. }
        ));
    }

    #[test]
    fn test_validation_capacity_below_top_k() {
        let result = AnalysisConfig::builder()
            .categorical_top_k(100)
            .frequency_capacity(10)
            .build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::FrequencyCapacityTooSmall { .. }
        ));
    }

    #[test]
    fn test_alias_matching_is_case_insensitive() {
        let config = AnalysisConfig::default();
        assert!(config.is_domain_alias("Class"));
        assert!(config.is_domain_alias("IS_FRAUD"));
        assert!(!config.is_domain_alias("classification_score"));
        assert!(config.is_amount_alias("TransactionAmount"));
        assert!(!config.is_amount_alias("Time"));
    }

    #[test]
    fn test_config_from_partial_json() {
        let json = r#"{
            "chunk_size": 2000,
            "sample_strategy": "stratified",
            "domain_alias_columns": ["label", "target"]
        }"#;

        let config = AnalysisConfig::from_json_str(json).expect("partial JSON should parse");
        assert_eq!(config.chunk_size, 2000);
        assert_eq!(config.sample_strategy, SampleStrategy::Stratified);
        assert_eq!(config.domain_alias_columns.len(), 2);
        assert_eq!(config.categorical_top_k, 50);
    }

    #[test]
    fn test_config_from_json_rejects_invalid() {
        let result = AnalysisConfig::from_json_str(r#"{"chunk_size": 0}"#);
        assert!(result.is_err());

        let result = AnalysisConfig::from_json_str("not json");
        assert!(matches!(result, Err(ConfigValidationError::Malformed(_))));
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("LEX_DIGEST_CHUNK_SIZE", "250"),
            ("LEX_DIGEST_SAMPLE_STRATEGY", "random"),
            ("LEX_DIGEST_DOMAIN_ALIAS_COLUMNS", "label, outcome ,"),
        ]
        .into_iter()
        .collect();

        let config =
            AnalysisConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.chunk_size, 250);
        assert_eq!(config.sample_strategy, SampleStrategy::Random);
        assert_eq!(
            config.domain_alias_columns,
            vec!["label".to_string(), "outcome".to_string()]
        );
    }

    #[test]
    fn test_config_from_lookup_bad_number() {
        let result = AnalysisConfig::from_lookup(|key| {
            (key == "LEX_DIGEST_SAMPLE_SIZE").then(|| "lots".to_string())
        });
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidEnvValue { .. })
        ));
    }

    #[test]
    fn test_sample_strategy_from_str() {
        assert_eq!("head_tail".parse::<SampleStrategy>().unwrap(), SampleStrategy::HeadTail);
        assert_eq!("Stratified".parse::<SampleStrategy>().unwrap(), SampleStrategy::Stratified);
        assert!("reservoir".parse::<SampleStrategy>().is_err());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AnalysisConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"sample_strategy\":\"head_tail\""));
        let back: AnalysisConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
