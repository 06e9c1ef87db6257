//! Column type inference.
//!
//! Each chunk contributes a [`TypeVotes`] tally per column; tallies merge by
//! addition and are resolved once into an [`InferredType`]. Resolution order
//! is boolean, numeric, temporal, then categorical vs text by distinct ratio.

use std::collections::HashSet;

use polars::prelude::*;

use crate::config::AnalysisConfig;
use crate::types::ColumnType;
use crate::utils::{
    DtypeCategory, TEMPORAL_PATTERNS, get_dtype_category, looks_like_date, normalize_cell,
    parse_boolean_token, parse_numeric_string,
};

/// Per-column parse tallies for type resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeVotes {
    pub dtype: DtypeCategory,
    pub non_missing: usize,
    pub missing: usize,
    pub boolean_hits: usize,
    pub numeric_hits: usize,
    /// Hits per entry of [`TEMPORAL_PATTERNS`].
    pub temporal_hits: Vec<usize>,
    distinct: HashSet<String>,
    distinct_capacity: usize,
    distinct_overflow: bool,
}

impl TypeVotes {
    pub fn new(dtype: DtypeCategory, distinct_capacity: usize) -> Self {
        Self {
            dtype,
            non_missing: 0,
            missing: 0,
            boolean_hits: 0,
            numeric_hits: 0,
            temporal_hits: vec![0; TEMPORAL_PATTERNS.len()],
            distinct: HashSet::new(),
            distinct_capacity,
            distinct_overflow: false,
        }
    }

    fn observe_distinct(&mut self, value: &str) {
        if self.distinct_overflow || self.distinct.contains(value) {
            return;
        }
        if self.distinct.len() >= self.distinct_capacity {
            self.distinct_overflow = true;
            self.distinct.clear();
        } else {
            self.distinct.insert(value.to_string());
        }
    }

    /// Tally a normalized text cell.
    pub fn observe_text(&mut self, value: &str) {
        self.non_missing += 1;
        self.observe_distinct(value);
        if parse_boolean_token(value).is_some() {
            self.boolean_hits += 1;
        }
        if parse_numeric_string(value).is_some() {
            self.numeric_hits += 1;
            return;
        }
        if looks_like_date(value) {
            for (hits, pattern) in self.temporal_hits.iter_mut().zip(TEMPORAL_PATTERNS.iter()) {
                if pattern.parse(value).is_some() {
                    *hits += 1;
                }
            }
        }
    }

    /// Tally a native numeric cell.
    pub fn observe_number(&mut self, value: f64) {
        self.non_missing += 1;
        self.numeric_hits += 1;
        if value == 0.0 || value == 1.0 {
            self.boolean_hits += 1;
        }
        self.observe_distinct(&value.to_string());
    }

    /// Tally a native boolean cell.
    pub fn observe_bool(&mut self, value: bool) {
        self.non_missing += 1;
        self.boolean_hits += 1;
        self.observe_distinct(if value { "true" } else { "false" });
    }

    /// Tally a cell of a native date/datetime column.
    pub fn observe_native_temporal(&mut self, rendered: &str) {
        self.non_missing += 1;
        self.observe_distinct(rendered);
    }

    pub fn observe_missing(&mut self) {
        self.missing += 1;
    }

    pub fn merge(&mut self, other: &TypeVotes) {
        self.non_missing += other.non_missing;
        self.missing += other.missing;
        self.boolean_hits += other.boolean_hits;
        self.numeric_hits += other.numeric_hits;
        for (mine, theirs) in self.temporal_hits.iter_mut().zip(&other.temporal_hits) {
            *mine += theirs;
        }
        if other.distinct_overflow {
            self.distinct_overflow = true;
            self.distinct.clear();
        }
        if !self.distinct_overflow {
            for value in &other.distinct {
                self.observe_distinct(value);
                if self.distinct_overflow {
                    break;
                }
            }
        }
    }

    /// Distinct values seen, or `None` once the bounded set overflowed.
    pub fn distinct_count(&self) -> Option<usize> {
        (!self.distinct_overflow).then_some(self.distinct.len())
    }
}

/// Resolved type of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferredType {
    pub column_type: ColumnType,
    /// Index into [`TEMPORAL_PATTERNS`] for text-encoded temporal columns.
    pub temporal_pattern: Option<usize>,
    /// Set when no single type reached the parse threshold although some were close.
    pub ambiguous: bool,
}

impl InferredType {
    pub fn new(column_type: ColumnType) -> Self {
        Self {
            column_type,
            temporal_pattern: None,
            ambiguous: false,
        }
    }
}

/// Infers column types from native dtypes and cell contents.
#[derive(Debug, Clone)]
pub struct ColumnTypeInferencer {
    parse_threshold: f64,
    categorical_ratio: f64,
    distinct_capacity: usize,
}

// Parse rates at or above this, without reaching the threshold, mark a mixed column.
const AMBIGUITY_FLOOR: f64 = 0.5;

impl ColumnTypeInferencer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            parse_threshold: config.type_parse_threshold,
            categorical_ratio: config.categorical_ratio_threshold,
            distinct_capacity: config.frequency_capacity,
        }
    }

    /// Tally one column of a chunk.
    pub fn votes(&self, series: &Series) -> PolarsResult<TypeVotes> {
        let dtype = get_dtype_category(series.dtype());
        let mut votes = TypeVotes::new(dtype, self.distinct_capacity);

        match dtype {
            DtypeCategory::Numeric => {
                let floats = series.cast(&DataType::Float64)?;
                for value in floats.f64()?.into_iter() {
                    match value.filter(|v| v.is_finite()) {
                        Some(v) => votes.observe_number(v),
                        None => votes.observe_missing(),
                    }
                }
            }
            DtypeCategory::Boolean => {
                for value in series.bool()?.into_iter() {
                    match value {
                        Some(v) => votes.observe_bool(v),
                        None => votes.observe_missing(),
                    }
                }
            }
            DtypeCategory::Temporal => {
                let rendered = series.cast(&DataType::String)?;
                for value in rendered.str()?.into_iter() {
                    match value {
                        Some(v) => votes.observe_native_temporal(v),
                        None => votes.observe_missing(),
                    }
                }
            }
            DtypeCategory::String | DtypeCategory::Other => {
                let rendered = series.cast(&DataType::String)?;
                for value in rendered.str()?.into_iter() {
                    match value.and_then(normalize_cell) {
                        Some(v) => votes.observe_text(v),
                        None => votes.observe_missing(),
                    }
                }
            }
        }

        Ok(votes)
    }

    /// Resolve merged tallies into a column type.
    pub fn resolve(&self, votes: &TypeVotes) -> InferredType {
        if votes.non_missing == 0 {
            return InferredType {
                column_type: ColumnType::Text,
                temporal_pattern: None,
                ambiguous: true,
            };
        }
        match votes.dtype {
            DtypeCategory::Boolean => return InferredType::new(ColumnType::Boolean),
            DtypeCategory::Temporal => return InferredType::new(ColumnType::Temporal),
            _ => {}
        }
        if votes.boolean_hits == votes.non_missing {
            return InferredType::new(ColumnType::Boolean);
        }

        let total = votes.non_missing as f64;
        let numeric_rate = votes.numeric_hits as f64 / total;
        if votes.dtype == DtypeCategory::Numeric || numeric_rate >= self.parse_threshold {
            return InferredType::new(ColumnType::Numeric);
        }

        let mut best_temporal_rate: f64 = 0.0;
        for (index, hits) in votes.temporal_hits.iter().enumerate() {
            let rate = *hits as f64 / total;
            if rate >= self.parse_threshold {
                return InferredType {
                    column_type: ColumnType::Temporal,
                    temporal_pattern: Some(index),
                    ambiguous: false,
                };
            }
            best_temporal_rate = best_temporal_rate.max(rate);
        }

        if numeric_rate >= AMBIGUITY_FLOOR || best_temporal_rate >= AMBIGUITY_FLOOR {
            return InferredType {
                column_type: ColumnType::Text,
                temporal_pattern: None,
                ambiguous: true,
            };
        }

        match votes.distinct_count() {
            Some(distinct) if (distinct as f64 / total) < self.categorical_ratio => {
                InferredType::new(ColumnType::Categorical)
            }
            _ => InferredType::new(ColumnType::Text),
        }
    }

    /// Single-pass inference over a whole series.
    pub fn infer(&self, series: &Series) -> PolarsResult<InferredType> {
        Ok(self.resolve(&self.votes(series)?))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn inferencer() -> ColumnTypeInferencer {
        ColumnTypeInferencer::new(&AnalysisConfig::default())
    }

    fn infer_strs(values: &[Option<&str>]) -> InferredType {
        let series = Series::new("col".into(), values);
        inferencer().infer(&series).unwrap()
    }

    #[test]
    fn test_all_missing_is_ambiguous_text() {
        let inferred = infer_strs(&[None, Some("N/A"), Some("")]);
        assert_eq!(inferred.column_type, ColumnType::Text);
        assert!(inferred.ambiguous);
    }

    #[test]
    fn test_native_boolean() {
        let series = Series::new("flag".into(), &[true, false, true]);
        assert_eq!(inferencer().infer(&series).unwrap().column_type, ColumnType::Boolean);
    }

    #[test]
    fn test_localized_boolean_tokens() {
        let inferred = infer_strs(&[Some("sim"), Some("não"), Some("Sim"), None]);
        assert_eq!(inferred.column_type, ColumnType::Boolean);
    }

    #[test]
    fn test_native_zero_one_integers_are_boolean() {
        let series = Series::new("Class".into(), &[0i64, 0, 0, 1]);
        assert_eq!(inferencer().infer(&series).unwrap().column_type, ColumnType::Boolean);
    }

    #[test]
    fn test_native_numeric() {
        let series = Series::new("amount".into(), &[10.0, 20.5, 30.0]);
        assert_eq!(inferencer().infer(&series).unwrap().column_type, ColumnType::Numeric);
    }

    #[test]
    fn test_numeric_strings_with_locale_marks() {
        let inferred = infer_strs(&[Some("1.234,56"), Some("12,5"), Some("3"), Some("n/a")]);
        assert_eq!(inferred.column_type, ColumnType::Numeric);
    }

    #[test]
    fn test_numeric_threshold_boundary() {
        // 19 of 20 parse: exactly 0.95
        let mut values: Vec<Option<String>> = (2..21).map(|i| Some(i.to_string())).collect();
        values.push(Some("oops".to_string()));
        let series = Series::new("x".into(), values);
        assert_eq!(inferencer().infer(&series).unwrap().column_type, ColumnType::Numeric);

        // 18 of 20 parse: mixed
        let mut values: Vec<Option<String>> = (2..20).map(|i| Some(i.to_string())).collect();
        values.push(Some("oops".to_string()));
        values.push(Some("bad".to_string()));
        let series = Series::new("x".into(), values);
        let inferred = inferencer().infer(&series).unwrap();
        assert_eq!(inferred.column_type, ColumnType::Text);
        assert!(inferred.ambiguous);
    }

    #[test]
    fn test_iso_dates() {
        let inferred = infer_strs(&[Some("2024-01-15"), Some("2024-02-20"), Some("2024-03-25")]);
        assert_eq!(inferred.column_type, ColumnType::Temporal);
        let pattern = TEMPORAL_PATTERNS[inferred.temporal_pattern.unwrap()];
        assert_eq!(pattern.label(), "%Y-%m-%d");
    }

    #[test]
    fn test_day_first_wins_over_month_first() {
        let inferred = infer_strs(&[Some("01/02/2024"), Some("03/04/2024"), Some("05/06/2024")]);
        let pattern = TEMPORAL_PATTERNS[inferred.temporal_pattern.unwrap()];
        assert_eq!(pattern.label(), "%d/%m/%Y");
    }

    #[test]
    fn test_month_first_when_day_first_fails() {
        let inferred = infer_strs(&[Some("01/15/2024"), Some("02/28/2024"), Some("12/31/2024")]);
        let pattern = TEMPORAL_PATTERNS[inferred.temporal_pattern.unwrap()];
        assert_eq!(pattern.label(), "%m/%d/%Y");
    }

    #[test]
    fn test_categorical_vs_text() {
        let categorical: Vec<Option<String>> =
            (0..100).map(|i| Some(format!("cat_{}", i % 5))).collect();
        let series = Series::new("c".into(), categorical);
        assert_eq!(inferencer().infer(&series).unwrap().column_type, ColumnType::Categorical);

        let text: Vec<Option<String>> = (0..100).map(|i| Some(format!("note {i}"))).collect();
        let series = Series::new("t".into(), text);
        assert_eq!(inferencer().infer(&series).unwrap().column_type, ColumnType::Text);
    }

    #[test]
    fn test_merged_votes_match_single_pass() {
        let values: Vec<Option<String>> = (0..60)
            .map(|i| if i % 7 == 0 { None } else { Some(format!("v{}", i % 4)) })
            .collect();
        let series = Series::new("c".into(), values);
        let inf = inferencer();

        let whole = inf.votes(&series).unwrap();
        let mut merged = inf.votes(&series.slice(0, 25)).unwrap();
        merged.merge(&inf.votes(&series.slice(25, 35)).unwrap());

        assert_eq!(merged.non_missing, whole.non_missing);
        assert_eq!(merged.missing, whole.missing);
        assert_eq!(merged.distinct_count(), whole.distinct_count());
        assert_eq!(inf.resolve(&merged), inf.resolve(&whole));
    }

    #[test]
    fn test_distinct_overflow_forces_text() {
        let config = AnalysisConfig::builder()
            .frequency_capacity(50)
            .categorical_top_k(10)
            .build()
            .unwrap();
        let inf = ColumnTypeInferencer::new(&config);
        let values: Vec<Option<String>> =
            (0..1000).map(|i| Some(format!("k{}", i % 200))).collect();
        let votes = inf.votes(&Series::new("c".into(), values)).unwrap();
        assert_eq!(votes.distinct_count(), None);
        assert_eq!(inf.resolve(&votes).column_type, ColumnType::Text);
    }
}
