//! Column profiling.
//!
//! This module turns merged column aggregates into [`ColumnProfile`]s:
//! - Type inference from parse votes
//! - Moment statistics and exact or sketched quartiles
//! - Top-K frequency tables for label-like columns

mod quantile;
mod statistics;
mod type_inference;

pub use quantile::QuantileSketch;
pub use statistics::{RunningStats, exact_quantile, exact_quartiles};
pub use type_inference::{ColumnTypeInferencer, InferredType, TypeVotes};

use polars::prelude::*;

use crate::aggregate::{ColumnAggregate, QuantileMode, QuantileState, extract_typed};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::types::{
    BooleanStats, CategoricalStats, ColumnProfile, ColumnType, NumericStats, QuantileMethod,
    TemporalGranularity, TemporalStats, TextStats, TypeStats,
};
use crate::utils::TEMPORAL_PATTERNS;

/// Builds column profiles from aggregates.
pub struct ColumnProfiler<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> ColumnProfiler<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Profile a whole series in one pass, with exact quartiles.
    pub fn profile_series(&self, series: &Series) -> Result<ColumnProfile> {
        let inferred = ColumnTypeInferencer::new(self.config).infer(series)?;
        let mut aggregate =
            ColumnAggregate::new(inferred.column_type, self.config, QuantileMode::Exact);
        aggregate.absorb(&extract_typed(series, &inferred)?);
        Ok(self.profile(series.name().as_str(), &inferred, aggregate))
    }

    pub fn profile(
        &self,
        name: &str,
        inferred: &InferredType,
        aggregate: ColumnAggregate,
    ) -> ColumnProfile {
        let rows = aggregate.rows;
        let missing_percentage = if rows == 0 {
            0.0
        } else {
            aggregate.missing as f64 / rows as f64 * 100.0
        };

        let stats = if aggregate.count == 0 {
            TypeStats::Empty
        } else {
            match inferred.column_type {
                ColumnType::Numeric => Self::numeric_stats(&aggregate),
                ColumnType::Boolean => TypeStats::Boolean(BooleanStats {
                    true_count: aggregate.true_count,
                    false_count: aggregate.false_count,
                    true_ratio: aggregate.true_count as f64 / aggregate.count as f64,
                }),
                ColumnType::Temporal => Self::temporal_stats(&aggregate, inferred),
                ColumnType::Categorical => {
                    let (top_values, other) = aggregate
                        .frequencies
                        .top_k(self.config.categorical_top_k, aggregate.count);
                    TypeStats::Categorical(CategoricalStats { top_values, other })
                }
                ColumnType::Text => TypeStats::Text(TextStats {
                    min_length: aggregate.min_length.unwrap_or(0),
                    max_length: aggregate.max_length.unwrap_or(0),
                    mean_length: aggregate.moments.mean().unwrap_or(0.0),
                }),
            }
        };

        ColumnProfile {
            name: name.to_string(),
            column_type: inferred.column_type,
            count: aggregate.count,
            missing_count: aggregate.missing,
            missing_percentage,
            invalid_count: aggregate.invalid,
            distinct_count: aggregate.frequencies.distinct_count(),
            distinct_count_exact: aggregate.frequencies.is_exact(),
            type_ambiguous: inferred.ambiguous,
            stats,
        }
    }

    fn numeric_stats(aggregate: &ColumnAggregate) -> TypeStats {
        let moments = &aggregate.moments;
        let (quartiles, quantile_method) = match &aggregate.quantiles {
            Some(QuantileState::Exact(values)) => {
                let mut values = values.clone();
                (exact_quartiles(&mut values), QuantileMethod::Exact)
            }
            Some(QuantileState::Sketch(sketch)) => {
                (sketch.quartiles(), QuantileMethod::Approximate)
            }
            None => (None, QuantileMethod::Exact),
        };
        let (Some(quartiles), Some(min), Some(max), Some(mean)) =
            (quartiles, moments.min(), moments.max(), moments.mean())
        else {
            return TypeStats::Empty;
        };
        TypeStats::Numeric(NumericStats {
            min,
            max,
            mean,
            std_dev: moments.std_dev(),
            variance: moments.variance(),
            sum: moments.sum(),
            skewness: moments.skewness(),
            quartiles,
            quantile_method,
        })
    }

    fn temporal_stats(aggregate: &ColumnAggregate, inferred: &InferredType) -> TypeStats {
        let (Some(min), Some(max)) = (aggregate.min_time, aggregate.max_time) else {
            return TypeStats::Empty;
        };
        let span = max - min;
        TypeStats::Temporal(TemporalStats {
            min,
            max,
            span_days: span.num_days(),
            span_hours: span.num_hours(),
            granularity: TemporalGranularity::for_span_days(span.num_days()),
            pattern: inferred
                .temporal_pattern
                .and_then(|i| TEMPORAL_PATTERNS.get(i))
                .map(|p| p.label().to_string()),
        })
    }
}
