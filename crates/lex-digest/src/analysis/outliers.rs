//! IQR-rule outlier detection.
//!
//! Bounds come from the quartiles computed during aggregation; flagging
//! happens in the row pass so indices refer to rows of the source table.

use crate::config::{AnalysisConfig, OutlierMethod};
use crate::types::{ColumnOutliers, ColumnProfile, OutlierReport, QuantileMethod};

/// Inclusive fences for one numeric column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierBounds {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
    pub quantile_method: QuantileMethod,
}

impl OutlierBounds {
    /// `[q1 - m * iqr, q3 + m * iqr]`.
    pub fn from_quartiles(
        q1: f64,
        q3: f64,
        multiplier: f64,
        quantile_method: QuantileMethod,
    ) -> Self {
        let iqr = q3 - q1;
        Self {
            q1,
            q3,
            lower: q1 - multiplier * iqr,
            upper: q3 + multiplier * iqr,
            quantile_method,
        }
    }

    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }
}

/// Flags values outside the IQR fences.
#[derive(Debug, Clone)]
pub struct OutlierDetector {
    method: OutlierMethod,
    multiplier: f64,
    max_indices: usize,
}

impl OutlierDetector {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            method: config.outlier_method,
            multiplier: config.iqr_multiplier,
            max_indices: config.max_outlier_indices,
        }
    }

    /// Bounds for a numeric profile; `None` for other types or empty columns.
    pub fn bounds(&self, profile: &ColumnProfile) -> Option<OutlierBounds> {
        let stats = profile.numeric_stats()?;
        match self.method {
            OutlierMethod::Iqr => Some(OutlierBounds::from_quartiles(
                stats.quartiles.q1,
                stats.quartiles.q3,
                self.multiplier,
                stats.quantile_method,
            )),
        }
    }

    pub fn accumulator(
        &self,
        column: impl Into<String>,
        bounds: OutlierBounds,
    ) -> OutlierAccumulator {
        OutlierAccumulator {
            column: column.into(),
            bounds,
            evaluated: 0,
            count: 0,
            indices: Vec::new(),
            max_indices: self.max_indices,
        }
    }

    /// Flag a fully materialized column in one call.
    pub fn detect(
        &self,
        column: &str,
        values: &[Option<f64>],
        bounds: OutlierBounds,
    ) -> ColumnOutliers {
        let mut acc = self.accumulator(column, bounds);
        acc.absorb(0, values);
        acc.finish()
    }

    pub fn report(&self, columns: Vec<ColumnOutliers>) -> OutlierReport {
        OutlierReport {
            method: self.method,
            multiplier: self.multiplier,
            columns,
        }
    }
}

/// Per-column outlier tally over row chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierAccumulator {
    column: String,
    bounds: OutlierBounds,
    evaluated: usize,
    count: usize,
    indices: Vec<usize>,
    max_indices: usize,
}

impl OutlierAccumulator {
    /// Evaluate a chunk whose first row is row `offset` of the table.
    pub fn absorb(&mut self, offset: usize, values: &[Option<f64>]) {
        for (i, value) in values.iter().enumerate() {
            let Some(v) = value else { continue };
            self.evaluated += 1;
            if self.bounds.is_outlier(*v) {
                self.count += 1;
                if self.indices.len() < self.max_indices {
                    self.indices.push(offset + i);
                }
            }
        }
    }

    /// Merge a later chunk's tally.
    pub fn merge(&mut self, other: &OutlierAccumulator) {
        self.evaluated += other.evaluated;
        self.count += other.count;
        let room = self.max_indices.saturating_sub(self.indices.len());
        self.indices.extend(other.indices.iter().take(room));
    }

    pub fn finish(self) -> ColumnOutliers {
        let outlier_percentage = if self.evaluated == 0 {
            0.0
        } else {
            self.count as f64 / self.evaluated as f64 * 100.0
        };
        ColumnOutliers {
            indices_truncated: self.indices.len() < self.count,
            column: self.column,
            q1: self.bounds.q1,
            q3: self.bounds.q3,
            lower_bound: self.bounds.lower,
            upper_bound: self.bounds.upper,
            quantile_method: self.bounds.quantile_method,
            evaluated_count: self.evaluated,
            outlier_count: self.count,
            outlier_percentage,
            indices: self.indices,
        }
    }
}
