//! Mergeable per-column aggregates and chunked execution.
//!
//! Every aggregate here is a monoid: `absorb` feeds one chunk, `merge` folds
//! two partial states, and merging in chunk order gives the same result as a
//! single pass (exactly for counts and extrema, up to rounding for moments,
//! and within the sketch error bound for approximate quantiles).

mod chunked;
mod extract;

pub use chunked::{Chunk, ChunkPlan, ChunkedAggregator};
pub use extract::{TypedColumn, TypedValues, boolean_label, extract_numeric_values, extract_typed};

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::config::AnalysisConfig;
use crate::profiler::{QuantileSketch, RunningStats};
use crate::types::{ColumnType, FrequencyBucket, OtherBucket};

// ============================================================================
// Frequency Counter
// ============================================================================

/// Value counts with a hard cap on tracked keys.
///
/// Below capacity the counts are exact. Once full, unseen keys go to an
/// overflow tally and the distinct count becomes a lower bound.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyCounter {
    counts: HashMap<String, usize>,
    capacity: usize,
    overflow_count: usize,
    overflowed: bool,
}

impl FrequencyCounter {
    pub fn new(capacity: usize) -> Self {
        Self {
            counts: HashMap::new(),
            capacity,
            overflow_count: 0,
            overflowed: false,
        }
    }

    pub fn add(&mut self, key: &str) {
        self.add_count(key, 1);
    }

    fn add_count(&mut self, key: &str, n: usize) {
        if let Some(count) = self.counts.get_mut(key) {
            *count += n;
        } else if self.counts.len() < self.capacity {
            self.counts.insert(key.to_string(), n);
        } else {
            self.overflow_count += n;
            self.overflowed = true;
        }
    }

    /// Fold another counter in, visiting its keys in sorted order so the
    /// result does not depend on hash iteration order.
    pub fn merge(&mut self, other: &FrequencyCounter) {
        let mut keys: Vec<(&String, &usize)> = other.counts.iter().collect();
        keys.sort_unstable_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (key, count) in keys {
            self.add_count(key, *count);
        }
        self.overflow_count += other.overflow_count;
        self.overflowed |= other.overflowed;
    }

    pub fn distinct_count(&self) -> usize {
        self.counts.len()
    }

    pub fn is_exact(&self) -> bool {
        !self.overflowed
    }

    pub fn get(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Entries sorted by count descending, then key ascending.
    pub fn sorted(&self) -> Vec<(String, usize)> {
        let mut entries: Vec<(String, usize)> =
            self.counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    /// The `k` most frequent values plus a bucket for everything else.
    ///
    /// `total` is the number of non-missing values and drives percentages.
    pub fn top_k(&self, k: usize, total: usize) -> (Vec<FrequencyBucket>, Option<OtherBucket>) {
        let entries = self.sorted();
        let percentage = |count: usize| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64 * 100.0
            }
        };

        let top = entries
            .iter()
            .take(k)
            .map(|(value, count)| FrequencyBucket {
                value: value.clone(),
                count: *count,
                percentage: percentage(*count),
            })
            .collect();

        let rest = entries.get(k..).unwrap_or(&[]);
        let other = if rest.is_empty() && !self.overflowed {
            None
        } else {
            Some(OtherBucket {
                count: rest.iter().map(|(_, c)| c).sum::<usize>() + self.overflow_count,
                distinct_values: rest.len(),
            })
        };
        (top, other)
    }
}

// ============================================================================
// Quantile State
// ============================================================================

/// Exact values for in-memory tables, a sketch for chunked ones.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantileState {
    Exact(Vec<f64>),
    Sketch(QuantileSketch),
}

impl QuantileState {
    pub fn insert(&mut self, value: f64) {
        match self {
            Self::Exact(values) => values.push(value),
            Self::Sketch(sketch) => sketch.insert(value),
        }
    }

    pub fn merge(&mut self, other: &QuantileState) {
        let promoted = match (&*self, other) {
            (Self::Exact(values), Self::Sketch(theirs)) => {
                let mut sketch = theirs.clone();
                for v in values {
                    sketch.insert(*v);
                }
                Some(sketch)
            }
            _ => None,
        };
        if let Some(sketch) = promoted {
            *self = Self::Sketch(sketch);
            return;
        }

        match (self, other) {
            (Self::Exact(mine), Self::Exact(theirs)) => mine.extend_from_slice(theirs),
            (Self::Sketch(mine), Self::Sketch(theirs)) => mine.merge(theirs),
            (Self::Sketch(mine), Self::Exact(theirs)) => {
                for v in theirs {
                    mine.insert(*v);
                }
            }
            (Self::Exact(_), Self::Sketch(_)) => {}
        }
    }
}

/// How quantiles are computed for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantileMode {
    Exact,
    Sketch { k: usize },
}

impl QuantileMode {
    pub fn new_state(&self) -> QuantileState {
        match self {
            Self::Exact => QuantileState::Exact(Vec::new()),
            Self::Sketch { k } => QuantileState::Sketch(QuantileSketch::new(*k)),
        }
    }
}

// ============================================================================
// Column Aggregate
// ============================================================================

/// Running statistics for one column across the chunks seen so far.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnAggregate {
    pub column_type: ColumnType,
    pub rows: usize,
    pub count: usize,
    pub missing: usize,
    pub invalid: usize,
    pub frequencies: FrequencyCounter,
    /// Values for numeric columns, 0/1 for booleans, lengths for text.
    pub moments: RunningStats,
    pub quantiles: Option<QuantileState>,
    pub true_count: usize,
    pub false_count: usize,
    pub min_time: Option<NaiveDateTime>,
    pub max_time: Option<NaiveDateTime>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

impl ColumnAggregate {
    pub fn new(column_type: ColumnType, config: &AnalysisConfig, mode: QuantileMode) -> Self {
        Self {
            column_type,
            rows: 0,
            count: 0,
            missing: 0,
            invalid: 0,
            frequencies: FrequencyCounter::new(config.frequency_capacity),
            moments: RunningStats::new(),
            quantiles: (column_type == ColumnType::Numeric).then(|| mode.new_state()),
            true_count: 0,
            false_count: 0,
            min_time: None,
            max_time: None,
            min_length: None,
            max_length: None,
        }
    }

    /// Feed one chunk of this column.
    pub fn absorb(&mut self, column: &TypedColumn) {
        self.rows += column.len();
        self.missing += column.missing + column.invalid;
        self.invalid += column.invalid;

        match &column.values {
            TypedValues::Numeric(values) => {
                for v in values.iter().flatten() {
                    self.count += 1;
                    self.moments.push(*v);
                    self.frequencies.add(&v.to_string());
                    if let Some(q) = self.quantiles.as_mut() {
                        q.insert(*v);
                    }
                }
            }
            TypedValues::Boolean(values) => {
                for v in values.iter().flatten() {
                    self.count += 1;
                    if *v {
                        self.true_count += 1;
                    } else {
                        self.false_count += 1;
                    }
                    self.moments.push(if *v { 1.0 } else { 0.0 });
                    self.frequencies.add(boolean_label(*v));
                }
            }
            TypedValues::Temporal(values) => {
                for v in values.iter().flatten() {
                    self.count += 1;
                    self.min_time = Some(self.min_time.map_or(*v, |m| m.min(*v)));
                    self.max_time = Some(self.max_time.map_or(*v, |m| m.max(*v)));
                    self.frequencies.add(&v.to_string());
                }
            }
            TypedValues::Text(values) => {
                for v in values.iter().flatten() {
                    self.count += 1;
                    let length = v.chars().count();
                    self.moments.push(length as f64);
                    self.min_length = Some(self.min_length.map_or(length, |m| m.min(length)));
                    self.max_length = Some(self.max_length.map_or(length, |m| m.max(length)));
                    self.frequencies.add(v);
                }
            }
        }
    }

    pub fn merge(&mut self, other: &ColumnAggregate) {
        self.rows += other.rows;
        self.count += other.count;
        self.missing += other.missing;
        self.invalid += other.invalid;
        self.frequencies.merge(&other.frequencies);
        self.moments.merge(&other.moments);
        match (self.quantiles.as_mut(), other.quantiles.as_ref()) {
            (Some(mine), Some(theirs)) => mine.merge(theirs),
            (None, Some(theirs)) => self.quantiles = Some(theirs.clone()),
            _ => {}
        }
        self.true_count += other.true_count;
        self.false_count += other.false_count;
        self.min_time = min_opt(self.min_time, other.min_time);
        self.max_time = max_opt(self.max_time, other.max_time);
        self.min_length = min_opt(self.min_length, other.min_length);
        self.max_length = max_opt(self.max_length, other.max_length);
    }
}

fn min_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn max_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

// ============================================================================
// Tests
// ============================================================================
