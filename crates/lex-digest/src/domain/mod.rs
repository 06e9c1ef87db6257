//! Domain metrics: class balance, amount per class, temporal patterns.
//!
//! A class column is one whose name matches a configured alias and that has
//! exactly two distinct values. When a numeric amount-like column exists its
//! statistics are broken down per class. Every temporal column is bucketed
//! by a granularity chosen from its span.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::aggregate::{Chunk, extract_numeric_values, extract_typed};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::profiler::{InferredType, RunningStats};
use crate::types::{
    ClassAmountSummary, ClassBalance, ClassCount, ColumnProfile, ColumnType, DomainMetrics,
    TemporalBucket, TemporalGranularity, TemporalPatternSummary,
};

impl TemporalGranularity {
    /// Day up to a month of data, week up to half a year, month beyond.
    pub fn for_span_days(span_days: i64) -> Self {
        if span_days <= 31 {
            Self::Day
        } else if span_days <= 182 {
            Self::Week
        } else {
            Self::Month
        }
    }

    /// First day of the period containing `ts`.
    pub fn bucket_start(&self, ts: &NaiveDateTime) -> NaiveDate {
        let date = ts.date();
        match self {
            Self::Day => date,
            Self::Week => date - Duration::days(i64::from(date.weekday().num_days_from_monday())),
            Self::Month => date.with_day(1).unwrap_or(date),
        }
    }

    pub fn label(&self, start: &NaiveDate) -> String {
        match self {
            Self::Day => start.format("%Y-%m-%d").to_string(),
            Self::Week => start.format("%G-W%V").to_string(),
            Self::Month => start.format("%Y-%m").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassTarget {
    pub column: ColumnRef,
    pub inferred: InferredType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemporalTarget {
    pub column: ColumnRef,
    pub inferred: InferredType,
    pub granularity: TemporalGranularity,
}

/// Which columns the row pass must read for domain metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainPlan {
    pub class_column: Option<ClassTarget>,
    pub amount_column: Option<ColumnRef>,
    pub temporal: Vec<TemporalTarget>,
}

impl DomainPlan {
    pub fn is_empty(&self) -> bool {
        self.class_column.is_none() && self.temporal.is_empty()
    }
}

/// Detects domain columns and builds their accumulators.
pub struct DomainMetricsExtractor<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> DomainMetricsExtractor<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn plan(&self, profiles: &[ColumnProfile], inferred: &[InferredType]) -> DomainPlan {
        let class_column = profiles
            .iter()
            .zip(inferred)
            .enumerate()
            .find(|(_, (p, _))| {
                self.config.is_domain_alias(&p.name)
                    && p.distinct_count == 2
                    && p.distinct_count_exact
            })
            .map(|(index, (p, inferred))| ClassTarget {
                column: ColumnRef {
                    index,
                    name: p.name.clone(),
                },
                inferred: *inferred,
            });

        let amount_column = class_column.as_ref().and_then(|class| {
            profiles
                .iter()
                .enumerate()
                .find(|(i, p)| {
                    *i != class.column.index
                        && p.column_type == ColumnType::Numeric
                        && p.numeric_stats().is_some()
                        && self.config.is_amount_alias(&p.name)
                })
                .map(|(index, p)| ColumnRef {
                    index,
                    name: p.name.clone(),
                })
        });

        let temporal = profiles
            .iter()
            .zip(inferred)
            .enumerate()
            .filter_map(|(index, (p, inferred))| {
                let stats = p.temporal_stats()?;
                Some(TemporalTarget {
                    column: ColumnRef {
                        index,
                        name: p.name.clone(),
                    },
                    inferred: *inferred,
                    granularity: stats.granularity,
                })
            })
            .collect();

        let plan = DomainPlan {
            class_column,
            amount_column,
            temporal,
        };
        debug!(
            class = ?plan.class_column.as_ref().map(|c| &c.column.name),
            amount = ?plan.amount_column.as_ref().map(|c| &c.name),
            temporal = plan.temporal.len(),
            "Planned domain metrics"
        );
        plan
    }

    pub fn state(&self, plan: &DomainPlan) -> DomainState {
        DomainState {
            classes: plan.class_column.as_ref().map(|_| ClassAccumulator::default()),
            temporal: plan
                .temporal
                .iter()
                .map(|t| TemporalAccumulator::new(t.granularity))
                .collect(),
        }
    }

    pub fn finish(&self, plan: &DomainPlan, state: DomainState) -> DomainMetrics {
        let class_balance = match (&plan.class_column, state.classes) {
            (Some(target), Some(classes)) => classes.finish(
                &target.column.name,
                plan.amount_column.as_ref().map(|c| c.name.as_str()),
            ),
            _ => None,
        };
        let temporal_patterns = plan
            .temporal
            .iter()
            .zip(state.temporal)
            .map(|(target, acc)| acc.finish(&target.column.name, self.config.max_temporal_buckets))
            .collect();
        DomainMetrics {
            class_balance,
            temporal_patterns,
        }
    }
}

/// Partial domain metrics for a range of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainState {
    pub classes: Option<ClassAccumulator>,
    pub temporal: Vec<TemporalAccumulator>,
}

impl DomainState {
    pub fn absorb_chunk(&mut self, chunk: &Chunk, plan: &DomainPlan) -> Result<()> {
        let columns = chunk.frame.get_columns();
        if let (Some(classes), Some(target)) = (self.classes.as_mut(), plan.class_column.as_ref()) {
            let labels = extract_typed(
                columns[target.column.index].as_materialized_series(),
                &target.inferred,
            )?
            .labels();
            let amounts = match plan.amount_column.as_ref() {
                Some(amount_ref) => Some(extract_numeric_values(
                    columns[amount_ref.index].as_materialized_series(),
                )?),
                None => None,
            };
            classes.absorb(&labels, amounts.as_deref());
        }
        for (acc, target) in self.temporal.iter_mut().zip(&plan.temporal) {
            let typed = extract_typed(
                columns[target.column.index].as_materialized_series(),
                &target.inferred,
            )?;
            if let Some(values) = typed.as_temporal() {
                acc.absorb(values);
            }
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &DomainState) {
        if let (Some(mine), Some(theirs)) = (self.classes.as_mut(), other.classes.as_ref()) {
            mine.merge(theirs);
        }
        for (mine, theirs) in self.temporal.iter_mut().zip(&other.temporal) {
            mine.merge(theirs);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ClassTally {
    count: usize,
    amounts: RunningStats,
}

/// Row counts and amount moments per class label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassAccumulator {
    tallies: BTreeMap<String, ClassTally>,
}

impl ClassAccumulator {
    pub fn absorb(&mut self, labels: &[Option<String>], amounts: Option<&[Option<f64>]>) {
        for (row, label) in labels.iter().enumerate() {
            let Some(label) = label else { continue };
            let tally = self.tallies.entry(label.clone()).or_default();
            tally.count += 1;
            if let Some(amount) = amounts.and_then(|a| a.get(row).copied().flatten()) {
                tally.amounts.push(amount);
            }
        }
    }

    pub fn merge(&mut self, other: &ClassAccumulator) {
        for (label, theirs) in &other.tallies {
            let mine = self.tallies.entry(label.clone()).or_default();
            mine.count += theirs.count;
            mine.amounts.merge(&theirs.amounts);
        }
    }

    pub fn finish(self, column: &str, amount_column: Option<&str>) -> Option<ClassBalance> {
        let total: usize = self.tallies.values().map(|t| t.count).sum();
        if total == 0 {
            return None;
        }

        let mut ordered: Vec<(String, ClassTally)> = self.tallies.into_iter().collect();
        ordered.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(&b.0)));

        let classes: Vec<ClassCount> = ordered
            .iter()
            .map(|(label, tally)| ClassCount {
                label: label.clone(),
                count: tally.count,
                ratio: tally.count as f64 / total as f64,
            })
            .collect();
        let majority = classes.first()?.count;
        let minority = classes.last()?;

        let amount_by_class = if amount_column.is_some() {
            let grand_total: f64 = ordered.iter().map(|(_, t)| t.amounts.sum()).sum();
            ordered
                .iter()
                .filter(|(_, t)| !t.amounts.is_empty())
                .map(|(label, t)| ClassAmountSummary {
                    label: label.clone(),
                    count: t.amounts.count() as usize,
                    mean: t.amounts.mean().unwrap_or(0.0),
                    std_dev: t.amounts.std_dev(),
                    min: t.amounts.min().unwrap_or(0.0),
                    max: t.amounts.max().unwrap_or(0.0),
                    total: t.amounts.sum(),
                    share_of_total: if grand_total == 0.0 {
                        0.0
                    } else {
                        t.amounts.sum() / grand_total
                    },
                })
                .collect()
        } else {
            Vec::new()
        };

        Some(ClassBalance {
            column: column.to_string(),
            minority_class: minority.label.clone(),
            imbalance_ratio: majority as f64 / minority.count as f64,
            classes,
            amount_column: amount_column.map(str::to_string),
            amount_by_class,
        })
    }
}

/// Row counts per period start.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalAccumulator {
    granularity: TemporalGranularity,
    buckets: BTreeMap<NaiveDate, usize>,
}

impl TemporalAccumulator {
    pub fn new(granularity: TemporalGranularity) -> Self {
        Self {
            granularity,
            buckets: BTreeMap::new(),
        }
    }

    pub fn absorb(&mut self, values: &[Option<NaiveDateTime>]) {
        for ts in values.iter().flatten() {
            *self.buckets.entry(self.granularity.bucket_start(ts)).or_insert(0) += 1;
        }
    }

    pub fn merge(&mut self, other: &TemporalAccumulator) {
        for (start, count) in &other.buckets {
            *self.buckets.entry(*start).or_insert(0) += count;
        }
    }

    /// Chronological buckets, keeping the first `max_buckets`.
    pub fn finish(self, column: &str, max_buckets: usize) -> TemporalPatternSummary {
        let mut summary = TemporalPatternSummary {
            column: column.to_string(),
            granularity: self.granularity,
            buckets: self
                .buckets
                .iter()
                .map(|(start, count)| TemporalBucket {
                    period: self.granularity.label(start),
                    count: *count,
                })
                .collect(),
            other_periods: None,
        };
        summary.truncate_buckets(max_buckets);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::ColumnProfiler;
    use polars::prelude::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_granularity_from_span() {
        assert_eq!(TemporalGranularity::for_span_days(0), TemporalGranularity::Day);
        assert_eq!(TemporalGranularity::for_span_days(90), TemporalGranularity::Week);
        assert_eq!(TemporalGranularity::for_span_days(800), TemporalGranularity::Month);
    }

    #[test]
    fn test_bucket_labels() {
        let week = TemporalGranularity::Week;
        let start = week.bucket_start(&ts("2024-01-17"));
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(week.label(&start), "2024-W03");
        let month = TemporalGranularity::Month;
        assert_eq!(month.label(&month.bucket_start(&ts("2024-02-29"))), "2024-02");
    }

    #[test]
    fn test_class_balance_with_amounts() {
        let labels: Vec<Option<String>> = ["0", "0", "0", "1"]
            .iter()
            .map(|s| Some(s.to_string()))
            .collect();
        let amounts = [Some(10.0), Some(20.0), Some(30.0), Some(1000.0)];
        let mut acc = ClassAccumulator::default();
        acc.absorb(&labels, Some(&amounts));

        let balance = acc.finish("Class", Some("Amount")).unwrap();
        assert_eq!(balance.ratio_of("1"), Some(0.25));
        assert_eq!(balance.ratio_of("0"), Some(0.75));
        assert_eq!(balance.minority_class, "1");
        assert_eq!(balance.imbalance_ratio, 3.0);

        let fraud = balance.amount_by_class.iter().find(|c| c.label == "1").unwrap();
        assert_eq!(fraud.mean, 1000.0);
        assert!((fraud.share_of_total - 1000.0 / 1060.0).abs() < 1e-12);
    }

    #[test]
    fn test_class_accumulator_merge() {
        let mut a = ClassAccumulator::default();
        a.absorb(&[Some("x".into()), None], None);
        let mut b = ClassAccumulator::default();
        b.absorb(&[Some("y".into()), Some("x".into())], None);
        a.merge(&b);
        let balance = a.finish("label", None).unwrap();
        assert_eq!(balance.classes[0].label, "x");
        assert_eq!(balance.classes[0].count, 2);
        assert!(balance.amount_by_class.is_empty());
    }

    #[test]
    fn test_temporal_truncation_to_max_buckets() {
        let mut acc = TemporalAccumulator::new(TemporalGranularity::Day);
        let values: Vec<Option<NaiveDateTime>> = (1..=28)
            .map(|d| Some(ts(&format!("2024-02-{d:02}"))))
            .collect();
        acc.absorb(&values);
        let summary = acc.finish("date", 24);
        assert_eq!(summary.buckets.len(), 24);
        assert_eq!(summary.buckets[0].period, "2024-02-01");
        let other = summary.other_periods.unwrap();
        assert_eq!(other.count, 4);
        assert_eq!(other.distinct_values, 4);
    }

    #[test]
    fn test_plan_detects_class_and_amount() {
        let config = AnalysisConfig::default();
        let profiler = ColumnProfiler::new(&config);
        let amount = Series::new("Amount".into(), &[10.0, 20.0, 30.0, 1000.0]);
        let class = Series::new("Class".into(), &[0i64, 0, 0, 1]);
        let other = Series::new("Classification".into(), &[0i64, 0, 1, 1]);
        let profiles: Vec<ColumnProfile> = [&amount, &class, &other]
            .iter()
            .map(|s| profiler.profile_series(s).unwrap())
            .collect();
        let inferred: Vec<InferredType> = profiles
            .iter()
            .map(|p| InferredType::new(p.column_type))
            .collect();

        let plan = DomainMetricsExtractor::new(&config).plan(&profiles, &inferred);
        assert_eq!(
            plan.class_column.as_ref().map(|c| c.column.name.as_str()),
            Some("Class")
        );
        assert_eq!(plan.amount_column.as_ref().map(|c| c.index), Some(0));
        assert!(plan.temporal.is_empty());
    }

    #[test]
    fn test_plan_requires_two_distinct_values() {
        let config = AnalysisConfig::default();
        let profiler = ColumnProfiler::new(&config);
        let class = Series::new("class".into(), &["a", "b", "c", "a", "b", "c", "a"]);
        let profiles = vec![profiler.profile_series(&class).unwrap()];
        let inferred = vec![InferredType::new(profiles[0].column_type)];
        let plan = DomainMetricsExtractor::new(&config).plan(&profiles, &inferred);
        assert!(plan.class_column.is_none());
    }
}
