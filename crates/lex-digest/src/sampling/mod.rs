//! Representative row sampling.
//!
//! Three strategies, all returning ascending unique row indices:
//! - head/tail: the first `ceil(k/2)` and last `floor(k/2)` rows
//! - random: uniform without replacement from a seeded generator
//! - stratified: largest-remainder allocation across strata, uniform within each
//!
//! The same seed, table size and strata always produce the same indices.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use tracing::debug;

use crate::config::SampleStrategy;
use crate::error::{AnalysisError, Result};
use crate::types::{SampleSet, SampleStatus, StratumAllocation};

/// Label used for rows whose stratify value is missing.
pub const MISSING_STRATUM: &str = "<missing>";

/// Row indices grouped by the value of the stratify column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Strata {
    pub column: String,
    groups: BTreeMap<String, Vec<usize>>,
}

impl Strata {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            groups: BTreeMap::new(),
        }
    }

    /// Build from per-row labels, row `i` being `labels[i]`.
    pub fn from_labels(column: impl Into<String>, labels: &[Option<String>]) -> Self {
        let mut strata = Self::new(column);
        strata.absorb(0, labels);
        strata
    }

    /// Add a chunk of labels whose first row is `offset`.
    pub fn absorb(&mut self, offset: usize, labels: &[Option<String>]) {
        for (i, label) in labels.iter().enumerate() {
            let key = label.as_deref().unwrap_or(MISSING_STRATUM);
            match self.groups.get_mut(key) {
                Some(rows) => rows.push(offset + i),
                None => {
                    self.groups.insert(key.to_string(), vec![offset + i]);
                }
            }
        }
    }

    /// Append a later chunk's rows; chunks must be merged in order.
    pub fn merge(&mut self, other: &Strata) {
        for (label, rows) in &other.groups {
            self.groups.entry(label.clone()).or_default().extend_from_slice(rows);
        }
    }

    pub fn total(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Split `k` across strata proportionally to their populations.
///
/// Floors of the exact quotas are assigned first, then remaining slots go to
/// the largest fractional remainders (ties to the larger stratum, then the
/// earlier one). Strata that cannot absorb more pass their slot on, so the
/// result always sums to `min(k, total)` and never exceeds a population.
pub fn allocate(populations: &[usize], k: usize) -> Vec<usize> {
    let total: usize = populations.iter().sum();
    if k >= total {
        return populations.to_vec();
    }

    let mut quotas: Vec<usize> = Vec::with_capacity(populations.len());
    let mut remainders: Vec<u128> = Vec::with_capacity(populations.len());
    for &pop in populations {
        let exact = k as u128 * pop as u128;
        quotas.push((exact / total as u128) as usize);
        remainders.push(exact % total as u128);
    }

    let mut order: Vec<usize> = (0..populations.len()).collect();
    order.sort_by(|&a, &b| {
        remainders[b]
            .cmp(&remainders[a])
            .then_with(|| populations[b].cmp(&populations[a]))
            .then_with(|| a.cmp(&b))
    });

    let mut leftover = k - quotas.iter().sum::<usize>();
    while leftover > 0 {
        let mut progressed = false;
        for &i in &order {
            if leftover == 0 {
                break;
            }
            if quotas[i] < populations[i] {
                quotas[i] += 1;
                leftover -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    quotas
}

/// Deterministic sampler.
#[derive(Debug, Clone)]
pub struct SamplingEngine {
    seed: u64,
}

impl SamplingEngine {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    fn status(n: usize, k: usize) -> SampleStatus {
        if n == 0 && k > 0 {
            SampleStatus::Impossible
        } else if k >= n {
            SampleStatus::Exhaustive
        } else {
            SampleStatus::Sampled
        }
    }

    fn empty_set(strategy: SampleStrategy, k: usize, status: SampleStatus) -> SampleSet {
        SampleSet {
            strategy,
            requested: k,
            status,
            indices: Vec::new(),
            stratify_column: None,
            strata: Vec::new(),
            membership: Vec::new(),
        }
    }

    /// First `ceil(k/2)` and last `floor(k/2)` rows.
    pub fn head_tail(&self, n: usize, k: usize) -> SampleSet {
        let status = Self::status(n, k);
        let indices: Vec<usize> = if k >= n {
            (0..n).collect()
        } else {
            let head = k.div_ceil(2);
            let tail = k / 2;
            (0..head).chain(n - tail..n).collect()
        };
        SampleSet {
            indices,
            ..Self::empty_set(SampleStrategy::HeadTail, k, status)
        }
    }

    /// `k` distinct rows uniformly at random.
    pub fn random(&self, n: usize, k: usize) -> SampleSet {
        let status = Self::status(n, k);
        let indices = if k >= n {
            (0..n).collect()
        } else {
            let mut picked = index::sample(&mut self.rng(), n, k).into_vec();
            picked.sort_unstable();
            picked
        };
        SampleSet {
            indices,
            ..Self::empty_set(SampleStrategy::Random, k, status)
        }
    }

    /// Proportional sample across strata.
    ///
    /// Fails when the strata do not partition exactly `n` rows.
    pub fn stratified(&self, n: usize, k: usize, strata: &Strata) -> Result<SampleSet> {
        if strata.total() != n {
            return Err(AnalysisError::SamplingPrecondition(format!(
                "strata of '{}' cover {} rows but the table has {}",
                strata.column,
                strata.total(),
                n
            )));
        }
        let status = Self::status(n, k);
        let populations: Vec<usize> = strata.groups.values().map(Vec::len).collect();
        let allocation = allocate(&populations, k);

        let mut rng = self.rng();
        let mut chosen: Vec<(usize, usize)> = Vec::with_capacity(k.min(n));
        let mut summary = Vec::with_capacity(strata.len());
        for (stratum, ((label, rows), &take)) in strata.groups.iter().zip(&allocation).enumerate() {
            let picked: Vec<usize> = if take >= rows.len() {
                rows.clone()
            } else {
                index::sample(&mut rng, rows.len(), take)
                    .into_iter()
                    .map(|i| rows[i])
                    .collect()
            };
            chosen.extend(picked.into_iter().map(|row| (row, stratum)));
            summary.push(StratumAllocation {
                label: label.clone(),
                population: rows.len(),
                allocated: take,
            });
        }
        chosen.sort_unstable();

        debug!(strata = summary.len(), picked = chosen.len(), "Stratified sample drawn");
        Ok(SampleSet {
            strategy: SampleStrategy::Stratified,
            requested: k,
            status,
            indices: chosen.iter().map(|(row, _)| *row).collect(),
            stratify_column: Some(strata.column.clone()),
            strata: summary,
            membership: chosen.iter().map(|(_, s)| *s).collect(),
        })
    }

    /// Dispatch on strategy. Stratified requests without strata fall back to random.
    pub fn sample(
        &self,
        strategy: SampleStrategy,
        n: usize,
        k: usize,
        strata: Option<&Strata>,
    ) -> Result<SampleSet> {
        match (strategy, strata) {
            (SampleStrategy::HeadTail, _) => Ok(self.head_tail(n, k)),
            (SampleStrategy::Random, _) => Ok(self.random(n, k)),
            (SampleStrategy::Stratified, Some(strata)) => self.stratified(n, k, strata),
            (SampleStrategy::Stratified, None) => Ok(self.random(n, k)),
        }
    }

    /// Reduce an existing sample to `k` rows while keeping its strategy's
    /// shape. Returns the new set and the positions kept from the old one.
    pub fn shrink(&self, sample: &SampleSet, k: usize) -> (SampleSet, Vec<usize>) {
        let current = sample.indices.len();
        if k >= current {
            return (sample.clone(), (0..current).collect());
        }

        let positions: Vec<usize> = match sample.strategy {
            SampleStrategy::HeadTail => {
                let head = k.div_ceil(2);
                let tail = k / 2;
                (0..head).chain(current - tail..current).collect()
            }
            SampleStrategy::Random => {
                let mut kept = index::sample(&mut self.rng(), current, k).into_vec();
                kept.sort_unstable();
                kept
            }
            SampleStrategy::Stratified => self.shrink_strata(sample, k),
        };

        let mut strata = sample.strata.clone();
        if sample.strategy == SampleStrategy::Stratified {
            for stratum in &mut strata {
                stratum.allocated = 0;
            }
            for &p in &positions {
                if let Some(s) = sample.membership.get(p).and_then(|&s| strata.get_mut(s)) {
                    s.allocated += 1;
                }
            }
        }

        let shrunk = SampleSet {
            strategy: sample.strategy,
            requested: k,
            status: sample.status,
            indices: positions.iter().map(|&p| sample.indices[p]).collect(),
            stratify_column: sample.stratify_column.clone(),
            strata,
            membership: positions
                .iter()
                .filter_map(|&p| sample.membership.get(p).copied())
                .collect(),
        };
        (shrunk, positions)
    }

    fn shrink_strata(&self, sample: &SampleSet, k: usize) -> Vec<usize> {
        let mut by_stratum: Vec<Vec<usize>> = vec![Vec::new(); sample.strata.len()];
        for (position, &stratum) in sample.membership.iter().enumerate() {
            if let Some(bucket) = by_stratum.get_mut(stratum) {
                bucket.push(position);
            }
        }
        let sizes: Vec<usize> = by_stratum.iter().map(Vec::len).collect();
        let allocation = allocate(&sizes, k);

        let mut rng = self.rng();
        let mut kept: Vec<usize> = Vec::with_capacity(k);
        for (positions, take) in by_stratum.iter().zip(allocation) {
            if take >= positions.len() {
                kept.extend_from_slice(positions);
            } else {
                kept.extend(
                    index::sample(&mut rng, positions.len(), take)
                        .into_iter()
                        .map(|i| positions[i]),
                );
            }
        }
        kept.sort_unstable();
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(counts: &[(&str, usize)]) -> Vec<Option<String>> {
        counts
            .iter()
            .flat_map(|(label, n)| std::iter::repeat_n(Some(label.to_string()), *n))
            .collect()
    }

    #[test]
    fn test_head_tail_split() {
        let engine = SamplingEngine::new(42);
        let sample = engine.head_tail(10, 5);
        assert_eq!(sample.indices, vec![0, 1, 2, 8, 9]);
        assert_eq!(sample.status, SampleStatus::Sampled);
    }

    #[test]
    fn test_head_tail_exhaustive() {
        let sample = SamplingEngine::new(1).head_tail(3, 10);
        assert_eq!(sample.indices, vec![0, 1, 2]);
        assert_eq!(sample.status, SampleStatus::Exhaustive);
    }

    #[test]
    fn test_empty_table_is_impossible() {
        let engine = SamplingEngine::new(1);
        let sample = engine.random(0, 5);
        assert!(sample.is_empty());
        assert_eq!(sample.status, SampleStatus::Impossible);
    }

    #[test]
    fn test_random_is_deterministic_and_sorted() {
        let a = SamplingEngine::new(42).random(1000, 50);
        let b = SamplingEngine::new(42).random(1000, 50);
        assert_eq!(a.indices, b.indices);
        assert_eq!(a.len(), 50);
        assert!(a.indices.windows(2).all(|w| w[0] < w[1]));
        assert!(a.indices.iter().all(|&i| i < 1000));

        let c = SamplingEngine::new(7).random(1000, 50);
        assert_ne!(a.indices, c.indices);
    }

    #[test]
    fn test_allocation_largest_remainder() {
        assert_eq!(allocate(&[90, 10], 10), vec![9, 1]);
        assert_eq!(allocate(&[50, 30, 20], 7), vec![4, 2, 1]);
        assert_eq!(allocate(&[1, 1, 1], 2).iter().sum::<usize>(), 2);
        assert_eq!(allocate(&[5, 5], 20), vec![5, 5]);
    }

    #[test]
    fn test_allocation_never_exceeds_population() {
        let populations = [1, 100, 2];
        let allocation = allocate(&populations, 50);
        assert_eq!(allocation.iter().sum::<usize>(), 50);
        assert!(allocation.iter().zip(&populations).all(|(a, p)| a <= p));
    }

    #[test]
    fn test_stratified_proportions() {
        let strata = Strata::from_labels("Class", &labels(&[("0", 90), ("1", 10)]));
        let sample = SamplingEngine::new(42).stratified(100, 10, &strata).unwrap();
        assert_eq!(sample.len(), 10);
        assert_eq!(sample.strata[0].allocated, 9);
        assert_eq!(sample.strata[1].allocated, 1);
        assert_eq!(sample.indices.iter().filter(|&&i| i >= 90).count(), 1);
    }

    #[test]
    fn test_stratified_requires_full_partition() {
        let strata = Strata::from_labels("Class", &labels(&[("a", 5)]));
        let result = SamplingEngine::new(42).stratified(6, 2, &strata);
        assert!(matches!(result, Err(AnalysisError::SamplingPrecondition(_))));
    }

    #[test]
    fn test_strata_merge_in_chunk_order() {
        let mut strata = Strata::new("c");
        strata.absorb(0, &[Some("a".into()), None]);
        let mut later = Strata::new("c");
        later.absorb(2, &[Some("a".into())]);
        strata.merge(&later);
        assert_eq!(strata.total(), 3);
        assert_eq!(strata.groups["a"], vec![0, 2]);
        assert_eq!(strata.groups[MISSING_STRATUM], vec![1]);
    }

    #[test]
    fn test_shrink_head_tail_matches_smaller_request() {
        let engine = SamplingEngine::new(42);
        let big = engine.head_tail(100, 20);
        let (small, positions) = engine.shrink(&big, 6);
        assert_eq!(small.indices, engine.head_tail(100, 6).indices);
        assert_eq!(positions.len(), 6);
    }

    #[test]
    fn test_shrink_stratified_keeps_every_stratum_proportional() {
        let strata = Strata::from_labels("Class", &labels(&[("0", 80), ("1", 20)]));
        let engine = SamplingEngine::new(3);
        let sample = engine.stratified(100, 20, &strata).unwrap();
        let (small, _) = engine.shrink(&sample, 5);
        assert_eq!(small.len(), 5);
        assert_eq!(small.strata[0].allocated, 4);
        assert_eq!(small.strata[1].allocated, 1);
        assert!(small.indices.iter().all(|i| sample.indices.contains(i)));
    }
}
