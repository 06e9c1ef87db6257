//! Mergeable approximate quantile sketch.
//!
//! A stack of compactors in the KLL family: level `h` holds items standing
//! for `2^h` original values. When a level reaches capacity its items are
//! sorted and every other one is promoted to the next level. Memory is
//! `O(k log(n / k))` and the rank error shrinks as `k` grows.
//!
//! Compaction alternates between keeping even and odd positions per level
//! with a per-level counter, so the sketch is a deterministic function of
//! the order in which values and merges arrive.

use serde::{Deserialize, Serialize};

use crate::types::Quartiles;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Compactor {
    items: Vec<f64>,
    /// Number of compactions performed at this level.
    rounds: u64,
}

impl Compactor {
    /// Sort and split the items. Returns the promoted half; an odd leftover
    /// stays behind so no weight is lost.
    fn compact(&mut self) -> Vec<f64> {
        self.items.sort_by(f64::total_cmp);
        let leftover = if self.items.len() % 2 == 1 {
            self.items.pop()
        } else {
            None
        };
        let offset = (self.rounds % 2) as usize;
        self.rounds += 1;

        let promoted: Vec<f64> = self.items.iter().skip(offset).step_by(2).copied().collect();
        self.items.clear();
        self.items.extend(leftover);
        promoted
    }
}

/// Approximate quantiles over a stream of `f64` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileSketch {
    k: usize,
    levels: Vec<Compactor>,
    count: u64,
    min: f64,
    max: f64,
}

impl QuantileSketch {
    /// Create a sketch whose levels hold at most `k` items (minimum 8).
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(8),
            levels: vec![Compactor::default()],
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn insert(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.levels[0].items.push(value);
        if self.levels[0].items.len() >= self.k {
            self.compress();
        }
    }

    /// Fold another sketch into this one.
    pub fn merge(&mut self, other: &QuantileSketch) {
        if other.count == 0 {
            return;
        }
        while self.levels.len() < other.levels.len() {
            self.levels.push(Compactor::default());
        }
        for (level, theirs) in self.levels.iter_mut().zip(&other.levels) {
            level.items.extend_from_slice(&theirs.items);
        }
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.compress();
    }

    fn compress(&mut self) {
        let mut h = 0;
        while h < self.levels.len() {
            if self.levels[h].items.len() >= self.k {
                let promoted = self.levels[h].compact();
                if h + 1 == self.levels.len() {
                    self.levels.push(Compactor::default());
                }
                self.levels[h + 1].items.extend(promoted);
            }
            h += 1;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Items retained across all levels.
    pub fn retained(&self) -> usize {
        self.levels.iter().map(|l| l.items.len()).sum()
    }

    /// Approximate `q`-quantile, clamped to the observed range.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let q = q.clamp(0.0, 1.0);
        if q == 0.0 {
            return Some(self.min);
        }
        if q == 1.0 {
            return Some(self.max);
        }

        let mut weighted: Vec<(f64, u64)> = self
            .levels
            .iter()
            .enumerate()
            .flat_map(|(h, level)| level.items.iter().map(move |&v| (v, 1u64 << h)))
            .collect();
        weighted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total: u64 = weighted.iter().map(|(_, w)| w).sum();
        let target = q * total as f64;
        let mut cumulative = 0u64;
        for (value, weight) in &weighted {
            cumulative += weight;
            if cumulative as f64 >= target {
                return Some(value.clamp(self.min, self.max));
            }
        }
        Some(self.max)
    }

    pub fn quartiles(&self) -> Option<Quartiles> {
        Some(Quartiles {
            q1: self.quantile(0.25)?,
            median: self.quantile(0.5)?,
            q3: self.quantile(0.75)?,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
