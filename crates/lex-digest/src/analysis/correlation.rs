//! Pairwise-complete Pearson correlation from mergeable co-moments.

use crate::types::CorrelationMatrix;

/// Co-moments of one column pair over the rows where both are present.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairwiseMoments {
    pub n: u64,
    mean_x: f64,
    mean_y: f64,
    m2_x: f64,
    m2_y: f64,
    c_xy: f64,
}

impl PairwiseMoments {
    pub fn push(&mut self, x: f64, y: f64) {
        self.n += 1;
        let n = self.n as f64;
        let dx = x - self.mean_x;
        self.mean_x += dx / n;
        let dy = y - self.mean_y;
        self.mean_y += dy / n;
        self.m2_x += dx * (x - self.mean_x);
        self.m2_y += dy * (y - self.mean_y);
        self.c_xy += dx * (y - self.mean_y);
    }

    pub fn merge(&mut self, other: &PairwiseMoments) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = *other;
            return;
        }
        let na = self.n as f64;
        let nb = other.n as f64;
        let n = na + nb;
        let dx = other.mean_x - self.mean_x;
        let dy = other.mean_y - self.mean_y;
        let weight = na * nb / n;

        self.m2_x += other.m2_x + dx * dx * weight;
        self.m2_y += other.m2_y + dy * dy * weight;
        self.c_xy += other.c_xy + dx * dy * weight;
        self.mean_x += dx * nb / n;
        self.mean_y += dy * nb / n;
        self.n += other.n;
    }

    /// Pearson coefficient, or `None` when undefined.
    pub fn coefficient(&self, min_joint_samples: usize) -> Option<f64> {
        if self.n < min_joint_samples.max(2) as u64 {
            return None;
        }
        if self.m2_x <= 0.0 || self.m2_y <= 0.0 {
            return None;
        }
        let r = self.c_xy / (self.m2_x.sqrt() * self.m2_y.sqrt());
        r.is_finite().then(|| r.clamp(-1.0, 1.0))
    }

    pub fn has_variance(&self) -> bool {
        self.n >= 2 && self.m2_x > 0.0
    }
}

/// Co-moments for every unordered pair of numeric columns.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationAccumulator {
    columns: Vec<String>,
    /// Upper triangle, row-major, diagonal included so self-pairs track variance.
    moments: Vec<PairwiseMoments>,
}

impl CorrelationAccumulator {
    pub fn new(columns: Vec<String>) -> Self {
        let m = columns.len();
        Self {
            columns,
            moments: vec![PairwiseMoments::default(); m * (m + 1) / 2],
        }
    }

    fn slot(&self, i: usize, j: usize) -> usize {
        let (i, j) = if i <= j { (i, j) } else { (j, i) };
        let m = self.columns.len();
        i * m - i * (i.saturating_sub(1)) / 2 + (j - i)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Feed one chunk: `values[c]` holds the chunk values of numeric column `c`.
    pub fn absorb(&mut self, values: &[&[Option<f64>]]) {
        let m = self.columns.len();
        for i in 0..m {
            for j in i..m {
                let slot = self.slot(i, j);
                let moments = &mut self.moments[slot];
                for (x, y) in values[i].iter().zip(values[j].iter()) {
                    if let (Some(x), Some(y)) = (x, y) {
                        moments.push(*x, *y);
                    }
                }
            }
        }
    }

    pub fn merge(&mut self, other: &CorrelationAccumulator) {
        for (mine, theirs) in self.moments.iter_mut().zip(&other.moments) {
            mine.merge(theirs);
        }
    }

    pub fn pair(&self, i: usize, j: usize) -> &PairwiseMoments {
        &self.moments[self.slot(i, j)]
    }

    /// Build the symmetric matrix. The diagonal is 1.0 for columns with
    /// non-zero variance and undefined otherwise.
    pub fn finish(&self, min_joint_samples: usize) -> CorrelationMatrix {
        let m = self.columns.len();
        let mut values = vec![vec![None; m]; m];
        let mut joint_counts = vec![vec![0usize; m]; m];
        for i in 0..m {
            for j in i..m {
                let pair = self.pair(i, j);
                let value = if i == j {
                    pair.has_variance().then_some(1.0)
                } else {
                    pair.coefficient(min_joint_samples)
                };
                values[i][j] = value;
                values[j][i] = value;
                joint_counts[i][j] = pair.n as usize;
                joint_counts[j][i] = pair.n as usize;
            }
        }
        CorrelationMatrix {
            columns: self.columns.clone(),
            values,
            joint_counts,
        }
    }
}
