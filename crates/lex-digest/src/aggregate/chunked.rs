//! Chunk planning and the map/merge driver shared by every pass.

use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::aggregate::QuantileMode;
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::pipeline::{AnalysisStage, CancellationToken, ProgressReporter, ProgressUpdate};

/// How a table is split into row ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub total_rows: usize,
    pub chunk_size: usize,
    /// True when the table is small enough for one whole-table pass.
    pub in_memory: bool,
}

impl ChunkPlan {
    /// Plan a table: one chunk when it fits the in-memory limit, fixed-size
    /// chunks otherwise.
    pub fn for_rows(total_rows: usize, config: &AnalysisConfig) -> Self {
        if total_rows <= config.in_memory_row_limit {
            Self {
                total_rows,
                chunk_size: total_rows.max(1),
                in_memory: true,
            }
        } else {
            Self {
                total_rows,
                chunk_size: config.chunk_size.max(1),
                in_memory: false,
            }
        }
    }

    /// Explicit chunk size, mainly for tests and benchmarks.
    pub fn with_chunk_size(total_rows: usize, chunk_size: usize) -> Self {
        Self {
            total_rows,
            chunk_size: chunk_size.max(1),
            in_memory: chunk_size >= total_rows,
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.total_rows.div_ceil(self.chunk_size)
    }

    /// `(offset, len)` of every chunk in order.
    pub fn ranges(&self) -> Vec<(usize, usize)> {
        (0..self.chunk_count())
            .map(|i| {
                let offset = i * self.chunk_size;
                (offset, self.chunk_size.min(self.total_rows - offset))
            })
            .collect()
    }

    /// Exact quantiles in memory, sketches when chunked.
    pub fn quantile_mode(&self, config: &AnalysisConfig) -> QuantileMode {
        if self.in_memory {
            QuantileMode::Exact
        } else {
            QuantileMode::Sketch {
                k: config.quantile_sketch_k,
            }
        }
    }
}

/// A contiguous row range of the table.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    /// Row index of the first row in the source table.
    pub offset: usize,
    pub frame: DataFrame,
}

/// Runs a per-chunk function over a table and folds the results in chunk order.
///
/// Chunks may be mapped in parallel; the fold is always sequential and
/// ordered, so results do not depend on thread scheduling.
pub struct ChunkedAggregator {
    plan: ChunkPlan,
    parallel: bool,
    cancellation_token: Option<CancellationToken>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

impl ChunkedAggregator {
    pub fn new(plan: ChunkPlan) -> Self {
        Self {
            plan,
            parallel: false,
            cancellation_token: None,
            progress_reporter: None,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn cancellation_token(mut self, token: Option<CancellationToken>) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn progress_reporter(mut self, reporter: Option<Arc<dyn ProgressReporter>>) -> Self {
        self.progress_reporter = reporter;
        self
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    fn check_cancelled(&self) -> Result<()> {
        if let Some(ref token) = self.cancellation_token
            && token.is_cancelled()
        {
            return Err(AnalysisError::Cancelled);
        }
        Ok(())
    }

    /// Map every chunk with `map`, then fold the partial states left to right
    /// with `merge`.
    ///
    /// Returns [`AnalysisError::Cancelled`] if the token is set before any
    /// chunk starts.
    pub fn run<T, M, F>(
        &self,
        df: &DataFrame,
        stage: AnalysisStage,
        map: M,
        merge: F,
    ) -> Result<Option<T>>
    where
        T: Send,
        M: Fn(&Chunk) -> Result<T> + Sync + Send,
        F: Fn(T, T) -> T,
    {
        let ranges = self.plan.ranges();
        let total = ranges.len();

        let process = |(index, (offset, len)): (usize, (usize, usize))| -> Result<T> {
            self.check_cancelled()?;
            let chunk = Chunk {
                index,
                offset,
                frame: df.slice(offset as i64, len),
            };
            let state = map(&chunk)?;
            if let Some(ref reporter) = self.progress_reporter {
                reporter.report(ProgressUpdate::with_items(
                    stage,
                    index + 1,
                    total,
                    format!("{} ({} rows)", stage.display_name(), len),
                ));
            }
            Ok(state)
        };

        let partials: Vec<T> = if self.parallel && total > 1 {
            ranges.into_par_iter().enumerate().map(process).collect::<Result<Vec<T>>>()?
        } else {
            ranges.into_iter().enumerate().map(process).collect::<Result<Vec<T>>>()?
        };

        tracing::debug!(stage = ?stage, chunks = total, "Merged chunk states");
        Ok(partials.into_iter().reduce(merge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_in_memory() {
        let config = AnalysisConfig::default();
        let plan = ChunkPlan::for_rows(500, &config);
        assert!(plan.in_memory);
        assert_eq!(plan.chunk_count(), 1);
        assert_eq!(plan.ranges(), vec![(0, 500)]);
        assert_eq!(plan.quantile_mode(&config), QuantileMode::Exact);
    }

    #[test]
    fn test_plan_chunked() {
        let config = AnalysisConfig::builder()
            .in_memory_row_limit(100)
            .chunk_size(40)
            .build()
            .unwrap();
        let plan = ChunkPlan::for_rows(130, &config);
        assert!(!plan.in_memory);
        assert_eq!(plan.ranges(), vec![(0, 40), (40, 40), (80, 40), (120, 10)]);
        assert!(matches!(plan.quantile_mode(&config), QuantileMode::Sketch { .. }));
    }

    #[test]
    fn test_run_folds_in_order() {
        let df = df!["x" => (0..10).collect::<Vec<i32>>()].unwrap();
        for parallel in [false, true] {
            let aggregator =
                ChunkedAggregator::new(ChunkPlan::with_chunk_size(10, 3)).parallel(parallel);
            let offsets = aggregator
                .run(
                    &df,
                    AnalysisStage::Aggregation,
                    |chunk| Ok(vec![(chunk.offset, chunk.frame.height())]),
                    |mut a, b| {
                        a.extend(b);
                        a
                    },
                )
                .unwrap()
                .unwrap();
            assert_eq!(offsets, vec![(0, 3), (3, 3), (6, 3), (9, 1)]);
        }
    }

    #[test]
    fn test_run_honours_cancellation() {
        let df = df!["x" => [1, 2, 3]].unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let aggregator = ChunkedAggregator::new(ChunkPlan::with_chunk_size(3, 1))
            .cancellation_token(Some(token));
        let result = aggregator.run(
            &df,
            AnalysisStage::TypeInference,
            |_| Ok(1usize),
            |a, b| a + b,
        );
        assert!(matches!(result, Err(AnalysisError::Cancelled)));
    }

    #[test]
    fn test_empty_plan_yields_none() {
        let df = df!["x" => Vec::<i32>::new()].unwrap();
        let aggregator = ChunkedAggregator::new(ChunkPlan::with_chunk_size(0, 10));
        let result = aggregator
            .run(&df, AnalysisStage::Aggregation, |_| Ok(1usize), |a, b| a + b)
            .unwrap();
        assert_eq!(result, None);
    }
}
