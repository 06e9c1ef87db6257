//! Table-level data quality scan.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::types::ColumnProfile;

/// Whole-table completeness and duplication figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQualitySummary {
    pub total_cells: usize,
    pub missing_cells: usize,
    pub missing_percentage: f64,
    pub duplicate_rows: usize,
    pub duplicate_percentage: f64,
    /// In-memory footprint of the source table.
    pub estimated_size_bytes: usize,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub columns_with_missing: Vec<String>,
}

pub struct DataQualityScan;

impl DataQualityScan {
    /// Summarize missing cells from the profiles and count duplicate rows.
    pub fn scan(df: &DataFrame, profiles: &[ColumnProfile]) -> Result<DataQualitySummary> {
        let rows = df.height();
        let total_cells = rows * df.width();
        let missing_cells: usize = profiles.iter().map(|p| p.missing_count).sum();

        let unique_rows = df
            .unique::<&str, &str>(None, UniqueKeepStrategy::First, None)?
            .height();
        let duplicate_rows = rows.saturating_sub(unique_rows);
        debug!("Found {} duplicate rows out of {}", duplicate_rows, rows);

        Ok(DataQualitySummary {
            total_cells,
            missing_cells,
            missing_percentage: percentage(missing_cells, total_cells),
            duplicate_rows,
            duplicate_percentage: percentage(duplicate_rows, rows),
            estimated_size_bytes: df.estimated_size(),
            columns_with_missing: profiles
                .iter()
                .filter(|p| p.missing_count > 0)
                .map(|p| p.name.clone())
                .collect(),
        })
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_counted_once_per_extra_copy() {
        let df = df![
            "a" => [1, 1, 2, 1],
            "b" => ["x", "x", "y", "x"],
        ]
        .unwrap();
        let summary = DataQualityScan::scan(&df, &[]).unwrap();
        assert_eq!(summary.total_cells, 8);
        assert_eq!(summary.duplicate_rows, 2);
        assert_eq!(summary.duplicate_percentage, 50.0);
        assert!(summary.estimated_size_bytes > 0);
    }

    #[test]
    fn test_percentage_of_empty() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 4), 25.0);
    }
}
