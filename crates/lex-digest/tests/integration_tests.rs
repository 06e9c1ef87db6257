//! Integration tests for the dataset analysis engine.
//!
//! These tests verify end-to-end behavior of the analyzer on CSV fixtures
//! and check the merge, sampling and budget properties with proptest.

use lex_digest::reporting::CorrelationSection;
use lex_digest::{
    AnalysisConfig, AnalysisError, AnalysisStage, CancellationToken, ColumnType, ContextKind,
    ContextRenderer, DatasetAnalyzer, DigestCache, ProgressUpdate, SampleStatus, SampleStrategy,
    SamplingEngine, Strata, TypeStats,
};
use parking_lot::Mutex;
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_csv(filename: &str) -> DataFrame {
    let path = fixtures_path().join(filename);
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path))
        .expect("Failed to create CSV reader")
        .finish()
        .expect("Failed to read CSV file")
}

fn analyzer(config: AnalysisConfig) -> DatasetAnalyzer {
    DatasetAnalyzer::builder().config(config).build().unwrap()
}

fn default_analyzer() -> DatasetAnalyzer {
    analyzer(AnalysisConfig::default())
}

// ============================================================================
// Transactions Fixture
// ============================================================================

#[test]
fn test_transactions_column_types() {
    let report = default_analyzer().analyze(&load_csv("transactions.csv")).unwrap();

    assert_eq!(report.row_count, 60);
    assert_eq!(report.column_count, 6);
    let types: Vec<(&str, ColumnType)> = report
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.column_type))
        .collect();
    assert_eq!(
        types,
        vec![
            ("id", ColumnType::Numeric),
            ("amount", ColumnType::Numeric),
            ("Class", ColumnType::Boolean),
            ("date", ColumnType::Temporal),
            ("merchant", ColumnType::Categorical),
            ("notes", ColumnType::Text),
        ]
    );
    for column in &report.columns {
        assert_eq!(column.count + column.missing_count, report.row_count);
    }
    assert_eq!(report.column("notes").unwrap().missing_count, 6);
}

#[test]
fn test_transactions_outliers_are_fraud_rows() {
    let report = default_analyzer().analyze(&load_csv("transactions.csv")).unwrap();
    let amount = report.outliers.for_column("amount").unwrap();
    assert_eq!(amount.indices, vec![5, 17, 29, 41, 53]);
    assert_eq!(amount.outlier_count, 5);
    assert!(!amount.indices_truncated);
    assert!(report.outliers.for_column("id").unwrap().indices.is_empty());
}

#[test]
fn test_transactions_class_balance() {
    let report = default_analyzer().analyze(&load_csv("transactions.csv")).unwrap();
    let domain = report.domain_metrics.as_ref().expect("domain metrics");
    let balance = domain.class_balance.as_ref().expect("class balance");

    assert_eq!(balance.column, "Class");
    assert_eq!(balance.minority_class, "true");
    assert!((balance.ratio_of("true").unwrap() - 5.0 / 60.0).abs() < 1e-12);
    assert!((balance.imbalance_ratio - 11.0).abs() < 1e-12);
    assert_eq!(balance.amount_column.as_deref(), Some("amount"));

    let fraud = balance
        .amount_by_class
        .iter()
        .find(|c| c.label == "true")
        .unwrap();
    assert_eq!(fraud.count, 5);
    assert!(fraud.min >= 900.0);
    assert!(fraud.share_of_total > 0.5);
}

#[test]
fn test_transactions_temporal_pattern() {
    let report = default_analyzer().analyze(&load_csv("transactions.csv")).unwrap();
    let domain = report.domain_metrics.as_ref().unwrap();
    let pattern = &domain.temporal_patterns[0];

    assert_eq!(pattern.column, "date");
    assert_eq!(pattern.buckets.len(), 24);
    assert_eq!(pattern.buckets[0].period, "2024-01-01");
    assert_eq!(pattern.buckets[0].count, 2);
    let other = pattern.other_periods.as_ref().unwrap();
    assert_eq!(other.count, 12);
    assert_eq!(other.distinct_values, 6);

    let stats = report.column("date").unwrap().temporal_stats().unwrap();
    assert_eq!(stats.span_days, 29);
}

#[test]
fn test_transactions_merchant_frequencies() {
    let report = default_analyzer().analyze(&load_csv("transactions.csv")).unwrap();
    match &report.column("merchant").unwrap().stats {
        TypeStats::Categorical(stats) => {
            assert_eq!(stats.top_values.len(), 5);
            assert!(stats.top_values.iter().all(|b| b.count == 12));
            assert!(stats.other.is_none());
        }
        other => panic!("unexpected stats {other:?}"),
    }
}

#[test]
fn test_transactions_stratified_sample_by_class() {
    let config = AnalysisConfig::builder()
        .sample_size(12)
        .sample_strategy(SampleStrategy::Stratified)
        .build()
        .unwrap();
    let report = analyzer(config).analyze(&load_csv("transactions.csv")).unwrap();
    let sample = &report.sample.set;

    assert_eq!(sample.strategy, SampleStrategy::Stratified);
    assert_eq!(sample.stratify_column.as_deref(), Some("Class"));
    assert_eq!(sample.len(), 12);
    let allocation: Vec<(&str, usize)> = sample
        .strata
        .iter()
        .map(|s| (s.label.as_str(), s.allocated))
        .collect();
    assert_eq!(allocation, vec![("false", 11), ("true", 1)]);
    assert_eq!(report.sample.rows.len(), 12);
}

#[test]
fn test_transactions_context_rendering() {
    let report = default_analyzer().analyze(&load_csv("transactions.csv")).unwrap();
    let text = ContextRenderer::render(&report, ContextKind::Comprehensive);
    assert!(text.contains("- Total rows: 60"));
    assert!(text.contains("amount: 5 outliers"));
    assert!(text.contains("Class balance on Class"));
}

// ============================================================================
// Localized Formats
// ============================================================================

#[test]
fn test_brazilian_formats() {
    let report = default_analyzer().analyze(&load_csv("brazilian_sales.csv")).unwrap();

    let valor = report.column("valor").unwrap();
    assert_eq!(valor.column_type, ColumnType::Numeric);
    assert_eq!(valor.missing_count, 2);
    let stats = valor.numeric_stats().unwrap();
    assert_eq!(stats.max, 2500.0);
    assert_eq!(stats.min, 12.0);

    let ativo = report.column("ativo").unwrap();
    assert_eq!(ativo.column_type, ColumnType::Boolean);
    match &ativo.stats {
        TypeStats::Boolean(b) => {
            assert_eq!(b.true_count, 6);
            assert_eq!(b.false_count, 4);
        }
        other => panic!("unexpected stats {other:?}"),
    }

    let data = report.column("data_venda").unwrap();
    assert_eq!(data.column_type, ColumnType::Temporal);
    let temporal = data.temporal_stats().unwrap();
    assert_eq!(temporal.pattern.as_deref(), Some("%d/%m/%Y"));
    assert_eq!(temporal.span_days, 113);

    assert_eq!(report.column("regiao").unwrap().column_type, ColumnType::Categorical);
    assert_eq!(report.column("produto").unwrap().column_type, ColumnType::Text);
}

// ============================================================================
// Chunking, Cancellation, Progress
// ============================================================================

#[test]
fn test_chunked_path_matches_single_pass() {
    let df = load_csv("transactions.csv");
    let single = default_analyzer().analyze(&df).unwrap();
    let chunked = analyzer(
        AnalysisConfig::builder()
            .in_memory_row_limit(10)
            .chunk_size(7)
            .build()
            .unwrap(),
    )
    .analyze(&df)
    .unwrap();

    assert_eq!(chunked.chunking.chunk_count, 9);
    for name in ["id", "amount"] {
        let a = single.column(name).unwrap().numeric_stats().unwrap();
        let b = chunked.column(name).unwrap().numeric_stats().unwrap();
        assert!((a.mean - b.mean).abs() <= 1e-9 * a.mean.abs());
        assert!((a.variance - b.variance).abs() <= 1e-9 * a.variance.abs());
        assert_eq!((a.min, a.max), (b.min, b.max));
    }
    let (a, b) = (
        single.domain_metrics.as_ref().unwrap(),
        chunked.domain_metrics.as_ref().unwrap(),
    );
    assert_eq!(
        a.class_balance.as_ref().unwrap().classes,
        b.class_balance.as_ref().unwrap().classes
    );
    assert_eq!(a.temporal_patterns, b.temporal_patterns);
    assert_eq!(
        single.outliers.for_column("amount").unwrap().indices,
        chunked.outliers.for_column("amount").unwrap().indices
    );
}

#[test]
fn test_cancellation_reports_cancelled_stage() {
    let token = CancellationToken::new();
    token.cancel();
    let stages: Arc<Mutex<Vec<AnalysisStage>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = stages.clone();

    let result = DatasetAnalyzer::builder()
        .cancellation_token(token)
        .on_progress(move |update: ProgressUpdate| seen.lock().push(update.stage))
        .build()
        .unwrap()
        .analyze(&load_csv("transactions.csv"));

    assert!(matches!(result, Err(AnalysisError::Cancelled)));
    assert_eq!(stages.lock().last(), Some(&AnalysisStage::Cancelled));
}

#[test]
fn test_progress_stages_in_order() {
    let stages: Arc<Mutex<Vec<AnalysisStage>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = stages.clone();
    DatasetAnalyzer::builder()
        .config(AnalysisConfig::builder().parallel(false).build().unwrap())
        .on_progress(move |update| seen.lock().push(update.stage))
        .build()
        .unwrap()
        .analyze(&load_csv("transactions.csv"))
        .unwrap();

    let mut distinct = stages.lock().clone();
    distinct.dedup();
    assert_eq!(
        distinct,
        vec![
            AnalysisStage::Initializing,
            AnalysisStage::TypeInference,
            AnalysisStage::Aggregation,
            AnalysisStage::RowAnalysis,
            AnalysisStage::Sampling,
            AnalysisStage::ReportAssembly,
            AnalysisStage::Complete,
        ]
    );
}

#[test]
fn test_cache_reuses_report() {
    let df = load_csv("transactions.csv");
    let cache = DigestCache::new();
    let analyzer = default_analyzer();
    let first = analyzer.analyze_cached(&df, &cache).unwrap();
    let second = analyzer.analyze_cached(&df, &cache).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_report_json_shape() {
    let report = default_analyzer().analyze(&load_csv("transactions.csv")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    for key in [
        "row_count",
        "column_count",
        "columns",
        "correlation",
        "outliers",
        "domain_metrics",
        "sample",
        "truncated",
        "byte_size",
        "data_quality",
        "chunking",
        "warnings",
    ] {
        assert!(value.get(key).is_some(), "missing key {key}");
    }
    assert_eq!(value["sample"]["strategy"], "head_tail");
    assert_eq!(value["correlation"]["mode"], "matrix");
    assert_eq!(value["byte_size"].as_u64().unwrap() as usize, report.byte_size);
}

#[test]
fn test_wide_table_over_budget_uses_top_pairs() {
    let columns: Vec<Column> = (0..40)
        .map(|c| {
            let values: Vec<f64> = (0..50)
                .map(|r| ((r * (c + 3)) % 17) as f64 + c as f64)
                .collect();
            Column::new(format!("m{c}").into(), values)
        })
        .collect();
    let df = DataFrame::new(columns).unwrap();
    let config = AnalysisConfig::builder()
        .max_report_bytes(16 * 1024)
        .build()
        .unwrap();
    let report = analyzer(config).analyze(&df).unwrap();

    assert!(report.byte_size <= 16 * 1024);
    assert!(report.truncated.correlation);
    match report.correlation.as_ref() {
        Some(CorrelationSection::TopPairs { numeric_columns, pairs }) => {
            assert_eq!(*numeric_columns, 40);
            assert!(pairs.len() <= 20);
        }
        Some(other) => panic!("unexpected section {other:?}"),
        None => {}
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_chunked_merge_matches_single_pass(
        values in prop::collection::vec(-1000.0f64..1000.0, 2..200),
        chunk_size in 1usize..50,
    ) {
        prop_assume!(values.iter().any(|v| *v != 0.0 && *v != 1.0));
        let df = df!["x" => values.clone()].unwrap();
        let single = default_analyzer().analyze(&df).unwrap();
        let chunked = analyzer(
            AnalysisConfig::builder()
                .in_memory_row_limit(1)
                .chunk_size(chunk_size)
                .build()
                .unwrap(),
        )
        .analyze(&df)
        .unwrap();

        let a = single.column("x").unwrap().numeric_stats().unwrap();
        let b = chunked.column("x").unwrap().numeric_stats().unwrap();
        prop_assert!((a.mean - b.mean).abs() <= 1e-9 * a.mean.abs().max(1.0));
        prop_assert!((a.variance - b.variance).abs() <= 1e-9 * a.variance.abs().max(1.0));
        prop_assert_eq!(a.min, b.min);
        prop_assert_eq!(a.max, b.max);
    }

    #[test]
    fn prop_sampling_is_deterministic(n in 0usize..500, k in 0usize..80, seed in any::<u64>()) {
        let engine = SamplingEngine::new(seed);
        let first = engine.random(n, k);
        let second = SamplingEngine::new(seed).random(n, k);
        prop_assert_eq!(&first.indices, &second.indices);
        prop_assert_eq!(first.len(), k.min(n));
        prop_assert!(first.indices.windows(2).all(|w| w[0] < w[1]));
        if n == 0 && k > 0 {
            prop_assert_eq!(first.status, SampleStatus::Impossible);
        }
    }

    #[test]
    fn prop_stratified_allocation_sums_to_k(
        labels in prop::collection::vec(prop::option::of(0u8..6), 1..300),
        k in 0usize..120,
        seed in any::<u64>(),
    ) {
        let labels: Vec<Option<String>> = labels
            .into_iter()
            .map(|l| l.map(|v| format!("s{v}")))
            .collect();
        let strata = Strata::from_labels("group", &labels);
        let engine = SamplingEngine::new(seed);
        let sample = engine.stratified(labels.len(), k, &strata).unwrap();
        let again = engine.stratified(labels.len(), k, &strata).unwrap();

        let allocated: usize = sample.strata.iter().map(|s| s.allocated).sum();
        prop_assert_eq!(allocated, k.min(labels.len()));
        prop_assert_eq!(sample.len(), allocated);
        prop_assert!(sample.strata.iter().all(|s| s.allocated <= s.population));
        prop_assert_eq!(&sample.indices, &again.indices);
        prop_assert!(sample.indices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn prop_report_fits_budget(budget in 1024usize..24_000, distinct in 1usize..400) {
        let labels: Vec<String> = (0..600)
            .map(|i| format!("category-{:04}", i % distinct))
            .collect();
        let amounts: Vec<f64> = (0..600).map(|i| (i % 97) as f64 * 3.25).collect();
        let df = df!["label" => labels, "amount" => amounts].unwrap();

        let wide_open = AnalysisConfig::builder().max_report_bytes(10_000_000).build().unwrap();
        let unbounded = analyzer(wide_open).analyze(&df).unwrap();
        let bounded = analyzer(AnalysisConfig::builder().max_report_bytes(budget).build().unwrap())
            .analyze(&df)
            .unwrap();

        let encoded = bounded.to_json().unwrap();
        prop_assert!(encoded.len() <= budget);
        prop_assert_eq!(encoded.len(), bounded.byte_size);
        if unbounded.byte_size > budget {
            prop_assert!(bounded.truncated.any());
        }
    }
}
