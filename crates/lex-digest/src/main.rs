//! CLI entry point for the dataset analysis engine.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use dotenv::dotenv;
use lex_digest::reporting::write_report;
use lex_digest::{
    AnalysisConfig, AnalysisReport, ContextKind, ContextRenderer, DatasetAnalyzer, SampleStrategy,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// CLI-compatible sampling strategy enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliSampleStrategy {
    /// First and last rows
    HeadTail,
    /// Seeded uniform sample
    Random,
    /// Proportional sample across the values of one column
    Stratified,
}

impl From<CliSampleStrategy> for SampleStrategy {
    fn from(cli: CliSampleStrategy) -> Self {
        match cli {
            CliSampleStrategy::HeadTail => SampleStrategy::HeadTail,
            CliSampleStrategy::Random => SampleStrategy::Random,
            CliSampleStrategy::Stratified => SampleStrategy::Stratified,
        }
    }
}

/// CLI-compatible context depth enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliContextKind {
    Quick,
    Statistical,
    Comprehensive,
}

impl From<CliContextKind> for ContextKind {
    fn from(cli: CliContextKind) -> Self {
        match cli {
            CliContextKind::Quick => ContextKind::Quick,
            CliContextKind::Statistical => ContextKind::Statistical,
            CliContextKind::Comprehensive => ContextKind::Comprehensive,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author = "Lex Machina Team",
    version,
    about = "Bounded statistical digests of CSV datasets",
    long_about = "Profiles a CSV file and prints a size-bounded digest: column statistics,\n\
                  correlations, outliers, class balance, temporal patterns and a sample.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  LEX_DIGEST_*   Configuration overrides (e.g. LEX_DIGEST_SAMPLE_SIZE=50)\n  \
                  RUST_LOG       Log filter, takes precedence over --log-level\n\n\
                  EXAMPLES:\n  \
                  # JSON digest on stdout\n  \
                  lex-digest -i data.csv --json\n\n  \
                  # Prompt-ready text\n  \
                  lex-digest -i data.csv --context quick\n\n  \
                  # Stratified sample on a chosen column, written to a directory\n  \
                  lex-digest -i data.csv --sample-strategy stratified \
                    --stratify-column Class -o out/"
)]
struct Args {
    /// Path to the CSV file to analyze
    #[arg(short, long)]
    input: String,

    /// Directory to write <input_name>_digest.json into
    #[arg(short, long)]
    output: Option<String>,

    /// JSON configuration file; CLI flags override its values
    #[arg(short, long)]
    config: Option<String>,

    /// Rows per chunk for tables above the in-memory limit
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Largest table analyzed in a single pass with exact quartiles
    #[arg(long)]
    in_memory_row_limit: Option<usize>,

    /// Upper bound on the digest's JSON size in bytes
    #[arg(long)]
    max_report_bytes: Option<usize>,

    /// Number of sample rows
    #[arg(long)]
    sample_size: Option<usize>,

    #[arg(long, value_enum)]
    sample_strategy: Option<CliSampleStrategy>,

    /// Seed for random and stratified sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Explicit frequency buckets per categorical column
    #[arg(long)]
    top_k: Option<usize>,

    /// Column to stratify on (defaults to the detected class column)
    #[arg(long)]
    stratify_column: Option<String>,

    /// Column name that marks a binary class column; repeatable
    #[arg(long = "domain-alias")]
    domain_aliases: Vec<String>,

    /// Print prompt context at this depth instead of the digest
    #[arg(long, value_enum)]
    context: Option<CliContextKind>,

    /// Output compact JSON to stdout
    ///
    /// Disables all progress logs; only outputs the digest.
    /// Useful for piping to other tools: `... --json | jq .columns`
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Process chunks sequentially
    #[arg(long)]
    no_parallel: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    dotenv().ok();

    if !Path::new(&args.input).exists() {
        return Err(anyhow!("Input file not found: {}", args.input));
    }

    let config = build_config(&args)?;
    debug!("Configuration: {:?}", config);

    info!("Loading dataset from: {}", args.input);
    let data = load_csv_with_fallbacks(&args.input)?;
    info!("Dataset loaded successfully: {:?}", data.shape());

    let mut builder = DatasetAnalyzer::builder().config(config);
    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }
    let report = builder.build()?.analyze(&data)?;

    if let Some(ref dir) = args.output {
        let path = write_report(&report, Path::new(dir), &extract_file_stem(&args.input))?;
        if !args.json {
            println!("Digest written to {}", path.display());
        }
    }

    if args.json {
        println!("{}", report.to_json()?);
    } else if let Some(kind) = args.context {
        println!("{}", ContextRenderer::render(&report, kind.into()));
    } else {
        print_summary(&report);
    }
    Ok(())
}

/// Start from the config file or environment, then apply CLI flags.
fn build_config(args: &Args) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read config file {path}"))?;
            AnalysisConfig::from_json_str(&json)?
        }
        None => AnalysisConfig::from_env()?,
    };

    if let Some(rows) = args.chunk_size {
        config.chunk_size = rows;
    }
    if let Some(rows) = args.in_memory_row_limit {
        config.in_memory_row_limit = rows;
    }
    if let Some(bytes) = args.max_report_bytes {
        config.max_report_bytes = bytes;
    }
    if let Some(k) = args.sample_size {
        config.sample_size = k;
    }
    if let Some(strategy) = args.sample_strategy {
        config.sample_strategy = strategy.into();
    }
    if let Some(seed) = args.seed {
        config.random_seed = seed;
    }
    if let Some(k) = args.top_k {
        config.categorical_top_k = k;
    }
    if let Some(ref column) = args.stratify_column {
        config.stratify_column = Some(column.clone());
        if config.sample_strategy != SampleStrategy::Stratified {
            warn!("--stratify-column has no effect unless --sample-strategy is stratified");
        }
    }
    if !args.domain_aliases.is_empty() {
        config.domain_alias_columns = args.domain_aliases.clone();
    }
    if args.no_parallel {
        config.parallel = false;
    }

    config.validate()?;
    Ok(config)
}

/// Human-readable summary of a report.
///
/// Uses `println!` on purpose: this is the command's output, not a log.
fn print_summary(report: &AnalysisReport) {
    println!("\n{}", "=".repeat(80));
    println!("DATASET DIGEST");
    println!("{}\n", "=".repeat(80));

    println!("  Rows: {}", report.row_count);
    println!("  Columns: {}", report.column_count);
    println!(
        "  Traversal: {} ({} chunk(s) of {} rows)",
        report.chunking.mode, report.chunking.chunk_count, report.chunking.chunk_size
    );
    println!(
        "  Missing cells: {} ({:.2}%)",
        report.data_quality.missing_cells, report.data_quality.missing_percentage
    );
    println!("  Duplicate rows: {}", report.data_quality.duplicate_rows);
    println!();

    println!(
        "{:<24} {:<12} {:<10} {:<10}",
        "Column", "Type", "Missing %", "Distinct"
    );
    println!("{}", "-".repeat(60));
    for column in &report.columns {
        println!(
            "{:<24} {:<12} {:<10.1} {:<10}",
            truncate_str(&column.name, 23),
            column.column_type,
            column.missing_percentage,
            column.distinct_count
        );
    }
    println!();

    let flagged: Vec<_> = report
        .outliers
        .columns
        .iter()
        .filter(|c| c.outlier_count > 0)
        .collect();
    if !flagged.is_empty() {
        println!("OUTLIERS ({} total)", report.outliers.total_outliers());
        for column in flagged {
            println!(
                "  {}: {} ({:.2}%)",
                column.column, column.outlier_count, column.outlier_percentage
            );
        }
        println!();
    }

    if let Some(balance) = report
        .domain_metrics
        .as_ref()
        .and_then(|d| d.class_balance.as_ref())
    {
        println!(
            "CLASS BALANCE ({}): minority '{}', imbalance ratio {:.2}",
            balance.column, balance.minority_class, balance.imbalance_ratio
        );
        println!();
    }

    println!(
        "Sample: {} rows ({})",
        report.sample.set.len(),
        report.sample.set.strategy.as_str()
    );
    for warning in &report.warnings {
        println!("Warning: {warning}");
    }
    println!("Digest size: {} bytes", report.byte_size);
    if report.truncated.any() {
        println!("Truncated sections: {:?}", report.truncated);
    }
}

fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn extract_file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset")
        .to_string()
}

/// Load a CSV, falling back to an all-string read when schema inference fails.
fn load_csv_with_fallbacks(path: &str) -> Result<DataFrame> {
    match CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_quote_char(Some(b'"')))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => {
            debug!("Standard loading failed: {}", e);
        }
    }

    // Every column as text; the analyzer infers types from the cells
    CsvReadOptions::default()
        .with_infer_schema_length(Some(0))
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
        .with_context(|| format!("Could not parse {path} as CSV"))
}
