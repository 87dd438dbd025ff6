//! CLI entry point for the financial table cleaner.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use finclean::{
    ColumnRule, ColumnSelection, ExportFormat, ImportSource, JoinKind, KeepStrategy,
    OperationLogEntry, Pipeline, PipelineConfig, RetentionPolicy, VarianceEngine, prune_logs,
};
use polars::prelude::DataFrame;
use serde_json::json;
use tracing::{debug, info};

/// CLI-compatible keep strategy
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliKeep {
    /// Keep the first row of each duplicate group
    First,
    /// Keep the last row of each duplicate group
    Last,
}

impl From<CliKeep> for KeepStrategy {
    fn from(cli: CliKeep) -> Self {
        match cli {
            CliKeep::First => KeepStrategy::First,
            CliKeep::Last => KeepStrategy::Last,
        }
    }
}

/// CLI-compatible join kind
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliJoin {
    Left,
    Right,
    Inner,
    Outer,
}

impl From<CliJoin> for JoinKind {
    fn from(cli: CliJoin) -> Self {
        match cli {
            CliJoin::Left => JoinKind::Left,
            CliJoin::Right => JoinKind::Right,
            CliJoin::Inner => JoinKind::Inner,
            CliJoin::Outer => JoinKind::Outer,
        }
    }
}

/// Output file format
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFormat {
    Csv,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Financial table cleaning with an audit trail",
    long_about = "Import a financial table, clean it step by step and export the result \
                  together with the log of every operation.\n\n\
                  EXAMPLES:\n  \
                  # Fill gaps and drop duplicates\n  \
                  finclean clean -i ledger.csv --impute amount=median --dedupe -o clean.csv\n\n  \
                  # Budget versus actual\n  \
                  finclean variance --budget budget.csv --actual actual.csv \\\n    \
                  --date month --amount spend --category dept --ytd\n\n  \
                  # Keep the log directory bounded\n  \
                  finclean prune-logs --dir logs/"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Print a JSON summary to stdout instead of logs and text
    #[arg(long, global = true)]
    json: bool,

    /// Pipeline configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clean a single table
    Clean(CleanArgs),
    /// Compare a budget table with an actual table
    Variance(VarianceArgs),
    /// Delete old log files
    PruneLogs(PruneArgs),
}

#[derive(Args, Debug)]
struct CleanArgs {
    /// Input file (.csv, .xlsx, .xls, .json)
    #[arg(short, long)]
    input: PathBuf,

    /// Sheet to read from a workbook (first sheet by default)
    #[arg(long)]
    sheet: Option<String>,

    /// Imputation as column=method (mean, median, mode, ffill, bfill)
    #[arg(long = "impute", value_name = "COLUMN=METHOD")]
    impute: Vec<String>,

    /// Verification rules file (JSON array)
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Table to merge into the input
    #[arg(long)]
    merge: Option<PathBuf>,

    /// Merge key columns
    #[arg(long, value_delimiter = ',')]
    on: Vec<String>,

    /// Merge join kind
    #[arg(long, value_enum, default_value = "left")]
    how: CliJoin,

    /// Remove duplicate rows
    #[arg(long)]
    dedupe: bool,

    /// Columns compared by --dedupe (whole row by default)
    #[arg(long, value_delimiter = ',')]
    subset: Option<Vec<String>>,

    /// Which duplicate survives (configured default when omitted)
    #[arg(long, value_enum)]
    keep: Option<CliKeep>,

    /// Z-score these columns (all numeric columns when no list is given)
    #[arg(long, num_args = 0.., value_delimiter = ',')]
    standardize: Option<Vec<String>>,

    /// Min-max these columns (all numeric columns when no list is given)
    #[arg(long, num_args = 0.., value_delimiter = ',')]
    normalize: Option<Vec<String>>,

    /// Output file for the cleaned table
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "csv")]
    format: CliFormat,

    /// Write the operation log to this file
    #[arg(long)]
    log_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct VarianceArgs {
    /// Budget table
    #[arg(long)]
    budget: PathBuf,

    /// Actual table
    #[arg(long)]
    actual: PathBuf,

    /// Date column shared by both tables
    #[arg(long)]
    date: String,

    /// Amount columns to compare
    #[arg(long, value_delimiter = ',', required = true)]
    amount: Vec<String>,

    /// Category columns used as additional join keys
    #[arg(long, value_delimiter = ',')]
    category: Vec<String>,

    /// Significance threshold in percent (configured default when omitted)
    #[arg(long)]
    threshold: Option<f64>,

    /// Also compute year-to-date totals
    #[arg(long)]
    ytd: bool,

    /// Output file for the variance table (CSV)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PruneArgs {
    /// Directory holding the log files
    #[arg(long)]
    dir: PathBuf,

    /// Maximum number of files to keep
    #[arg(long, default_value = "300")]
    max_files: usize,

    /// Delete files older than this many days
    #[arg(long, default_value = "30")]
    max_age_days: u64,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json);

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };

    match &cli.command {
        Command::Clean(args) => run_clean(args, config, cli.json),
        Command::Variance(args) => run_variance(args, config, cli.json),
        Command::PruneLogs(args) => run_prune(args, cli.json),
    }
}

fn run_clean(args: &CleanArgs, config: PipelineConfig, json_output: bool) -> Result<()> {
    if !args.input.exists() {
        return Err(anyhow!("Input file not found: {}", args.input.display()));
    }

    let mut pipeline = Pipeline::builder()
        .config(config)
        .on_entry(|entry| debug!("#{} {}", entry.sequence, entry.operation))
        .build()?;

    let source = ImportSource::from_path(&args.input, args.sheet.clone())?;
    let shape = pipeline.import(source)?.shape();
    info!("Loaded {}: {:?}", args.input.display(), shape);

    if !args.impute.is_empty() {
        let methods = args
            .impute
            .iter()
            .map(|spec| parse_impute(spec))
            .collect::<Result<Vec<_>>>()?;
        pipeline.rebuild_missing_data(methods)?;
    }

    if let Some(path) = &args.rules {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file {}", path.display()))?;
        let rules: Vec<ColumnRule> = serde_json::from_str(&text)
            .with_context(|| format!("Invalid rules file {}", path.display()))?;
        pipeline.verify_and_enrich(&rules)?;
    }

    if let Some(path) = &args.merge {
        if args.on.is_empty() {
            return Err(anyhow!("--merge requires --on"));
        }
        let mut side = Pipeline::builder().config(pipeline.config().clone()).build()?;
        let other = side.import(ImportSource::from_path(path, None)?)?.clone();
        pipeline.merge_datasets(&other, &args.on, args.how.into())?;
    }

    if args.dedupe {
        let subset = ColumnSelection::from(args.subset.clone());
        pipeline.deduplicate(subset, args.keep.map(Into::into))?;
    }

    if let Some(columns) = &args.standardize {
        pipeline.standardize(selection(columns))?;
    }
    if let Some(columns) = &args.normalize {
        pipeline.normalize(selection(columns))?;
    }

    if let Some(path) = &args.output {
        let format = match args.format {
            CliFormat::Csv => ExportFormat::CsvText,
            CliFormat::Json => ExportFormat::JsonText,
        };
        let text = pipeline
            .export(format)?
            .into_text()
            .ok_or_else(|| anyhow!("export produced no text"))?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Cleaned table written to {}", path.display());
    }

    if let Some(path) = &args.log_out {
        fs::write(path, pipeline.log_json()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Operation log written to {}", path.display());
    }

    let final_shape = pipeline
        .working_table()
        .map(DataFrame::shape)
        .unwrap_or_default();

    if json_output {
        let summary = json!({
            "input": args.input.display().to_string(),
            "shape_before": shape,
            "shape_after": final_shape,
            "state": pipeline.state(),
            "log": pipeline.log(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_clean_summary(&args.input, shape, final_shape, pipeline.log());
    Ok(())
}

fn run_variance(args: &VarianceArgs, config: PipelineConfig, json_output: bool) -> Result<()> {
    let mut engine = VarianceEngine::with_config(config)?;
    engine.import_budget(ImportSource::from_path(&args.budget, None)?)?;
    engine.import_actual(ImportSource::from_path(&args.actual, None)?)?;

    let matched = engine
        .calculate_variances(&args.date, &args.amount, &args.category)?
        .clone();
    let significant = engine.significant_variances(args.threshold, None)?;
    let ytd = if args.ytd {
        Some(engine.ytd_performance(&args.date, &args.amount, &args.category)?)
    } else {
        None
    };

    if let Some(path) = &args.output {
        let text = finclean::pipeline::to_csv_text(&matched, engine.config().csv_separator)?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Variance table written to {}", path.display());
    }

    if json_output {
        let mut summary = json!({
            "matched_rows": matched.height(),
            "significant": finclean::pipeline::to_records(&significant)?,
            "log": engine.log(),
        });
        if let Some(ytd) = &ytd {
            summary["ytd"] = json!(finclean::pipeline::to_records(ytd)?);
        }
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    println!("{}", "=".repeat(80));
    println!("VARIANCE ANALYSIS");
    println!("{}", "=".repeat(80));
    println!("Matched rows:        {}", matched.height());
    println!("Significant rows:    {}", significant.height());
    if significant.height() > 0 {
        println!("{significant}");
    }
    if let Some(ytd) = &ytd {
        println!();
        println!("YEAR TO DATE");
        println!("{}", "-".repeat(40));
        println!("{ytd}");
    }
    Ok(())
}

fn run_prune(args: &PruneArgs, json_output: bool) -> Result<()> {
    let policy = RetentionPolicy {
        max_files: args.max_files,
        max_age_days: args.max_age_days,
        ..RetentionPolicy::default()
    };
    let report = prune_logs(&args.dir, &policy)
        .with_context(|| format!("Failed to prune {}", args.dir.display()))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Kept {} files, deleted {}, failed {}",
            report.kept,
            report.deleted.len(),
            report.failed.len()
        );
    }
    Ok(())
}

/// Split `column=method`.
fn parse_impute(spec: &str) -> Result<(String, String)> {
    let (column, method) = spec
        .split_once('=')
        .ok_or_else(|| anyhow!("expected COLUMN=METHOD, got '{spec}'"))?;
    Ok((column.trim().to_string(), method.trim().to_string()))
}

fn selection(columns: &[String]) -> ColumnSelection {
    if columns.is_empty() {
        ColumnSelection::All
    } else {
        ColumnSelection::named(columns.iter().cloned())
    }
}

/// Print a human-readable summary of the cleaning run.
///
/// Uses `println!` on purpose: this is the command's output, not a log.
fn print_clean_summary(
    input: &Path,
    before: (usize, usize),
    after: (usize, usize),
    log: &[OperationLogEntry],
) {
    println!();
    println!("{}", "=".repeat(80));
    println!("CLEANING COMPLETE");
    println!("{}", "=".repeat(80));
    println!();
    println!("Input:  {} ({} rows x {} columns)", input.display(), before.0, before.1);
    println!("Result: {} rows x {} columns", after.0, after.1);
    println!();
    println!("OPERATIONS");
    println!("{}", "-".repeat(40));
    for entry in log {
        println!(
            "  {:>2}. {:<26} {}",
            entry.sequence,
            entry.operation.as_str(),
            entry.timestamp.format("%H:%M:%S")
        );
    }
    println!();
}
