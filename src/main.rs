use anyhow::{Context, Result};
use batch_runner::{BatchReport, BatchRunner, CsvBarSource, SummaryRow, write_report_json, write_summary_csv};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_FULL};
use configuration::{Config, SizingMethod, SortKey, load_config};
use core_types::StrategyId;
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// The main entry point for the backtesting application.
fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let _guard = init_tracing(args.log_dir.as_deref())?;
            handle_run(args)
        }
        Commands::ShowConfig(args) => {
            let _guard = init_tracing(None)?;
            let config = load_config(&args.config).context("failed to load configuration")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Event-driven T+1 backtesting for single instruments, run in batches.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest every configured instrument and write the summary.
    Run(RunArgs),
    /// Print the effective configuration after file and environment overrides.
    ShowConfig(ShowConfigArgs),
}

#[derive(Parser)]
struct ShowConfigArgs {
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "config.toml")]
    config: PathBuf,
}

#[derive(Parser)]
struct RunArgs {
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "config.toml")]
    config: PathBuf,

    /// Comma-separated instrument codes, replacing the configured list.
    #[arg(long, value_delimiter = ',')]
    instruments: Vec<String>,

    /// Directory holding one `<instrument>.csv` per instrument.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Strategy to run: ma_crossover, rsi or weekly_dca.
    #[arg(long, value_parser = parse_strategy_id)]
    strategy: Option<StrategyId>,

    /// Buy sizing rule.
    #[arg(long, value_enum)]
    sizing: Option<SizingMethod>,

    /// First date to include (format: YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last date to include (format: YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Summary column to sort by.
    #[arg(long, value_enum)]
    sort_by: Option<SortKey>,

    /// Sort ascending instead of descending.
    #[arg(long)]
    ascending: bool,

    /// Worker threads (defaults to one per CPU).
    #[arg(long)]
    workers: Option<usize>,

    /// Summary CSV output path.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Also write the full report, ledgers included, as JSON.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write a daily rolling log file into this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Hide the progress bar.
    #[arg(long)]
    quiet: bool,
}

fn parse_strategy_id(raw: &str) -> Result<StrategyId, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| format!("unknown strategy '{raw}' (expected ma_crossover, rsi or weekly_dca)"))
}

// ==============================================================================
// Logging
// ==============================================================================

/// Logs to stderr, filtered by `RUST_LOG` (default `info`), and optionally to a
/// daily rolling file. The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "backtest.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr_layer).try_init()?;
            Ok(None)
        }
    }
}

// ==============================================================================
// Run Command Logic
// ==============================================================================

fn apply_overrides(config: &mut Config, args: &RunArgs) {
    let batch = &mut config.batch;
    if !args.instruments.is_empty() {
        batch.instruments = args.instruments.clone();
    }
    if let Some(dir) = &args.data_dir {
        batch.data_dir = dir.clone();
    }
    if args.from.is_some() {
        batch.start_date = args.from;
    }
    if args.to.is_some() {
        batch.end_date = args.to;
    }
    if let Some(key) = args.sort_by {
        batch.sort_by = key;
    }
    if args.ascending {
        batch.descending = false;
    }
    if args.workers.is_some() {
        batch.workers = args.workers;
    }
    if let Some(path) = &args.output {
        batch.output_path = path.clone();
    }
    if args.report.is_some() {
        batch.report_path = args.report.clone();
    }
    if let Some(id) = args.strategy {
        config.strategy.id = id;
    }
    if let Some(method) = args.sizing {
        config.sizing.method = method;
    }
}

/// Handles the orchestration of a batch run.
fn handle_run(args: RunArgs) -> Result<()> {
    let mut config = load_config(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?;
    apply_overrides(&mut config, &args);
    config.validate().context("invalid configuration after command-line overrides")?;

    let source = CsvBarSource::new(config.batch.data_dir.clone());
    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("=>-"),
        );
        bar
    };

    let runner = BatchRunner::new(config.clone(), Box::new(source))?.with_progress(progress);
    let report = runner.run()?;

    println!("{}", render_table(&report));

    write_summary_csv(&report.rows, &config.batch.output_path)
        .with_context(|| format!("failed to write {}", config.batch.output_path.display()))?;
    if let Some(path) = &config.batch.report_path {
        write_report_json(&report, path).with_context(|| format!("failed to write {}", path.display()))?;
    }

    println!(
        "Batch {} complete: summary written to {}",
        report.batch_id,
        config.batch.output_path.display()
    );
    Ok(())
}

fn pct(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}%", v * dec!(100)))
}

fn ratio(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn count<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn render_table(report: &BatchReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Instrument",
        "Status",
        "Total Return",
        "Annualized",
        "Sharpe",
        "Max DD",
        "Win Rate",
        "Trades",
        "Final Equity",
        "Error",
    ]);

    for row in &report.rows {
        table.add_row(row_cells(row));
    }
    table
}

fn row_cells(row: &SummaryRow) -> Vec<Cell> {
    let numeric = |text: String| Cell::new(text).set_alignment(CellAlignment::Right);
    vec![
        Cell::new(&row.instrument),
        Cell::new(row.status),
        numeric(pct(row.total_return)),
        numeric(pct(row.annualized_return)),
        numeric(ratio(row.sharpe_ratio)),
        numeric(pct(row.max_drawdown)),
        numeric(pct(row.win_rate)),
        numeric(count(row.trade_count)),
        numeric(ratio(row.final_equity)),
        Cell::new(row.error.as_deref().unwrap_or("")),
    ]
}
