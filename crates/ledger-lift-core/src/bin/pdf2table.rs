use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ledger_lift_core::export::write_table_csv;
use ledger_lift_core::{
    ColumnSpec, DateOrder, Document, ExtractOptions, ExtractWarning, HeaderMode, PageSelection,
    QualityMode, RegionOutput, RunControl, Selection, Table,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pdf2table",
    version,
    about = "Turn PDF bank statements and documents into tables"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Classify every page as digital or scanned.
    Analyze(CommonArgs),
    /// List the positioned words of one page.
    Spans(SpansArgs),
    /// Extract a table or text from a rectangle on one page.
    Region(RegionArgs),
    /// Extract user-defined columns across pages.
    Columns(ColumnsArgs),
    /// Infer bank statement transactions.
    Smart(SmartArgs),
    /// Detect tables on every page and merge continuations.
    Tables(TablesArgs),
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// Input PDF path.
    #[arg(short, long)]
    input: PathBuf,

    /// Write CSV here instead of printing JSON.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output delimiter character.
    #[arg(long, default_value = ",")]
    delimiter: char,

    /// Vertical tolerance in points when grouping words into rows.
    #[arg(long)]
    row_tolerance: Option<f32>,

    /// Pages processed in parallel.
    #[arg(long)]
    max_workers: Option<usize>,

    /// Enable verbose warning output.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Args)]
struct SpansArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// 1-based page number.
    #[arg(long, default_value_t = 1)]
    page: u32,
}

#[derive(Debug, Args)]
struct RegionArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Selection in format page:x,y,width,height (points, top-left origin).
    #[arg(long)]
    selection: String,
}

#[derive(Debug, Args)]
struct ColumnsArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Column band in format name:x0-x1. Repeatable.
    #[arg(long = "column", required = true)]
    columns: Vec<String>,

    /// Page selection like 1-3,5.
    #[arg(long)]
    pages: Option<String>,
}

#[derive(Debug, Args)]
struct SmartArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Read numeric dates as month/day instead of day/month.
    #[arg(long)]
    month_first: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Quality {
    BestEffort,
    Strict,
    SkipAmbiguous,
}

#[derive(Debug, Args)]
struct TablesArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Force header interpretation on first row of each table.
    #[arg(long, conflicts_with = "no_header")]
    has_header: bool,

    /// Disable header interpretation; keep first row as data.
    #[arg(long, conflicts_with = "has_header")]
    no_header: bool,

    /// Minimum cells required per candidate table row.
    #[arg(long, default_value_t = 2)]
    min_cols: usize,

    /// How low-confidence tables are handled.
    #[arg(long, value_enum, default_value_t = Quality::BestEffort)]
    quality: Quality,
}

fn base_options(args: &CommonArgs) -> ExtractOptions {
    let mut options = ExtractOptions::default();
    if let Some(tolerance) = args.row_tolerance {
        options.row_tolerance = tolerance;
    }
    if let Some(workers) = args.max_workers {
        options.max_workers = workers;
    }
    options
}

fn open_document(args: &CommonArgs, options: ExtractOptions) -> Result<Document> {
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("failed to read '{}'", args.input.display()))?;
    Document::open(bytes, options)
        .with_context(|| format!("failed to open '{}'", args.input.display()))
}

fn delimiter(args: &CommonArgs) -> Result<u8> {
    u8::try_from(args.delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| anyhow!("delimiter must be a single ASCII character"))
}

fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, value).context("failed to write JSON output")?;
    writeln!(handle).context("failed to write JSON output")?;
    Ok(())
}

/// Prints `value` as JSON, or writes `table` as CSV when `--output` is set.
/// Returns the number of rows emitted.
fn emit<T: Serialize>(args: &CommonArgs, value: &T, table: &Table) -> Result<usize> {
    match &args.output {
        Some(path) => write_csv(path, table, delimiter(args)?)?,
        None => write_json(value)?,
    }
    Ok(table.rows.len())
}

fn write_csv(path: &Path, table: &Table, delimiter: u8) -> Result<()> {
    write_table_csv(path, table, delimiter)
        .with_context(|| format!("failed to write CSV to '{}'", path.display()))
}

fn log_warnings(warnings: &[ExtractWarning], verbose: bool) {
    if warnings.is_empty() {
        return;
    }

    eprintln!("warning: {} issue(s) detected", warnings.len());
    if verbose {
        for warning in warnings {
            eprintln!(
                "  - {:?} page={:?} table_id={:?} confidence={:?}: {}",
                warning.code, warning.page, warning.table_id, warning.confidence, warning.message
            );
        }
    }
}

fn run_analyze(args: &CommonArgs) -> Result<usize> {
    let document = open_document(args, base_options(args))?;
    let analysis = document.analyze().context("failed to analyze pages")?;
    write_json(&analysis)?;
    Ok(analysis.total_pages)
}

fn run_spans(args: &SpansArgs) -> Result<usize> {
    let document = open_document(&args.common, base_options(&args.common))?;
    let words = document
        .text_spans(args.page)
        .with_context(|| format!("failed to read words on page {}", args.page))?;
    let rows = words
        .iter()
        .map(|word| {
            vec![
                word.text.clone(),
                format!("{:.2}", word.x0),
                format!("{:.2}", word.y0),
                format!("{:.2}", word.x1),
                format!("{:.2}", word.y1),
                word.confidence.map(|c| format!("{c:.2}")).unwrap_or_default(),
            ]
        })
        .collect();
    let headers = ["text", "x0", "y0", "x1", "y1", "confidence"]
        .map(str::to_string)
        .to_vec();
    emit(&args.common, &words, &Table::new(headers, rows))
}

fn run_region(args: &RegionArgs) -> Result<usize> {
    let selection = Selection::from_str(&args.selection)
        .map_err(|error| anyhow!("invalid selection: {error}"))
        .context("failed to parse --selection")?;
    let document = open_document(&args.common, base_options(&args.common))?;
    let extraction = document
        .extract_region(&selection)
        .context("failed to extract the selected region")?;
    log_warnings(&extraction.warnings, args.common.verbose);

    let table = match &extraction.output {
        RegionOutput::Table(table) => table.clone(),
        RegionOutput::Text { text } => Table::new(
            vec!["text".to_string()],
            text.lines().map(|line| vec![line.to_string()]).collect(),
        ),
    };
    emit(&args.common, &extraction, &table)
}

fn run_columns(args: &ColumnsArgs) -> Result<usize> {
    let columns = args
        .columns
        .iter()
        .map(|value| {
            ColumnSpec::from_str(value)
                .map_err(|error| anyhow!("invalid column: {error}"))
                .with_context(|| format!("failed to parse --column '{value}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    let document = open_document(&args.common, base_options(&args.common))?;
    let pages = match args.pages.as_deref() {
        Some(spec) => PageSelection::from_str(spec)
            .map_err(|error| anyhow!("invalid page selection: {error}"))
            .context("failed to parse --pages")?,
        None => PageSelection::range(1, document.page_count()),
    };

    let extraction = document
        .extract_columns(&columns, &pages, &RunControl::default())
        .context("failed to extract columns")?;
    log_warnings(&extraction.warnings, args.common.verbose);
    emit(&args.common, &extraction, &extraction.to_table())
}

fn run_smart(args: &SmartArgs) -> Result<usize> {
    let mut options = base_options(&args.common);
    if args.month_first {
        options.statement.date_order = DateOrder::MonthFirst;
    }
    let document = open_document(&args.common, options)?;
    let extraction = document
        .extract_smart(&RunControl::default())
        .context("failed to infer transactions")?;
    log_warnings(&extraction.warnings, args.common.verbose);
    emit(&args.common, &extraction, &extraction.to_table())
}

fn run_tables(args: &TablesArgs) -> Result<usize> {
    let mut options = base_options(&args.common);
    options.min_cols = args.min_cols;
    options.header_mode = if args.has_header {
        HeaderMode::HasHeader
    } else if args.no_header {
        HeaderMode::NoHeader
    } else {
        HeaderMode::AutoDetect
    };
    options.quality_mode = match args.quality {
        Quality::BestEffort => QualityMode::BestEffort,
        Quality::Strict => QualityMode::Strict,
        Quality::SkipAmbiguous => QualityMode::SkipAmbiguous,
    };

    let document = open_document(&args.common, options)?;
    let extraction = document
        .extract_faithful_tables(&RunControl::default())
        .context("failed to detect tables")?;
    log_warnings(&extraction.warnings, args.common.verbose);

    // CSV output carries one table per file: the first gets the given path,
    // the rest get a numbered sibling.
    let Some(path) = &args.common.output else {
        write_json(&extraction)?;
        return Ok(extraction.tables.iter().map(|table| table.rows.len()).sum());
    };
    let delimiter = delimiter(&args.common)?;
    let mut rows = 0;
    for (index, table) in extraction.tables.iter().enumerate() {
        let target = if index == 0 {
            path.clone()
        } else {
            numbered_path(path, index + 1)
        };
        write_csv(&target, &table.to_table(), delimiter)?;
        rows += table.rows.len();
    }
    Ok(rows)
}

fn numbered_path(path: &Path, index: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map_or_else(|| "table".into(), |stem| stem.to_string_lossy());
    let name = match path.extension() {
        Some(extension) => format!("{stem}_{index}.{}", extension.to_string_lossy()),
        None => format!("{stem}_{index}"),
    };
    path.with_file_name(name)
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ledger_lift_core=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    let outcome = match &cli.command {
        Commands::Analyze(args) => run_analyze(args),
        Commands::Spans(args) => run_spans(args),
        Commands::Region(args) => run_region(args),
        Commands::Columns(args) => run_columns(args),
        Commands::Smart(args) => run_smart(args),
        Commands::Tables(args) => run_tables(args),
    };

    match outcome {
        Ok(rows) if rows > 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
