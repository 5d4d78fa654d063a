//! Command line entry point: cleans one xlsx workbook into json or xlsx.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use xlsx_dataprep::config::{
    parse_column_threshold, parse_dedup_ratio, Config, DEFAULT_HEADERS_FILE, DEFAULT_KEY_NAMES_FILE, KEY_NAME_MARKER,
};
use xlsx_dataprep::pipeline::DataPrep;
use xlsx_dataprep::detect::MIN_HEADER_CELLS;
use xlsx_dataprep::process::{DATA_ROW_MIN_CELLS, DEDUP_FILL_RATIO};
use xlsx_dataprep::write::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "dataprep", version, about = "Clean multi-row-header spreadsheet exports into normalized tables")]
struct Cli {
    /// Input workbook (.xlsx)
    input: PathBuf,

    /// Output file (.json or .xlsx)
    output: PathBuf,

    /// Minimum share of filled data rows for a column to be kept, between 0 and 1
    #[arg(value_parser = parse_column_threshold)]
    column_threshold: f64,

    /// Header translation table (CSV: source,target)
    #[arg(long, default_value = DEFAULT_HEADERS_FILE)]
    headers: PathBuf,

    /// Key names marking the first data row (CSV, first column)
    #[arg(long, default_value = DEFAULT_KEY_NAMES_FILE)]
    key_names: PathBuf,

    /// Output format, taken from the output extension when omitted
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Header text of the key column
    #[arg(long, default_value = KEY_NAME_MARKER)]
    marker: String,

    /// Rows above the marker with fewer non-empty cells end the header block
    #[arg(long, default_value_t = MIN_HEADER_CELLS)]
    min_header_cells: usize,

    /// Non-empty cells a row needs to count as a data row
    #[arg(long, default_value_t = DATA_ROW_MIN_CELLS)]
    min_data_cells: usize,

    /// Duplicate columns below this share of the best fill rate are dropped
    #[arg(long, default_value_t = DEDUP_FILL_RATIO, value_parser = parse_dedup_ratio)]
    dedup_ratio: f64,

    /// Log debug details
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        let mut config = Config::new(self.input, self.output, self.column_threshold);
        config.headers_file = self.headers;
        config.key_names_file = self.key_names;
        config.format = self.format;
        config.options.protected_marker = self.marker;
        config.options.min_header_cells = self.min_header_cells;
        config.options.data_row_min_cells = self.min_data_cells;
        config.options.dedup_fill_ratio = self.dedup_ratio;
        config
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.into_config();
    DataPrep::execute(&config)?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
