use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    dialect::{Quoting, parse_dialect_char},
    encoding::TextEncoding,
    error::ImportError,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Import delimited text into typed column pages", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub dialect: DialectArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Plan an import and optionally execute it
    Import(ImportArgs),
    /// Run a single slice: one page per kept column (worker entry point)
    Task(TaskArgs),
}

#[derive(Debug, Args)]
pub struct DialectArgs {
    /// Character encoding of the input file
    #[arg(long, global = true, default_value = "utf8", value_parser = parse_encoding)]
    pub encoding: TextEncoding,
    /// Field delimiter (supports ',', 'tab', ';', '|'; defaults by extension)
    #[arg(long, global = true, value_parser = parse_delimiter)]
    pub delimiter: Option<char>,
    /// Quote character
    #[arg(long, global = true, default_value = "\"", value_parser = parse_quotechar)]
    pub quotechar: char,
    /// Escape character
    #[arg(long, global = true, default_value = "\\", value_parser = parse_escapechar)]
    pub escapechar: char,
    /// Line terminator character (informational; reading splits on newline)
    #[arg(long, global = true, default_value = "\\n", value_parser = parse_lineterminator)]
    pub lineterminator: char,
    /// Treat a doubled quote character as a literal quote (the default)
    #[arg(long, global = true)]
    pub doublequote: bool,
    /// Disable doubled-quote handling
    #[arg(long, global = true, conflicts_with = "doublequote")]
    pub no_doublequote: bool,
    /// Discard spaces immediately after a delimiter
    #[arg(long, global = true)]
    pub skipinitialspace: bool,
    /// Trim trailing spaces from each field
    #[arg(long, global = true)]
    pub skiptrailingspace: bool,
    /// Fail on malformed quoting instead of recovering
    #[arg(long, global = true)]
    pub strict: bool,
    /// Quoting mode (QUOTE_MINIMAL, QUOTE_ALL, QUOTE_NONNUMERIC, QUOTE_NONE,
    /// QUOTE_STRINGS, QUOTE_NOTNULL)
    #[arg(long, global = true, default_value = "QUOTE_MINIMAL", value_parser = parse_quoting)]
    pub quoting: Quoting,
    /// Infer column types instead of importing everything as text
    #[arg(long = "guess-dtypes", alias = "guess_dtypes", global = true)]
    pub guess_dtypes: bool,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Input delimited text file
    pub input: PathBuf,
    /// Execute the planned tasks after planning
    #[arg(value_parser = clap::value_parser!(bool), action = clap::ArgAction::Set, default_value_t = false)]
    pub execute: bool,
    /// Fan tasks out to worker processes instead of running serially
    #[arg(value_parser = clap::value_parser!(bool), action = clap::ArgAction::Set, default_value_t = false)]
    pub multiprocess: bool,
    /// Working directory; pages land in `<dir>/pages/`
    #[arg(short = 'd', long = "dir", default_value = ".")]
    pub dir: PathBuf,
    /// Restrict the import to this comma-separated list of columns
    #[arg(short = 'C', long = "columns", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub columns: Vec<String>,
    /// Records per page
    #[arg(long = "page-size", default_value_t = 1_000_000)]
    pub page_size: usize,
    /// Limit number of data records to plan (useful for prototyping)
    #[arg(long)]
    pub limit: Option<usize>,
    /// External fan-out runner consuming one worker command per line
    #[arg(long, default_value = crate::dispatch::DEFAULT_RUNNER)]
    pub runner: String,
}

#[derive(Debug, Args)]
pub struct TaskArgs {
    /// Destination page files, one per kept column
    #[arg(long, required = true, value_delimiter = ',')]
    pub pages: Vec<PathBuf>,
    /// Source field index feeding each page, same order as --pages
    #[arg(long, required = true, value_delimiter = ',')]
    pub fields: Vec<usize>,
    /// Input delimited text file
    pub input: PathBuf,
    /// Byte offset of the first record of the slice
    pub offset: u64,
    /// Number of records in the slice
    pub rows: usize,
}

fn parse_encoding(value: &str) -> Result<TextEncoding, ImportError> {
    value.parse()
}

fn parse_quoting(value: &str) -> Result<Quoting, ImportError> {
    value.parse()
}

fn parse_delimiter(value: &str) -> Result<char, ImportError> {
    parse_dialect_char("delimiter", value)
}

fn parse_quotechar(value: &str) -> Result<char, ImportError> {
    parse_dialect_char("quotechar", value)
}

fn parse_escapechar(value: &str) -> Result<char, ImportError> {
    parse_dialect_char("escapechar", value)
}

fn parse_lineterminator(value: &str) -> Result<char, ImportError> {
    parse_dialect_char("lineterminator", value)
}
