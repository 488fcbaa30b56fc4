use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

use crate::{import_log::LogLevel, naming::NamingConvention, source::SheetLookup};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Turn published spreadsheet tabs into typed master tables",
    long_about = None
)]
pub struct Cli {
    /// Settings YAML (defaults apply to anything it omits)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Infer a column schema from a CSV snapshot and write it as YAML
    Probe(ProbeArgs),
    /// Generate the table and record sources from a snapshot or schema
    Generate(GenerateArgs),
    /// Import a CSV snapshot through a schema and show the records
    Import(ImportArgs),
    /// Print export and edit URLs for configured sheets
    Url(UrlArgs),
    /// Download configured sheets and write them as CSV snapshots
    #[cfg(feature = "http")]
    Fetch(FetchArgs),
}

/// Options shared by commands that infer a schema from CSV.
#[derive(Debug, Args, Clone, Default)]
pub struct InferenceArgs {
    /// Exclude columns whose header contains this text (repeatable)
    #[arg(long = "ignore-column", action = clap::ArgAction::Append)]
    pub ignore_columns: Vec<String>,
    /// Exclude the row at this 1-based line number (repeatable)
    #[arg(long = "ignore-line", action = clap::ArgAction::Append)]
    pub ignore_lines: Vec<usize>,
    /// Exclude rows whose first cell equals this text (repeatable)
    #[arg(long = "ignore-first-cell", action = clap::ArgAction::Append)]
    pub ignore_first_cells: Vec<String>,
    /// Naming convention the sheet headers are written in
    #[arg(long = "column-naming", value_enum)]
    pub column_naming: Option<NamingConvention>,
    /// Override a column's type with an enum, as `header=EnumName` (repeatable)
    #[arg(long = "enum", value_parser = parse_enum_override, action = clap::ArgAction::Append)]
    pub enums: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// CSV snapshot whose first line is the header
    #[arg(short, long)]
    pub input: PathBuf,
    /// Master name the table types derive from (e.g. `character`)
    #[arg(short, long)]
    pub name: String,
    /// Destination schema YAML (defaults to `<schema_dir>/<name>.yml`)
    #[arg(short, long)]
    pub schema: Option<PathBuf>,
    /// Tab name recorded in the schema (defaults to the master name)
    #[arg(long = "sheet-name")]
    pub sheet_name: Option<String>,
    #[command(flatten)]
    pub inference: InferenceArgs,
    /// Do not print the inferred columns
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("source").required(true).args(["input", "schema"])))]
pub struct GenerateArgs {
    /// CSV snapshot to infer the schema from
    #[arg(short, long)]
    pub input: Option<PathBuf>,
    /// Previously probed (and possibly edited) schema YAML
    #[arg(short, long)]
    pub schema: Option<PathBuf>,
    /// Master name, required with --input
    #[arg(short, long, required_unless_present = "schema")]
    pub name: Option<String>,
    /// Output directory (defaults to `script_dir` from the settings)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
    /// Module path to wrap the generated items in
    #[arg(long)]
    pub namespace: Option<String>,
    #[arg(long = "spreadsheet-id")]
    pub spreadsheet_id: Option<String>,
    #[arg(long = "sheet-id")]
    pub sheet_id: Option<String>,
    #[command(flatten)]
    pub inference: InferenceArgs,
    /// Compare with the files on disk instead of writing; fails on drift
    #[arg(long)]
    pub check: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// CSV snapshot whose first line is the header
    #[arg(short, long)]
    pub input: PathBuf,
    /// Schema YAML; inferred from the snapshot when omitted
    #[arg(short, long)]
    pub schema: Option<PathBuf>,
    /// Master name used when inferring the schema
    #[arg(short, long, default_value = "sheet")]
    pub name: String,
    #[command(flatten)]
    pub inference: InferenceArgs,
    /// Minimum severity that makes the import report print
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevel>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
    /// Print only the record with this key
    #[arg(long)]
    pub key: Option<i64>,
}

#[derive(Debug, Args)]
pub struct UrlArgs {
    /// Sheet (tab name or table name) to print; all configured sheets when omitted
    pub sheet: Option<String>,
    #[arg(long = "spreadsheet-id")]
    pub spreadsheet_id: Option<String>,
    #[arg(long = "sheet-id")]
    pub sheet_id: Option<String>,
    #[arg(long = "sheet-name")]
    pub sheet_name: Option<String>,
    #[arg(long, value_enum)]
    pub lookup: Option<SheetLookup>,
}

#[cfg(feature = "http")]
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Sheet (tab name or table name) to download; all configured sheets when omitted
    pub sheet: Option<String>,
    #[arg(long = "spreadsheet-id")]
    pub spreadsheet_id: Option<String>,
    /// Snapshot directory (defaults to `csv_dir` from the settings)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

fn parse_enum_override(value: &str) -> Result<(String, String), String> {
    let (header, enum_name) = value
        .split_once('=')
        .ok_or_else(|| format!("Expected `header=EnumName`, got '{value}'"))?;
    let header = header.trim();
    let enum_name = enum_name.trim();
    if header.is_empty() || enum_name.is_empty() {
        return Err(format!("Expected `header=EnumName`, got '{value}'"));
    }
    Ok((header.to_string(), enum_name.to_string()))
}
