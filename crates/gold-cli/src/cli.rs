//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

use gold_model::ExistsPolicy;

#[derive(Parser)]
#[command(
    name = "gold",
    version,
    about = "Gold-layer pipeline for clinical time series",
    long_about = "Turn standardized long-format clinical observations into an analysis-ready\n\
                  wide table: reshape, aggregate into time windows, impute missing values,\n\
                  compute derived parameters and clinical scores."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the pipeline on the configured input table.
    Run(RunArgs),

    /// List schemas in the store.
    Schemas(StoreArgs),

    /// List tables in a schema.
    Tables(TablesArgs),

    /// List the columns of a table.
    Columns(ColumnsArgs),
}

/// Where tables are read from and written to.
#[derive(Args)]
pub struct StoreArgs {
    /// Store root: one directory per schema, one CSV file per table.
    #[arg(long = "data-dir", value_name = "DIR")]
    pub data_dir: PathBuf,

    /// Database settings (.json or .toml with a `database` section).
    #[arg(long = "database", value_name = "FILE")]
    pub database: Option<PathBuf>,
}

#[derive(Parser)]
pub struct RunArgs {
    /// Pipeline configuration (.json or .toml).
    #[arg(long = "config", value_name = "FILE")]
    pub config: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Load with this query instead of the configured input table.
    #[arg(long = "query", value_name = "SQL")]
    pub query: Option<String>,

    /// Persist the result to the output table.
    #[arg(long = "save")]
    pub save: bool,

    /// Output table (default: `output_table` from the configuration).
    #[arg(long = "output-table", value_name = "TABLE")]
    pub output_table: Option<String>,

    /// Output schema (default: the store's output schema).
    #[arg(long = "output-schema", value_name = "SCHEMA")]
    pub output_schema: Option<String>,

    /// Behavior when the output table exists (default: from configuration).
    #[arg(long = "if-exists", value_enum)]
    pub if_exists: Option<ExistsPolicyArg>,

    /// Write the run report as JSON to this file.
    #[arg(long = "report", value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Exit with a non-zero status when any item was skipped.
    #[arg(long = "fail-on-skipped")]
    pub fail_on_skipped: bool,
}

#[derive(Parser)]
pub struct TablesArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Schema to list (default: the input schema).
    #[arg(long = "schema", value_name = "SCHEMA")]
    pub schema: Option<String>,
}

#[derive(Parser)]
pub struct ColumnsArgs {
    /// Table name.
    #[arg(value_name = "TABLE")]
    pub table: String,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Schema containing the table (default: the input schema).
    #[arg(long = "schema", value_name = "SCHEMA")]
    pub schema: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExistsPolicyArg {
    Fail,
    Replace,
    Append,
}

impl From<ExistsPolicyArg> for ExistsPolicy {
    fn from(arg: ExistsPolicyArg) -> Self {
        match arg {
            ExistsPolicyArg::Fail => Self::Fail,
            ExistsPolicyArg::Replace => Self::Replace,
            ExistsPolicyArg::Append => Self::Append,
        }
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
