//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    edit::EditArgs, init::InitArgs, list::ListArgs, new::NewArgs, show::ShowArgs, sql::SqlArgs,
};

#[derive(Parser)]
#[command(name = "gwm")]
#[command(author, version, about = "Generic Window Model")]
#[command(long_about = "Browse and edit the records of a window described by a YAML schema, \
with calculated properties kept up to date and records stored in SQLite.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging on stderr)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Window schema file (default: `schema` from .gwm/config.yaml)
    #[arg(long, short = 's', global = true)]
    pub schema: Option<PathBuf>,

    /// SQLite database file (default: `database` from .gwm/config.yaml)
    #[arg(long, short = 'd', global = true)]
    pub database: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the tables a window schema needs
    Init(InitArgs),

    /// Print the SQL generated for a window schema
    Sql(SqlArgs),

    /// List records with their titles and summaries
    List(ListArgs),

    /// Show one record with calculated values and grid rows
    Show(ShowArgs),

    /// Edit a record through the model and save it
    Edit(EditArgs),

    /// Create a record, optionally as a copy of another
    New(NewArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Automatically detect based on context (pretty for show, tsv for list)
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Markdown tables
    Md,
    /// Just record ids, one per line
    Id,
}

impl OutputFormat {
    /// Parse the `default_format` config value
    pub fn from_config(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(value, true).ok()
    }
}
