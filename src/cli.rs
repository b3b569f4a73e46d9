use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::constants::{DEFAULT_CONFIG_NAME, DEFAULT_EXPORT_NAME};

/// Command-line arguments for the aift evidence collector.
///
/// Global options pick the configuration file and the store; every action
/// is a subcommand. The read-side subcommands only ever see stored,
/// already-redacted values.
#[derive(Parser, Debug)]
#[clap(name = "aift", version, about = "Forensic collector for AI tool usage evidence")]
pub struct Args {
    /// Path to configuration YAML file
    #[clap(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Evidence store path (overrides the configuration)
    #[clap(long, global = true)]
    pub db: Option<PathBuf>,

    /// Verbose logging
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every enabled collector and store the evidence
    Collect(CollectOpts),

    /// Page through stored artifacts, newest first
    Browse(FilterOpts),

    /// Free-text search over previews, titles and paths
    Search {
        /// Text to look for (case-insensitive)
        text: String,

        #[clap(flatten)]
        filters: FilterOpts,
    },

    /// Timestamped artifacts in chronological order
    Timeline(FilterOpts),

    /// Totals by source, type and model
    Stats,

    /// Recent collection runs and their per-collector outcomes
    Runs {
        /// Number of runs to show
        #[clap(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Export stored artifacts
    Export {
        /// Output format
        #[clap(short, long, value_enum, default_value = "jsonl")]
        format: ExportFormatArg,

        /// Output file
        #[clap(short, long, default_value = DEFAULT_EXPORT_NAME)]
        output: PathBuf,

        #[clap(flatten)]
        filters: FilterOpts,
    },

    /// Create a configuration file with the built-in defaults
    InitConfig {
        /// Path to write the configuration file
        #[clap(default_value = DEFAULT_CONFIG_NAME)]
        path: PathBuf,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CollectOpts {
    /// Report which sources are present without reading or storing anything
    #[clap(long)]
    pub dry_run: bool,

    /// Collector worker threads (0 or 1 collects sequentially)
    #[clap(short, long)]
    pub workers: Option<usize>,

    /// Write the run summary as JSON to this path
    #[clap(long)]
    pub summary_json: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct FilterOpts {
    /// Only artifacts from this collector
    #[clap(short, long)]
    pub source: Option<String>,

    /// Only artifacts of this type (e.g. conversation_message)
    #[clap(short = 't', long = "type")]
    pub artifact_type: Option<String>,

    /// Inclusive lower time bound (RFC 3339 or YYYY-MM-DD)
    #[clap(long)]
    pub since: Option<String>,

    /// Exclusive upper time bound (RFC 3339 or YYYY-MM-DD)
    #[clap(long)]
    pub until: Option<String>,

    /// Only artifacts from this run
    #[clap(long)]
    pub run: Option<String>,

    /// Only artifacts where credential material was detected
    #[clap(long)]
    pub credentials: bool,

    /// Page size
    #[clap(short = 'n', long)]
    pub limit: Option<usize>,

    /// Continue from a cursor printed by a previous page
    #[clap(long)]
    pub cursor: Option<String>,

    /// Print JSON instead of a table
    #[clap(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormatArg {
    Json,
    Jsonl,
}
