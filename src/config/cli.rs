use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use gadfly_api_types::DEFAULT_UPLOAD_JURISDICTION;

/// Command-line arguments for the Gadfly binary.
#[derive(Debug, Parser)]
#[command(
    name = "gadfly",
    version,
    about = "Gadfly meeting-summary client with a dependent query cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "GADFLY_CONFIG_FILE",
        value_name = "PATH",
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the API base URL.
    #[arg(long = "api-base-url", value_name = "URL", global = true)]
    pub api_base_url: Option<String>,

    /// Override the per-request timeout in milliseconds.
    #[arg(long = "api-timeout-ms", value_name = "MILLIS", global = true)]
    pub api_timeout_ms: Option<u64>,

    /// Override the maximum number of cached queries.
    #[arg(long = "cache-max-entries", value_name = "COUNT", global = true)]
    pub cache_max_entries: Option<usize>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Check that the API is reachable.
    Health,
    /// List jurisdictions.
    Jurisdictions,
    /// List meetings, optionally for one jurisdiction.
    Meetings {
        /// Only meetings of this jurisdiction.
        #[arg(long)]
        jurisdiction: Option<String>,
        /// Keep meetings whose title contains this text (case-insensitive).
        #[arg(long)]
        search: Option<String>,
    },
    /// List summaries of a meeting.
    Summaries {
        #[arg(long)]
        meeting: String,
    },
    /// Request summary generation for a meeting.
    Summarize {
        #[arg(long)]
        meeting: String,
        /// Keep existing summaries instead of regenerating them.
        #[arg(long = "no-force", action = clap::ArgAction::SetTrue)]
        no_force: bool,
    },
    /// Upload a meeting document.
    Upload {
        #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_UPLOAD_JURISDICTION)]
        jurisdiction: String,
    },
    /// Drive the dashboard interactively with line commands on stdin.
    Session,
}
