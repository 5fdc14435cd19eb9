//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::Priority;
use crate::queue::QueueConfig;

/// tq - priority task queue with concurrency and rate limits
#[derive(Parser)]
#[command(
    name = "tq",
    about = "Run work through a priority queue with concurrency and rate limits",
    version = env!("GIT_DESCRIBE"),
    after_help = after_help()
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Queue limit overrides shared by the subcommands that run a queue
#[derive(Debug, Clone, Default, clap::Args)]
pub struct QueueArgs {
    /// Max simultaneously running tasks
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Max tasks started per rate window
    #[arg(long = "interval-cap")]
    pub interval_cap: Option<usize>,

    /// Rate window length in milliseconds
    #[arg(long = "interval-ms")]
    pub interval_ms: Option<u64>,

    /// Count still-running tasks against the next rate window
    #[arg(long)]
    pub carryover: bool,
}

impl QueueArgs {
    /// Layer the command-line limits over the configured ones
    pub fn apply(&self, mut config: QueueConfig) -> QueueConfig {
        debug!(?self, "QueueArgs::apply: called");
        if self.concurrency.is_some() {
            config.concurrency = self.concurrency;
        }
        if self.interval_cap.is_some() {
            config.interval_cap = self.interval_cap;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.interval_ms = interval_ms;
        }
        if self.carryover {
            config.carryover_concurrency_count = true;
        }
        config
    }
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Probe every item listed in a file through the queue
    Probe {
        /// File with one `key url` (or just `url`) per line
        file: PathBuf,

        /// Urgency of the probes (low, normal, high, critical)
        #[arg(short, long)]
        priority: Option<Priority>,

        /// Base URL relative locations are resolved against
        #[arg(short, long)]
        backend: Option<String>,

        /// Workspace sent with every probe
        #[arg(short, long)]
        workspace: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        #[command(flatten)]
        queue: QueueArgs,
    },

    /// Run synthetic tasks through the queue and report when each started
    Simulate {
        /// Number of tasks to submit
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// Shortest task duration in milliseconds
        #[arg(long = "min-ms", default_value = "50")]
        min_ms: u64,

        /// Longest task duration in milliseconds
        #[arg(long = "max-ms", default_value = "250")]
        max_ms: u64,

        /// Probability that a task fails
        #[arg(long = "fail-rate", default_value = "0.0")]
        fail_rate: f64,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        #[command(flatten)]
        queue: QueueArgs,
    },

    /// Print the effective configuration
    Config,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskqueue")
        .join("logs")
        .join("tq.log");
    debug!(?path, "get_log_path: returning path");
    path
}

fn after_help() -> String {
    format!("Logs are written to: {}", get_log_path().display())
}

/// Output format for probe/simulate results
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use: text or json", s))
            }
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
