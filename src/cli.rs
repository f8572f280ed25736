//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::StorageBackend;
use clap::Parser;
use std::path::PathBuf;

/// OpsReview - operational review runner
///
/// Runs every configured analysis against a managed service instance in
/// parallel, stores each result, and consolidates whatever succeeded into
/// a single report.
///
/// Examples:
///   opsreview --days 7
///   opsreview --full --backend table
///   opsreview --status 01HZX3J9K7Q8C2W5V4T6N1M0PA
///   opsreview --list-reports
///   opsreview --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Number of days to analyze
    ///
    /// Defaults to the config file value (14 if unset).
    #[arg(short, long, value_name = "DAYS", conflicts_with_all = ["quick", "full"])]
    pub days: Option<u32>,

    /// Quick review (last 24 hours)
    #[arg(long, conflicts_with = "full")]
    pub quick: bool,

    /// Full review (last 30 days)
    #[arg(long)]
    pub full: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .opsreview.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Result store backend
    #[arg(long, value_name = "BACKEND", env = "OPSREVIEW_BACKEND")]
    pub backend: Option<StorageBackend>,

    /// Directory for consolidated reports
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Per-task request timeout in seconds
    ///
    /// Without it a hung analysis blocks the review indefinitely.
    #[arg(long, value_name = "SECS")]
    pub task_timeout: Option<u64>,

    /// Show the stored status of a review and exit
    #[arg(long, value_name = "REVIEW_ID", conflicts_with = "list_reports")]
    pub status: Option<String>,

    /// List recent reports and exit
    #[arg(long)]
    pub list_reports: bool,

    /// Output format for the review summary (text, json)
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .opsreview.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the review summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// JSON summary
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(days) = self.days {
            if days == 0 {
                return Err("Days must be at least 1".to_string());
            }
        }

        if let Some(timeout) = self.task_timeout {
            if timeout == 0 {
                return Err("Task timeout must be at least 1 second".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref review_id) = self.status {
            if review_id.trim().is_empty() {
                return Err("Review id must not be empty".to_string());
            }
        }

        Ok(())
    }

    /// Lookback window requested on the command line, if any.
    pub fn days_back(&self) -> Option<u32> {
        if self.quick {
            Some(1)
        } else if self.full {
            Some(30)
        } else {
            self.days
        }
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
