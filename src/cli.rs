//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Options left unset fall back to the
//! configuration file, then to built-in defaults.

use crate::config::{ReportFormat, SinkKind};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

/// packtally - windowed tally of portal CSV exports
///
/// Reads a zip of CSV files (or CSV files on disk), keeps the rows of the
/// current operational day, counts them per key and replaces a sheet with
/// the result.
///
/// Examples:
///   packtally --source export.zip
///   packtally --source export.zip --sink http --sink-url https://sheets.example.com/replace
///   packtally --source extracted/ --now 2024-03-10T08:00:00-03:00 --dry-run
///   packtally --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Zip archive, directory or CSV file to read
    #[arg(short, long, value_name = "PATH", env = "PACKTALLY_SOURCE")]
    pub source: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .packtally.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Treat "now" as this instant (RFC 3339) instead of the system clock
    #[arg(long, value_name = "DATETIME")]
    pub now: Option<DateTime<Utc>>,

    /// IANA timezone for naive timestamps and the boundary hour
    #[arg(long, value_name = "TZ", env = "PACKTALLY_TIMEZONE")]
    pub timezone: Option<String>,

    /// Hour (0-23) at which the operational day starts
    #[arg(long, value_name = "HOUR")]
    pub boundary_hour: Option<u32>,

    /// Read a/b/YYYY dates as day/month/year
    #[arg(long)]
    pub day_first: bool,

    /// CSV files have no header row
    #[arg(long)]
    pub no_headers: bool,

    /// Column index of the timestamp
    #[arg(long, value_name = "INDEX")]
    pub timestamp_column: Option<usize>,

    /// Column index of the grouping key
    #[arg(long, value_name = "INDEX")]
    pub key_column: Option<usize>,

    /// Column indices carried into the output (comma-separated)
    ///
    /// Example: --carry-columns 9,15,17,2
    #[arg(long, value_name = "INDICES", value_delimiter = ',')]
    pub carry_columns: Option<Vec<usize>>,

    /// Sink to write the result to
    #[arg(long, value_name = "KIND")]
    pub sink: Option<SinkKind>,

    /// Root directory of the csv/json sinks
    #[arg(long, value_name = "DIR")]
    pub sink_dir: Option<PathBuf>,

    /// Endpoint of the http sink
    #[arg(long, value_name = "URL", env = "PACKTALLY_SINK_URL")]
    pub sink_url: Option<String>,

    /// Spreadsheet name of the target
    #[arg(long, value_name = "NAME")]
    pub spreadsheet: Option<String>,

    /// Sheet name of the target
    #[arg(long, value_name = "NAME")]
    pub sheet: Option<String>,

    /// Move the processed archive here as <prefix><HH>.zip
    #[arg(long, value_name = "DIR")]
    pub stash_dir: Option<PathBuf>,

    /// Write a run report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Format of the run report (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub report_format: Option<ReportFormat>,

    /// Aggregate and print the result without writing to the sink
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .packtally.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(hour) = self.boundary_hour {
            if hour > 23 {
                return Err("Boundary hour must be between 0 and 23".to_string());
            }
        }

        if let Some(ref columns) = self.carry_columns {
            if columns.is_empty() {
                return Err("At least one carry column is required".to_string());
            }
        }

        if let Some(ref url) = self.sink_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Sink URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref source) = self.source {
            if !source.exists() {
                return Err(format!("Source does not exist: {}", source.display()));
            }
        }

        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args::parse_from(["packtally"])
    }

    #[test]
    fn test_defaults_leave_config_alone() {
        let args = make_args();
        assert!(args.source.is_none());
        assert!(args.sink.is_none());
        assert!(args.now.is_none());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::parse_from([
            "packtally",
            "--now",
            "2024-03-10T08:00:00-03:00",
            "--carry-columns",
            "9,15,17,2",
            "--sink",
            "http",
            "--sink-url",
            "https://sheets.example.com/replace",
            "--report-format",
            "json",
            "--dry-run",
        ]);

        assert_eq!(args.carry_columns, Some(vec![9, 15, 17, 2]));
        assert_eq!(args.sink, Some(SinkKind::Http));
        assert_eq!(args.report_format, Some(ReportFormat::Json));
        assert_eq!(
            args.now.unwrap().to_rfc3339(),
            "2024-03-10T11:00:00+00:00"
        );
        assert!(args.dry_run);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_bad_values() {
        let mut args = make_args();
        args.boundary_hour = Some(24);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.sink_url = Some("sheets.example.com".to_string());
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.source = Some(PathBuf::from("/no/such/export.zip"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
