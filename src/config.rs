//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.packtally.toml` files. Nothing about the portal, the sheet or the
//! timezone is hard-coded elsewhere; everything flows from [`Config`].

use crate::error::ConfigError;
use crate::models::{ColumnLayout, SinkTarget};
use crate::window::WindowPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".packtally.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Where the export is read from.
    #[serde(default)]
    pub source: SourceConfig,

    /// Timezone and boundary hour.
    #[serde(default)]
    pub window: WindowConfig,

    /// Column layout of the aggregation.
    #[serde(default)]
    pub aggregate: AggregateConfig,

    /// Where the result is written.
    #[serde(default)]
    pub sink: SinkConfig,

    /// Run report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// Source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Zip archive, directory or CSV file to read.
    #[serde(default = "default_source_path")]
    pub path: String,

    /// First row of every CSV is a header.
    #[serde(default = "default_true")]
    pub has_headers: bool,

    /// Directory processed archives are moved into; empty disables it.
    #[serde(default)]
    pub stash_dir: String,

    /// File name prefix of stashed archives.
    #[serde(default = "default_stash_prefix")]
    pub stash_prefix: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
            has_headers: true,
            stash_dir: String::new(),
            stash_prefix: default_stash_prefix(),
        }
    }
}

fn default_source_path() -> String {
    "export.zip".to_string()
}

fn default_stash_prefix() -> String {
    "TO-Packed".to_string()
}

fn default_true() -> bool {
    true
}

/// Window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// IANA timezone for naive timestamps and the boundary hour.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Hour (0-23) at which the operational day starts.
    #[serde(default = "default_boundary_hour")]
    pub boundary_hour: u32,

    /// Read `a/b/YYYY` dates as day/month.
    #[serde(default)]
    pub day_first: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            boundary_hour: default_boundary_hour(),
            day_first: false,
        }
    }
}

fn default_timezone() -> String {
    "America/Sao_Paulo".to_string()
}

fn default_boundary_hour() -> u32 {
    6
}

/// Aggregation column layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateConfig {
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: usize,

    #[serde(default)]
    pub key_column: usize,

    /// Columns copied from each group's representative row.
    #[serde(default = "default_carry_columns")]
    pub carry_columns: Vec<usize>,

    /// Output position of the count column.
    #[serde(default = "default_count_position")]
    pub count_position: usize,

    #[serde(default = "default_count_label")]
    pub count_label: String,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        let layout = ColumnLayout::default();
        Self {
            timestamp_column: layout.timestamp_column,
            key_column: layout.key_column,
            carry_columns: layout.carry_columns,
            count_position: layout.count_position,
            count_label: layout.count_label,
        }
    }
}

fn default_timestamp_column() -> usize {
    ColumnLayout::default().timestamp_column
}

fn default_carry_columns() -> Vec<usize> {
    ColumnLayout::default().carry_columns
}

fn default_count_position() -> usize {
    ColumnLayout::default().count_position
}

fn default_count_label() -> String {
    ColumnLayout::default().count_label
}

/// Kind of sink to write to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// One CSV file per sheet
    #[default]
    Csv,
    /// One JSON file per sheet
    Json,
    /// PUT to an HTTP endpoint
    Http,
}

/// Sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,

    /// Root directory of file sinks.
    #[serde(default = "default_sink_dir")]
    pub dir: String,

    /// Endpoint of the HTTP sink.
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_spreadsheet")]
    pub spreadsheet: String,

    #[serde(default = "default_sheet")]
    pub sheet: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Number of retries on failure.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Delay unit between retries; attempt `n` waits `n` times this.
    #[serde(default = "default_backoff")]
    pub backoff_seconds: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            dir: default_sink_dir(),
            url: String::new(),
            spreadsheet: default_spreadsheet(),
            sheet: default_sheet(),
            timeout_seconds: default_timeout(),
            retries: default_retries(),
            backoff_seconds: default_backoff(),
        }
    }
}

fn default_sink_dir() -> String {
    "out".to_string()
}

fn default_spreadsheet() -> String {
    "Base Sacas".to_string()
}

fn default_sheet() -> String {
    "Base".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_retries() -> usize {
    3
}

fn default_backoff() -> u64 {
    2
}

/// Report output format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Run report settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub format: ReportFormat,

    /// Output rows shown in the report preview.
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::default(),
            preview_rows: default_preview_rows(),
        }
    }
}

fn default_preview_rows() -> usize {
    20
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments (and their environment variables) take precedence over
    /// config file settings, but only when they were actually given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref source) = args.source {
            self.source.path = source.display().to_string();
        }
        if let Some(ref stash_dir) = args.stash_dir {
            self.source.stash_dir = stash_dir.display().to_string();
        }
        if args.no_headers {
            self.source.has_headers = false;
        }

        if let Some(ref timezone) = args.timezone {
            self.window.timezone = timezone.clone();
        }
        if let Some(hour) = args.boundary_hour {
            self.window.boundary_hour = hour;
        }
        if args.day_first {
            self.window.day_first = true;
        }

        if let Some(column) = args.timestamp_column {
            self.aggregate.timestamp_column = column;
        }
        if let Some(column) = args.key_column {
            self.aggregate.key_column = column;
        }
        if let Some(ref columns) = args.carry_columns {
            self.aggregate.carry_columns = columns.clone();
        }

        if let Some(kind) = args.sink {
            self.sink.kind = kind;
        }
        if let Some(ref dir) = args.sink_dir {
            self.sink.dir = dir.display().to_string();
        }
        if let Some(ref url) = args.sink_url {
            self.sink.url = url.clone();
        }
        if let Some(ref spreadsheet) = args.spreadsheet {
            self.sink.spreadsheet = spreadsheet.clone();
        }
        if let Some(ref sheet) = args.sheet {
            self.sink.sheet = sheet.clone();
        }

        if let Some(format) = args.report_format {
            self.report.format = format;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check values the type system can't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window_policy()?;

        if self.sink.spreadsheet.trim().is_empty() || self.sink.sheet.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Spreadsheet and sheet names must not be empty".to_string(),
            ));
        }

        if self.sink.kind == SinkKind::Http
            && !self.sink.url.starts_with("http://")
            && !self.sink.url.starts_with("https://")
        {
            return Err(ConfigError::Validation(
                "HTTP sink URL must start with 'http://' or 'https://'".to_string(),
            ));
        }

        if self.sink.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Sink timeout must be at least 1 second".to_string(),
            ));
        }

        if self.aggregate.count_label.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Count label must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Timestamp policy described by the `[window]` section.
    pub fn window_policy(&self) -> Result<WindowPolicy, ConfigError> {
        WindowPolicy::from_names(
            &self.window.timezone,
            self.window.boundary_hour,
            self.window.day_first,
        )
    }

    /// Column layout described by the `[aggregate]` section.
    pub fn layout(&self) -> ColumnLayout {
        ColumnLayout {
            timestamp_column: self.aggregate.timestamp_column,
            key_column: self.aggregate.key_column,
            carry_columns: self.aggregate.carry_columns.clone(),
            count_position: self.aggregate.count_position,
            count_label: self.aggregate.count_label.clone(),
        }
    }

    /// Sheet the sink writes into.
    pub fn target(&self) -> SinkTarget {
        SinkTarget {
            spreadsheet: self.sink.spreadsheet.clone(),
            sheet: self.sink.sheet.clone(),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&Config::default()).context("Failed to serialize default configuration")
    }
}
