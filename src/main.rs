//! Packtally - windowed tally of portal CSV exports
//!
//! Reads a report export (a zip of CSV files, or CSV files on disk),
//! keeps the rows of the current operational day, collapses them to one
//! row per key with a count, and replaces a sheet with the result.
//!
//! Exit codes:
//!   0 - Success, including "no rows in the window"
//!   1 - Runtime error (configuration, source or sink failure)

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod report;
mod sink;
mod source;
mod window;

use analysis::TimeWindowAggregator;
use anyhow::{Context, Result};
use chrono::{Timelike, Utc};
use cli::Args;
use config::{Config, ReportFormat, CONFIG_FILE};
use models::{Aggregation, OutputTable, RunMetadata, SinkOutcome, SinkTarget};
use sink::SinkWriter;
use source::SourceOptions;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Configuration decides the default verbosity, so it is loaded first
    let (mut config, origin) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, &config);

    info!("Packtally v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", origin);
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .packtally.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml()?;
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set the source, timezone, column layout and sink.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `RUST_LOG` takes precedence when set.
fn init_logging(args: &Args, config: &Config) {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete pipeline: read, aggregate, replace the sheet.
async fn run(args: Args, config: Config) -> Result<()> {
    let start_time = Instant::now();
    let run_date = Utc::now();

    config.validate().context("Invalid configuration")?;
    let policy = config.window_policy()?;
    let now = args.now.unwrap_or(run_date);

    // Step 1: Read the export
    let source_path = PathBuf::from(&config.source.path);
    println!("📥 Reading export: {}", source_path.display());

    let options = SourceOptions {
        show_progress: !args.quiet,
        ..SourceOptions::from(&config.source)
    };
    let source = source::open_source(&source_path, options).context("Could not read input")?;
    let table = source
        .read()
        .with_context(|| format!("Could not read input from {}", source.describe()))?;

    if table.is_empty() {
        warn!("{} holds no data rows", source.describe());
    }

    let aggregator = TimeWindowAggregator::new(policy, config.layout());
    source::ensure_width(&table, aggregator.layout().max_column())
        .context("Input does not match the configured column layout")?;

    println!(
        "   {} rows from {} file(s)",
        table.len(),
        table.files.len()
    );

    // Step 2: Filter to the window and aggregate
    let aggregation = aggregator.aggregate(&table, now);
    let output = OutputTable::from_aggregation(&aggregation, aggregator.layout(), table.header.as_deref());

    println!(
        "\n🧮 Window: {} ({}h)",
        aggregation.window,
        aggregation.window.duration().num_hours()
    );
    println!(
        "   {} of {} rows inside the window, {} distinct keys",
        aggregation.stats.retained_rows, aggregation.stats.input_rows, aggregation.stats.groups
    );
    if aggregation.stats.unparseable_timestamps > 0 {
        warn!(
            "{} rows had no parseable timestamp in column {}",
            aggregation.stats.unparseable_timestamps,
            aggregator.layout().timestamp_column
        );
    }

    // Step 3: Replace the target sheet
    let target = config.target();
    let sink = sink::build_sink(&config.sink)?;

    let outcome = deliver(&aggregation, &output, sink.as_ref(), &target, args.dry_run).await?;

    // Step 4: Keep the processed archive
    if !args.dry_run && !config.source.stash_dir.is_empty() {
        if source_path.is_file() && !source::is_csv_name(&source_path.to_string_lossy()) {
            let hour = aggregator.policy().localize(now).hour();
            let stashed = source::stash_archive(
                &source_path,
                Path::new(&config.source.stash_dir),
                &config.source.stash_prefix,
                hour,
            )
            .context("Could not stash the processed archive")?;
            println!("\n🗄️  Archive stashed as {}", stashed.display());
        } else {
            debug!("Source is not an archive, nothing to stash");
        }
    }

    // Step 5: Write the run report
    let duration = start_time.elapsed().as_secs_f64();
    if let Some(ref report_path) = args.report {
        let metadata = RunMetadata {
            source: source.describe(),
            run_date,
            now: aggregator.policy().localize(now).to_rfc3339(),
            timezone: config.window.timezone.clone(),
            window_start: aggregation.window.start.to_rfc3339(),
            window_end: aggregation.window.end.to_rfc3339(),
            duration_seconds: duration,
        };
        let run_report = report::build_report(
            metadata,
            &aggregation,
            &output,
            outcome.clone(),
            config.report.preview_rows,
        );

        let content = match config.report.format {
            ReportFormat::Json => report::generate_json_report(&run_report)?,
            ReportFormat::Markdown => report::generate_markdown_report(&run_report),
        };
        std::fs::write(report_path, &content)
            .with_context(|| format!("Failed to write report to {}", report_path.display()))?;
        info!("Report saved to {}", report_path.display());
    }

    // Print summary
    println!("\n📊 Summary:");
    println!("   Keys: {}", aggregation.stats.groups);
    println!("   Rows counted: {}", aggregation.stats.retained_rows);
    println!("   Duration: {:.1}s", duration);
    if outcome.written {
        println!("\n✅ Done! {} replaced.", outcome.target);
    } else {
        println!("\n✅ Done! Sheet not written ({}).", outcome.skipped_reason.as_deref().unwrap_or("skipped"));
    }

    Ok(())
}

/// Hand the output table to the sink.
///
/// The sink is not contacted when no row fell inside the window or on a
/// dry run. Sink failures are returned, never reported as skipped.
async fn deliver(
    aggregation: &Aggregation,
    output: &OutputTable,
    sink: &dyn SinkWriter,
    target: &SinkTarget,
    dry_run: bool,
) -> Result<SinkOutcome> {
    if aggregation.is_empty() {
        println!("\n💤 Nothing to do: no rows fell inside the window. {} left untouched.", target);
        return Ok(skipped(target, sink.describe(), "no rows in window"));
    }

    if dry_run {
        println!("\n🔍 Dry run: {} would be replaced with:\n", target);
        print_table(output);
        return Ok(skipped(target, sink.describe(), "dry run"));
    }

    println!("\n📤 Replacing {} ({})...", target, sink.describe());
    sink.replace(target, output)
        .await
        .with_context(|| format!("Could not write to {}", sink.describe()))?;

    Ok(SinkOutcome {
        target: target.clone(),
        sink: sink.describe(),
        written: true,
        skipped_reason: None,
    })
}

fn skipped(target: &SinkTarget, sink: String, reason: &str) -> SinkOutcome {
    SinkOutcome {
        target: target.clone(),
        sink,
        written: false,
        skipped_reason: Some(reason.to_string()),
    }
}

/// Print the output table tab-separated.
fn print_table(table: &OutputTable) {
    println!("   {}", table.header.join("\t"));
    for row in &table.rows {
        println!("   {}", row.join("\t"));
    }
}

/// Load configuration from file or use defaults.
///
/// Returns the configuration and where it came from.
fn load_config(args: &Args) -> Result<(Config, String)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, config_path.display().to_string()));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, CONFIG_FILE.to_string())),
        Ok(None) => Ok((Config::default(), "built-in defaults".to_string())),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::models::{AggregatedRecord, AggregationStats};
    use crate::window::WindowPolicy;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono_tz::America::Sao_Paulo;
    use std::sync::Mutex;

    /// Sink that records every replace call.
    struct RecordingSink {
        calls: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl RecordingSink {
        fn new(fail: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail,
            }
        }

        fn calls(&self) -> Vec<usize> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SinkWriter for RecordingSink {
        fn describe(&self) -> String {
            "recording sink".to_string()
        }

        async fn replace(&self, _target: &SinkTarget, table: &OutputTable) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push(table.len());
            if self.fail {
                return Err(SinkError::Rejected {
                    status: 500,
                    body: "sheet locked".to_string(),
                });
            }
            Ok(())
        }
    }

    fn target() -> SinkTarget {
        SinkTarget {
            spreadsheet: "Base Sacas".to_string(),
            sheet: "Base".to_string(),
        }
    }

    fn aggregation(keys: &[&str]) -> Aggregation {
        let policy = WindowPolicy::new(Sao_Paulo, 6);
        let window = policy.window_at(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap());
        let records: Vec<AggregatedRecord> = keys
            .iter()
            .map(|key| AggregatedRecord {
                key: key.to_string(),
                carried: Vec::new(),
                count: 1,
                first_seen: window.start,
            })
            .collect();

        Aggregation {
            window,
            stats: AggregationStats {
                input_rows: records.len(),
                retained_rows: records.len(),
                groups: records.len(),
                ..AggregationStats::default()
            },
            records,
        }
    }

    fn output(aggregation: &Aggregation) -> OutputTable {
        OutputTable {
            header: vec!["Chave".to_string(), "Quantidade".to_string()],
            rows: aggregation
                .records
                .iter()
                .map(|r| vec![r.key.clone(), r.count.to_string()])
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_empty_window_leaves_sink_untouched() {
        let sink = RecordingSink::new(false);
        let empty = aggregation(&[]);

        let outcome = deliver(&empty, &output(&empty), &sink, &target(), false)
            .await
            .unwrap();

        assert!(!outcome.written);
        assert_eq!(outcome.skipped_reason.as_deref(), Some("no rows in window"));
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_leaves_sink_untouched() {
        let sink = RecordingSink::new(false);
        let agg = aggregation(&["A", "B"]);

        let outcome = deliver(&agg, &output(&agg), &sink, &target(), true)
            .await
            .unwrap();

        assert!(!outcome.written);
        assert_eq!(outcome.skipped_reason.as_deref(), Some("dry run"));
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rows_replace_the_sheet() {
        let sink = RecordingSink::new(false);
        let agg = aggregation(&["A", "B"]);

        let outcome = deliver(&agg, &output(&agg), &sink, &target(), false)
            .await
            .unwrap();

        assert!(outcome.written);
        assert!(outcome.skipped_reason.is_none());
        assert_eq!(outcome.target, target());
        assert_eq!(sink.calls(), vec![2]);
    }

    #[tokio::test]
    async fn test_sink_failure_is_an_error() {
        let sink = RecordingSink::new(true);
        let agg = aggregation(&["A"]);

        let err = deliver(&agg, &output(&agg), &sink, &target(), false)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SinkError>(),
            Some(SinkError::Rejected { status: 500, .. })
        ));
        assert_eq!(sink.calls(), vec![1]);
    }
}
