//! Run report generation.
//!
//! This module renders a [`RunReport`] as Markdown or JSON so a run can be
//! audited after the fact: which window was used, what happened to every
//! input row, and whether the sheet was replaced.

use crate::analysis::top_keys;
use crate::models::{
    Aggregation, AggregationStats, OutputTable, RunMetadata, RunReport, SinkOutcome,
};
use anyhow::Result;

/// Build a report from an aggregation and its output table.
pub fn build_report(
    metadata: RunMetadata,
    aggregation: &Aggregation,
    table: &OutputTable,
    sink: SinkOutcome,
    preview_rows: usize,
) -> RunReport {
    let top = top_keys(aggregation, 5)
        .into_iter()
        .map(|record| (record.key.clone(), record.count))
        .collect();

    let preview = OutputTable {
        header: table.header.clone(),
        rows: table.rows.iter().take(preview_rows).cloned().collect(),
    };

    RunReport {
        metadata,
        stats: aggregation.stats,
        sink,
        top_keys: top,
        preview,
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &RunReport) -> String {
    let mut output = String::new();

    output.push_str("# Packtally Run Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_stats_section(&report.stats));
    output.push_str(&generate_sink_section(&report.sink));
    output.push_str(&generate_top_keys_section(&report.top_keys));
    output.push_str(&generate_preview_section(&report.preview, report.stats.groups));

    output
}

fn generate_metadata_section(metadata: &RunMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** {}\n", metadata.source));
    section.push_str(&format!(
        "- **Run Date:** {}\n",
        metadata.run_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Now:** {}\n", metadata.now));
    section.push_str(&format!("- **Timezone:** `{}`\n", metadata.timezone));
    section.push_str(&format!(
        "- **Window:** {} to {} (end excluded)\n",
        metadata.window_start, metadata.window_end
    ));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_stats_section(stats: &AggregationStats) -> String {
    let mut section = String::new();

    section.push_str("## Rows\n\n");
    section.push_str("| Input | Unparseable | Outside Window | No Key | Retained | **Keys** |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {} | **{}** |\n\n",
        stats.input_rows,
        stats.unparseable_timestamps,
        stats.outside_window,
        stats.missing_key,
        stats.retained_rows,
        stats.groups
    ));

    section
}

fn generate_sink_section(sink: &SinkOutcome) -> String {
    let mut section = String::new();

    section.push_str("## Sink\n\n");
    section.push_str(&format!("- **Target:** {}\n", sink.target));
    section.push_str(&format!("- **Sink:** {}\n", sink.sink));
    if sink.written {
        section.push_str("- **Status:** replaced\n");
    } else {
        let reason = sink.skipped_reason.as_deref().unwrap_or("not written");
        section.push_str(&format!("- **Status:** skipped ({})\n", reason));
    }
    section.push('\n');

    section
}

fn generate_top_keys_section(top_keys: &[(String, usize)]) -> String {
    if top_keys.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Top Keys\n\n");
    section.push_str("| Key | Count |\n");
    section.push_str("|:---|:---:|\n");
    for (key, count) in top_keys {
        section.push_str(&format!("| `{}` | {} |\n", key, count));
    }
    section.push('\n');

    section
}

fn generate_preview_section(preview: &OutputTable, total: usize) -> String {
    let mut section = String::new();

    section.push_str("## Preview\n\n");

    if preview.is_empty() {
        section.push_str("No rows fell inside the window.\n");
        return section;
    }

    section.push_str(&format!("| {} |\n", preview.header.join(" | ")));
    section.push_str(&format!(
        "|{}\n",
        preview.header.iter().map(|_| ":---|").collect::<String>()
    ));
    for row in &preview.rows {
        let cells: Vec<String> = row.iter().map(|c| c.replace('|', "\\|")).collect();
        section.push_str(&format!("| {} |\n", cells.join(" | ")));
    }

    if total > preview.len() {
        section.push_str(&format!(
            "\n*Showing {} of {} rows.*\n",
            preview.len(),
            total
        ));
    }

    section
}

/// Generate a JSON report.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregatedRecord, SinkTarget};
    use crate::window::WindowPolicy;
    use chrono::{TimeZone, Utc};
    use chrono_tz::America::Sao_Paulo;

    fn create_test_aggregation() -> Aggregation {
        let policy = WindowPolicy::new(Sao_Paulo, 6);
        let window = policy.window_at(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap());
        let record = |key: &str, count| AggregatedRecord {
            key: key.to_string(),
            carried: vec!["Hub|A".to_string()],
            count,
            first_seen: window.start,
        };

        let records = vec![record("A", 1), record("B", 4), record("C", 2)];

        Aggregation {
            window,
            records,
            stats: AggregationStats {
                input_rows: 10,
                unparseable_timestamps: 1,
                outside_window: 2,
                missing_key: 0,
                retained_rows: 7,
                groups: 3,
            },
        }
    }

    fn create_test_report(written: bool, preview_rows: usize) -> RunReport {
        let aggregation = create_test_aggregation();
        let table = OutputTable {
            header: vec!["Chave".to_string(), "Hub".to_string(), "Quantidade".to_string()],
            rows: aggregation
                .records
                .iter()
                .map(|r| vec![r.key.clone(), r.carried[0].clone(), r.count.to_string()])
                .collect(),
        };
        let metadata = RunMetadata {
            source: "zip archive export.zip".to_string(),
            run_date: Utc::now(),
            now: "2024-03-10T09:00:00-03:00".to_string(),
            timezone: "America/Sao_Paulo".to_string(),
            window_start: aggregation.window.start.to_rfc3339(),
            window_end: aggregation.window.end.to_rfc3339(),
            duration_seconds: 1.5,
        };
        let sink = SinkOutcome {
            target: SinkTarget {
                spreadsheet: "Base Sacas".to_string(),
                sheet: "Base".to_string(),
            },
            sink: "CSV files under out".to_string(),
            written,
            skipped_reason: (!written).then(|| "dry run".to_string()),
        };

        build_report(metadata, &aggregation, &table, sink, preview_rows)
    }

    #[test]
    fn test_build_report_top_keys_and_preview() {
        let report = create_test_report(true, 2);

        assert_eq!(report.top_keys[0], ("B".to_string(), 4));
        assert_eq!(report.top_keys[1], ("C".to_string(), 2));
        assert_eq!(report.preview.len(), 2);
        assert_eq!(report.stats.retained_rows, 7);
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(&create_test_report(true, 2));

        assert!(markdown.contains("# Packtally Run Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("2024-03-10T06:00:00-03:00"));
        assert!(markdown.contains("**Status:** replaced"));
        assert!(markdown.contains("| Chave | Hub | Quantidade |"));
        assert!(markdown.contains("Hub\\|A"));
        assert!(markdown.contains("Showing 2 of 3 rows"));
    }

    #[test]
    fn test_markdown_for_skipped_write() {
        let markdown = generate_markdown_report(&create_test_report(false, 20));

        assert!(markdown.contains("skipped (dry run)"));
        assert!(!markdown.contains("Showing"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_report(true, 20)).unwrap();

        assert!(json.contains("\"window_start\""));
        assert!(json.contains("\"retained_rows\": 7"));
        assert!(json.contains("\"preview\""));
    }
}
