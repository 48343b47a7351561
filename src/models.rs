//! Data models for the tally pipeline.
//!
//! This module contains the tables that flow between the source reader,
//! the aggregator and the sinks.

use crate::window::{CivilTime, Window};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One input row, positionally indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Cell values in column order.
    pub fields: Vec<String>,
    /// Index into [`RawTable::files`] of the file this row came from.
    pub file: usize,
}

impl RawRecord {
    /// Creates a record from any iterator of cell values.
    pub fn new<I, S>(fields: I, file: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            file,
        }
    }

    /// Returns the cell at `index`, if the row is wide enough.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }
}

/// All rows read from a source, concatenated in read order.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    /// Header row of the first file read, when the source has headers.
    pub header: Option<Vec<String>>,
    /// Names of the files the rows were read from.
    pub files: Vec<String>,
    /// The rows themselves.
    pub records: Vec<RawRecord>,
}

impl RawTable {
    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Name of the file a record was read from.
    pub fn file_of(&self, record: &RawRecord) -> &str {
        self.files.get(record.file).map(String::as_str).unwrap_or("<unknown>")
    }
}

/// Positions of the columns the aggregator works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Column holding the row timestamp.
    pub timestamp_column: usize,
    /// Column used to group rows.
    pub key_column: usize,
    /// Columns copied verbatim from the representative row.
    pub carry_columns: Vec<usize>,
    /// Output position of the count column (clamped to the row width).
    pub count_position: usize,
    /// Output header of the count column.
    pub count_label: String,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            timestamp_column: 17,
            key_column: 0,
            carry_columns: vec![9, 15, 17, 2],
            count_position: 4,
            count_label: "Quantidade".to_string(),
        }
    }
}

impl ColumnLayout {
    /// Highest column index the layout reads.
    pub fn max_column(&self) -> usize {
        self.carry_columns
            .iter()
            .copied()
            .chain([self.timestamp_column, self.key_column])
            .max()
            .unwrap_or(0)
    }
}

/// One output row per distinct key.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRecord {
    /// Group key.
    pub key: String,
    /// Carry-through values, one per layout carry column.
    pub carried: Vec<String>,
    /// Number of retained rows sharing the key.
    pub count: usize,
    /// Timestamp of the representative row.
    pub first_seen: CivilTime,
}

/// Counters describing what happened to each input row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationStats {
    /// Rows handed to the aggregator.
    pub input_rows: usize,
    /// Rows dropped because the timestamp was missing or unparseable.
    pub unparseable_timestamps: usize,
    /// Rows dropped because they fell outside the window.
    pub outside_window: usize,
    /// Rows dropped because the key cell was missing or blank.
    pub missing_key: usize,
    /// Rows that were grouped.
    pub retained_rows: usize,
    /// Distinct keys in the output.
    pub groups: usize,
}

/// Result of one aggregation pass.
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// Window the rows were filtered against.
    pub window: Window,
    /// Output rows in group-encounter order.
    pub records: Vec<AggregatedRecord>,
    /// Row accounting.
    pub stats: AggregationStats,
}

impl Aggregation {
    /// Whether no row survived filtering.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Header plus rows, the shape handed to sinks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl OutputTable {
    /// Lays out an aggregation as strings.
    ///
    /// Labels come from `source_header` when it is wide enough, otherwise
    /// `column_<index>`. The count column is inserted at
    /// `layout.count_position`, clamped to the row width.
    pub fn from_aggregation(
        aggregation: &Aggregation,
        layout: &ColumnLayout,
        source_header: Option<&[String]>,
    ) -> Self {
        let label = |index: usize| -> String {
            source_header
                .and_then(|h| h.get(index))
                .filter(|name| !name.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| format!("column_{}", index))
        };

        let mut header: Vec<String> = std::iter::once(layout.key_column)
            .chain(layout.carry_columns.iter().copied())
            .map(label)
            .collect();
        let position = layout.count_position.min(header.len());
        header.insert(position, layout.count_label.clone());

        let rows = aggregation
            .records
            .iter()
            .map(|record| {
                let mut row = Vec::with_capacity(record.carried.len() + 2);
                row.push(record.key.clone());
                row.extend(record.carried.iter().cloned());
                row.insert(position, record.count.to_string());
                row
            })
            .collect();

        Self { header, rows }
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Spreadsheet and sheet a sink writes into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkTarget {
    pub spreadsheet: String,
    pub sheet: String,
}

impl fmt::Display for SinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.spreadsheet, self.sheet)
    }
}

/// Metadata about a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Description of the source that was read.
    pub source: String,
    /// Wall-clock time the run started.
    pub run_date: DateTime<Utc>,
    /// The instant the window was computed from, in civil time.
    pub now: String,
    /// Civil timezone name.
    pub timezone: String,
    /// Window start, RFC 3339.
    pub window_start: String,
    /// Window end (exclusive), RFC 3339.
    pub window_end: String,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// What happened at the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkOutcome {
    /// Sheet that was (or would have been) replaced.
    pub target: SinkTarget,
    /// Description of the sink.
    pub sink: String,
    /// Whether the sheet was replaced.
    pub written: bool,
    /// Why the write was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
}

/// The complete run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub stats: AggregationStats,
    pub sink: SinkOutcome,
    /// Keys with the highest counts.
    pub top_keys: Vec<(String, usize)>,
    /// First rows of the output table.
    pub preview: OutputTable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowPolicy;
    use chrono::TimeZone;

    fn sample_aggregation() -> Aggregation {
        let policy = WindowPolicy::new(chrono_tz::America::Sao_Paulo, 6);
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let window = policy.window_at(now);
        let first_seen = window.start;

        Aggregation {
            window,
            records: vec![
                AggregatedRecord {
                    key: "BR1".to_string(),
                    carried: vec!["Hub A".to_string(), "2024-03-10 07:00:00".to_string()],
                    count: 3,
                    first_seen,
                },
                AggregatedRecord {
                    key: "BR2".to_string(),
                    carried: vec!["Hub B".to_string(), "2024-03-10 08:00:00".to_string()],
                    count: 1,
                    first_seen,
                },
            ],
            stats: AggregationStats::default(),
        }
    }

    #[test]
    fn test_layout_max_column() {
        let layout = ColumnLayout::default();
        assert_eq!(layout.max_column(), 17);

        let narrow = ColumnLayout {
            timestamp_column: 1,
            key_column: 0,
            carry_columns: vec![],
            count_position: 1,
            count_label: "n".to_string(),
        };
        assert_eq!(narrow.max_column(), 1);
    }

    #[test]
    fn test_output_table_uses_source_labels() {
        let layout = ColumnLayout {
            timestamp_column: 2,
            key_column: 0,
            carry_columns: vec![1, 2],
            count_position: 2,
            count_label: "Quantidade".to_string(),
        };
        let header: Vec<String> = ["Order", "Hub", "Packed at"]
            .into_iter()
            .map(String::from)
            .collect();

        let table = OutputTable::from_aggregation(&sample_aggregation(), &layout, Some(&header));

        assert_eq!(table.header, vec!["Order", "Hub", "Quantidade", "Packed at"]);
        assert_eq!(table.rows[0], vec!["BR1", "Hub A", "3", "2024-03-10 07:00:00"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_output_table_without_header_and_clamped_count() {
        let layout = ColumnLayout {
            timestamp_column: 2,
            key_column: 0,
            carry_columns: vec![1, 2],
            count_position: 99,
            count_label: "count".to_string(),
        };

        let table = OutputTable::from_aggregation(&sample_aggregation(), &layout, None);

        assert_eq!(table.header, vec!["column_0", "column_1", "column_2", "count"]);
        assert_eq!(table.rows[1], vec!["BR2", "Hub B", "2024-03-10 08:00:00", "1"]);
    }

    #[test]
    fn test_raw_record_get() {
        let record = RawRecord::new(["a", "b"], 0);
        assert_eq!(record.get(1), Some("b"));
        assert_eq!(record.get(2), None);
    }

    #[test]
    fn test_sink_target_display() {
        let target = SinkTarget {
            spreadsheet: "Base Sacas".to_string(),
            sheet: "Base".to_string(),
        };
        assert_eq!(target.to_string(), "Base Sacas / Base");
    }
}
