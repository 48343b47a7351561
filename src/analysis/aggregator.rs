//! Time-window aggregation.
//!
//! Rows are filtered to the operational day containing "now", then collapsed
//! to one row per key carrying the values of the group's earliest row and
//! the number of rows that shared the key.

use crate::models::{
    AggregatedRecord, Aggregation, AggregationStats, ColumnLayout, RawRecord, RawTable,
};
use crate::window::{CivilTime, WindowPolicy};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Filters rows to the current window and counts them per key.
#[derive(Debug, Clone)]
pub struct TimeWindowAggregator {
    policy: WindowPolicy,
    layout: ColumnLayout,
}

struct Group<'a> {
    key: &'a str,
    representative: &'a RawRecord,
    first_seen: CivilTime,
    count: usize,
}

impl TimeWindowAggregator {
    /// Create an aggregator for a timestamp policy and column layout.
    pub fn new(policy: WindowPolicy, layout: ColumnLayout) -> Self {
        Self { policy, layout }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    /// Aggregate the rows of `table` against the window containing `now`.
    ///
    /// Rows with a missing or unparseable timestamp, rows outside the window
    /// and rows with a blank key are dropped and counted. The representative
    /// row of a group is the one with the earliest timestamp; on equal
    /// timestamps the row read first wins.
    pub fn aggregate(&self, table: &RawTable, now: DateTime<Utc>) -> Aggregation {
        let window = self.policy.window_at(now);
        let mut stats = AggregationStats {
            input_rows: table.len(),
            ..AggregationStats::default()
        };

        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<Group<'_>> = Vec::new();

        for record in &table.records {
            let cell = record.get(self.layout.timestamp_column);
            let Some(timestamp) = cell.and_then(|c| self.policy.parse_timestamp(c)) else {
                trace!("{}: unparseable timestamp {:?}", table.file_of(record), cell);
                stats.unparseable_timestamps += 1;
                continue;
            };

            if !window.contains(&timestamp) {
                stats.outside_window += 1;
                continue;
            }

            let key = match record.get(self.layout.key_column) {
                Some(key) if !key.trim().is_empty() => key,
                _ => {
                    stats.missing_key += 1;
                    continue;
                }
            };

            stats.retained_rows += 1;

            match index.get(key) {
                Some(&i) => {
                    let group = &mut groups[i];
                    group.count += 1;
                    if timestamp < group.first_seen {
                        group.first_seen = timestamp;
                        group.representative = record;
                    }
                }
                None => {
                    index.insert(key, groups.len());
                    groups.push(Group {
                        key,
                        representative: record,
                        first_seen: timestamp,
                        count: 1,
                    });
                }
            }
        }

        let records: Vec<AggregatedRecord> = groups
            .into_iter()
            .map(|group| AggregatedRecord {
                key: group.key.to_string(),
                carried: self
                    .layout
                    .carry_columns
                    .iter()
                    .map(|&column| group.representative.get(column).unwrap_or("").to_string())
                    .collect(),
                count: group.count,
                first_seen: group.first_seen,
            })
            .collect();

        stats.groups = records.len();

        debug!(
            "Window {}: {} rows in, {} retained, {} groups ({} unparseable, {} outside, {} without key)",
            window,
            stats.input_rows,
            stats.retained_rows,
            stats.groups,
            stats.unparseable_timestamps,
            stats.outside_window,
            stats.missing_key
        );

        Aggregation {
            window,
            records,
            stats,
        }
    }
}

/// Keys with the highest counts, ties in encounter order.
pub fn top_keys(aggregation: &Aggregation, n: usize) -> Vec<&AggregatedRecord> {
    let mut records: Vec<&AggregatedRecord> = aggregation.records.iter().collect();
    records.sort_by_key(|r| std::cmp::Reverse(r.count));
    records.truncate(n);
    records
}
