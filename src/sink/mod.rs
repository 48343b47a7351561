//! Sheet sinks.
//!
//! A sink replaces the whole content of one sheet with a new table. There
//! is no merge or append: after a successful write the sheet holds exactly
//! the header and rows it was given.

pub mod file;
pub mod http;

pub use file::{FileFormat, FileSink};
pub use http::HttpSink;

use crate::config::{SinkConfig, SinkKind};
use crate::error::SinkError;
use crate::models::{OutputTable, SinkTarget};
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Accepts the aggregated table for a target sheet.
#[async_trait]
pub trait SinkWriter: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Clear `target` and write `table` into it.
    async fn replace(&self, target: &SinkTarget, table: &OutputTable) -> Result<(), SinkError>;
}

/// Build the sink selected by configuration.
pub fn build_sink(config: &SinkConfig) -> Result<Box<dyn SinkWriter>> {
    let sink: Box<dyn SinkWriter> = match config.kind {
        SinkKind::Csv => Box::new(FileSink::new(PathBuf::from(&config.dir), FileFormat::Csv)),
        SinkKind::Json => Box::new(FileSink::new(PathBuf::from(&config.dir), FileFormat::Json)),
        SinkKind::Http => Box::new(
            HttpSink::new(&config.url, config.timeout_seconds, config.retries)?
                .with_backoff(Duration::from_secs(config.backoff_seconds)),
        ),
    };
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_file_sinks() {
        let mut config = SinkConfig {
            kind: SinkKind::Csv,
            dir: "out".to_string(),
            ..SinkConfig::default()
        };

        assert!(build_sink(&config).unwrap().describe().contains("CSV"));

        config.kind = SinkKind::Json;
        assert!(build_sink(&config).unwrap().describe().contains("JSON"));
    }

    #[test]
    fn test_build_http_sink() {
        let config = SinkConfig {
            kind: SinkKind::Http,
            url: "http://localhost:8080/sheets".to_string(),
            ..SinkConfig::default()
        };
        let sink = build_sink(&config).unwrap();
        assert!(sink.describe().contains("http://localhost:8080/sheets"));
    }
}
