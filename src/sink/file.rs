//! Local file sink.
//!
//! Each spreadsheet is a directory and each sheet a file inside it. The
//! new content goes to a temporary file next to the target and is renamed
//! over it, so readers never see a half-written sheet.

use super::SinkWriter;
use crate::error::SinkError;
use crate::models::{OutputTable, SinkTarget};
use async_trait::async_trait;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Encoding of a sheet file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
}

impl FileFormat {
    fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Json => "json",
        }
    }
}

/// Writes sheets as files under a root directory.
pub struct FileSink {
    root: PathBuf,
    format: FileFormat,
}

impl FileSink {
    pub fn new(root: PathBuf, format: FileFormat) -> Self {
        Self { root, format }
    }

    /// `<root>/<spreadsheet>/<sheet>.<ext>`
    pub fn target_path(&self, target: &SinkTarget) -> PathBuf {
        self.root.join(sanitize(&target.spreadsheet)).join(format!(
            "{}.{}",
            sanitize(&target.sheet),
            self.format.extension()
        ))
    }

    fn encode(&self, table: &OutputTable) -> Result<Vec<u8>, SinkError> {
        match self.format {
            FileFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(Vec::new());
                wtr.write_record(&table.header)?;
                for row in &table.rows {
                    wtr.write_record(row)?;
                }
                wtr.into_inner().map_err(|e| SinkError::Io {
                    path: self.root.clone(),
                    source: e.into_error(),
                })
            }
            FileFormat::Json => Ok(serde_json::to_vec_pretty(table)?),
        }
    }
}

#[async_trait]
impl SinkWriter for FileSink {
    fn describe(&self) -> String {
        let kind = match self.format {
            FileFormat::Csv => "CSV",
            FileFormat::Json => "JSON",
        };
        format!("{} files under {}", kind, self.root.display())
    }

    async fn replace(&self, target: &SinkTarget, table: &OutputTable) -> Result<(), SinkError> {
        let path = self.target_path(target);
        let bytes = self.encode(table)?;
        write_atomically(&path, &bytes)?;

        info!("Replaced {} with {} rows", path.display(), table.len());
        Ok(())
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), SinkError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let io_error = |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(dir).map_err(io_error)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_error)?;
    tmp.write_all(bytes).map_err(io_error)?;
    tmp.flush().map_err(io_error)?;

    debug!("Renaming {} over {}", tmp.path().display(), path.display());
    tmp.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}

/// Replace characters that are not safe in a file name.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}
