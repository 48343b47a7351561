//! Raw table sources.
//!
//! A source turns a portal export into one [`RawTable`]: either a zip
//! archive of CSV files or CSV files already on disk. Every failure is a
//! [`SourceError`]; a source never reports "no data" by returning an empty
//! table when it could not read its input.

pub mod archive;
pub mod files;

pub use archive::{stash_archive, ArchiveSource};
pub use files::CsvFilesSource;

use crate::error::SourceError;
use crate::models::{RawRecord, RawTable};
use csv::ReaderBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::Path;
use tracing::debug;

const UTF8_BOM: char = '\u{feff}';

/// Supplies the raw table to the aggregator.
pub trait SourceReader {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Read every CSV the source holds into one table.
    fn read(&self) -> Result<RawTable, SourceError>;
}

/// Options shared by all sources.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Treat the first row of each file as a header.
    pub has_headers: bool,
    /// Show a spinner while reading.
    pub show_progress: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            has_headers: true,
            show_progress: true,
        }
    }
}

impl From<&crate::config::SourceConfig> for SourceOptions {
    fn from(config: &crate::config::SourceConfig) -> Self {
        Self {
            has_headers: config.has_headers,
            show_progress: true,
        }
    }
}

/// Pick a reader for `path`: directories and `.csv` files are read directly,
/// anything else is opened as a zip archive.
pub fn open_source(path: &Path, options: SourceOptions) -> Result<Box<dyn SourceReader>, SourceError> {
    if !path.exists() {
        return Err(SourceError::NotFound(path.to_path_buf()));
    }

    if path.is_dir() || is_csv_name(&path.to_string_lossy()) {
        Ok(Box::new(CsvFilesSource::new(path.to_path_buf(), options)))
    } else {
        Ok(Box::new(ArchiveSource::new(path.to_path_buf(), options)))
    }
}

/// Whether a file name has a `.csv` extension, in any case.
pub fn is_csv_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".csv")
}

/// Check that the table is wide enough for `required` (a column index).
///
/// With a header only the header is checked. Without one, the first row of
/// every file is. Other short rows are left to the aggregator, which drops
/// them.
pub fn ensure_width(table: &RawTable, required: usize) -> Result<(), SourceError> {
    if let Some(ref header) = table.header {
        if header.len() <= required {
            return Err(SourceError::LayoutMismatch {
                file: table.files.first().cloned().unwrap_or_default(),
                columns: header.len(),
                required,
            });
        }
        return Ok(());
    }

    let mut checked = vec![false; table.files.len()];
    for record in &table.records {
        match checked.get_mut(record.file) {
            Some(seen) if !*seen => *seen = true,
            _ => continue,
        }
        if record.fields.len() <= required {
            return Err(SourceError::LayoutMismatch {
                file: table.file_of(record).to_string(),
                columns: record.fields.len(),
                required,
            });
        }
    }
    Ok(())
}

/// Append the rows of one CSV stream to `table`.
pub(crate) fn read_csv_into<R: Read>(
    reader: R,
    name: &str,
    has_headers: bool,
    table: &mut RawTable,
) -> Result<usize, SourceError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .from_reader(reader);

    let csv_error = |source| SourceError::Csv {
        file: name.to_string(),
        source,
    };

    if has_headers && table.header.is_none() {
        let header: Vec<String> = rdr
            .headers()
            .map_err(csv_error)?
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                if i == 0 {
                    cell.trim_start_matches(UTF8_BOM).to_string()
                } else {
                    cell.to_string()
                }
            })
            .collect();
        table.header = Some(header);
    }

    let file = table.files.len();
    table.files.push(name.to_string());

    let mut rows = 0;
    for record in rdr.records() {
        let record = record.map_err(csv_error)?;
        table.records.push(RawRecord::new(record.iter(), file));
        rows += 1;
    }

    debug!("Read {} rows from {}", rows, name);
    Ok(rows)
}

/// Spinner used while reading files, hidden when progress is off.
pub(crate) fn progress_spinner(show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb
}
