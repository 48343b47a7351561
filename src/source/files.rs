//! CSV files already on disk.
//!
//! Accepts a single `.csv` file or a directory, typically the folder an
//! export archive was extracted into.

use super::{is_csv_name, progress_spinner, read_csv_into, SourceOptions, SourceReader};
use crate::error::SourceError;
use crate::models::RawTable;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Reads every `.csv` file under a directory, sorted by path.
pub struct CsvFilesSource {
    root: PathBuf,
    options: SourceOptions,
}

impl CsvFilesSource {
    pub fn new(root: PathBuf, options: SourceOptions) -> Self {
        Self { root, options }
    }

    /// Collect the CSV files to read, in path order.
    pub fn scan(&self) -> Result<Vec<PathBuf>, SourceError> {
        if !self.root.exists() {
            return Err(SourceError::NotFound(self.root.clone()));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for item in walker {
            if let Some(path) = csv_path(&self.root, item)? {
                files.push(path);
            }
        }

        Ok(files)
    }

    fn display_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .ok()
            .filter(|rel| !rel.as_os_str().is_empty())
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}

impl SourceReader for CsvFilesSource {
    fn describe(&self) -> String {
        format!("CSV files in {}", self.root.display())
    }

    fn read(&self) -> Result<RawTable, SourceError> {
        let files = self.scan()?;
        if files.is_empty() {
            return Err(SourceError::NoCsvFiles(self.root.clone()));
        }

        debug!("Found {} CSV file(s) under {}", files.len(), self.root.display());

        let mut table = RawTable::default();
        let pb = progress_spinner(self.options.show_progress);

        for path in &files {
            let name = self.display_name(path);
            pb.set_message(format!("Reading {}", name));

            let file = File::open(path).map_err(|source| SourceError::Io {
                path: path.clone(),
                source,
            })?;
            read_csv_into(file, &name, self.options.has_headers, &mut table)?;
            pb.tick();
        }

        pb.finish_and_clear();

        info!(
            "Read {} rows from {} CSV file(s) in {}",
            table.len(),
            table.files.len(),
            self.root.display()
        );
        Ok(table)
    }
}

/// The CSV file behind one walker item, if any.
///
/// An unreadable entry fails the whole scan.
fn csv_path(root: &Path, item: walkdir::Result<DirEntry>) -> Result<Option<PathBuf>, SourceError> {
    let entry = item.map_err(|e| {
        let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
        let source = e
            .into_io_error()
            .unwrap_or_else(|| io::Error::other("filesystem loop"));
        SourceError::Io { path, source }
    })?;

    if entry.file_type().is_file() && is_csv_name(&entry.file_name().to_string_lossy()) {
        Ok(Some(entry.into_path()))
    } else {
        Ok(None)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn quiet() -> SourceOptions {
        SourceOptions {
            has_headers: true,
            show_progress: false,
        }
    }

    #[test]
    fn test_reads_directory_in_path_order() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::create_dir(dir.path().join(".cache")).unwrap();

        fs::write(dir.path().join("b.csv"), "id,ts\nB,1\n").unwrap();
        fs::write(dir.path().join("a.csv"), "id,ts\nA,1\n").unwrap();
        fs::write(dir.path().join("nested/c.csv"), "id,ts\nC,1\n").unwrap();
        fs::write(dir.path().join(".cache/d.csv"), "id,ts\nD,1\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let source = CsvFilesSource::new(dir.path().to_path_buf(), quiet());
        let table = source.read().unwrap();

        let keys: Vec<&str> = table.records.iter().filter_map(|r| r.get(0)).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
        assert_eq!(table.files[0], "a.csv");
    }

    #[test]
    fn test_single_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.csv");
        fs::write(&path, "id,ts\nA,1\nB,2\n").unwrap();

        let table = CsvFilesSource::new(path, quiet()).read().unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.files, vec![dir.path().join("export.csv").to_string_lossy().to_string()]);
    }

    #[test]
    fn test_unreadable_entry_fails_the_scan() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone");
        let item = WalkDir::new(&missing).into_iter().next().unwrap();

        let result = csv_path(dir.path(), item);

        match result {
            Err(SourceError::Io { path, source }) => {
                assert_eq!(path, missing);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected an I/O error, got {:?}", other),
        }
    }

    #[test]
    fn test_csv_path_filters_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.csv"), "id\nA\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let mut found = Vec::new();
        for item in WalkDir::new(dir.path()).sort_by_file_name() {
            if let Some(path) = csv_path(dir.path(), item).unwrap() {
                found.push(path);
            }
        }

        assert_eq!(found, vec![dir.path().join("a.csv")]);
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "no tables").unwrap();

        let result = CsvFilesSource::new(dir.path().to_path_buf(), quiet()).read();

        assert!(matches!(result, Err(SourceError::NoCsvFiles(_))));
    }
}
