//! Zip archive source.
//!
//! The portal export is a zip holding one or more CSV files sharing a
//! column layout. Entries are read in archive order without extracting
//! anything to disk.

use super::{is_csv_name, progress_spinner, read_csv_into, SourceOptions, SourceReader};
use crate::error::SourceError;
use crate::models::RawTable;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

/// Reads every `.csv` entry of a zip archive.
pub struct ArchiveSource {
    path: PathBuf,
    options: SourceOptions,
}

impl ArchiveSource {
    pub fn new(path: PathBuf, options: SourceOptions) -> Self {
        Self { path, options }
    }
}

impl SourceReader for ArchiveSource {
    fn describe(&self) -> String {
        format!("zip archive {}", self.path.display())
    }

    fn read(&self) -> Result<RawTable, SourceError> {
        let file = File::open(&self.path).map_err(|source| SourceError::Io {
            path: self.path.clone(),
            source,
        })?;
        let archive_error = |source| SourceError::Archive {
            path: self.path.clone(),
            source,
        };

        let mut archive = ZipArchive::new(file).map_err(archive_error)?;
        let mut table = RawTable::default();
        let pb = progress_spinner(self.options.show_progress);

        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(archive_error)?;
            if !entry.is_file() || !is_csv_name(entry.name()) {
                debug!("Skipping archive entry {}", entry.name());
                continue;
            }

            let name = entry.name().to_string();
            pb.set_message(format!("Reading {}", name));
            read_csv_into(entry, &name, self.options.has_headers, &mut table)?;
            pb.tick();
        }

        pb.finish_and_clear();

        if table.files.is_empty() {
            return Err(SourceError::NoCsvFiles(self.path.clone()));
        }

        info!(
            "Read {} rows from {} CSV file(s) in {}",
            table.len(),
            table.files.len(),
            self.path.display()
        );
        Ok(table)
    }
}

/// Move a processed archive into `stash_dir` as `<prefix><HH>.zip`.
///
/// `hour` is the civil hour of the run. A stashed archive from the same hour
/// is replaced. Returns the new path.
pub fn stash_archive(
    archive: &Path,
    stash_dir: &Path,
    prefix: &str,
    hour: u32,
) -> Result<PathBuf, SourceError> {
    fs::create_dir_all(stash_dir).map_err(io_error(stash_dir))?;

    let target = stash_dir.join(format!("{}{:02}.zip", prefix, hour));
    if target.exists() {
        fs::remove_file(&target).map_err(io_error(&target))?;
    }

    // rename fails across filesystems; fall back to copy + delete
    if fs::rename(archive, &target).is_err() {
        fs::copy(archive, &target).map_err(io_error(archive))?;
        fs::remove_file(archive).map_err(io_error(archive))?;
    }

    info!("Stashed {} as {}", archive.display(), target.display());
    Ok(target)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SourceError {
    let path = path.to_path_buf();
    move |source| SourceError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::{NamedTempFile, TempDir};
    use zip::write::FileOptions;
    use zip::CompressionMethod;

    fn quiet() -> SourceOptions {
        SourceOptions {
            has_headers: true,
            show_progress: false,
        }
    }

    fn build_zip(entries: &[(&str, &str)]) -> NamedTempFile {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options: FileOptions<'_, ()> =
                FileOptions::default().compression_method(CompressionMethod::Stored);
            for (name, content) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }

        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&buf).unwrap();
        tmp
    }

    #[test]
    fn test_reads_all_csv_entries() {
        let tmp = build_zip(&[
            ("part-1.csv", "id,ts\nA,2024-03-10 07:00:00\nB,2024-03-10 08:00:00\n"),
            ("readme.txt", "not a table"),
            ("part-2.CSV", "id,ts\nA,2024-03-10 09:00:00\n"),
        ]);

        let table = ArchiveSource::new(tmp.path().to_path_buf(), quiet())
            .read()
            .unwrap();

        assert_eq!(table.files, vec!["part-1.csv", "part-2.CSV"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.header, Some(vec!["id".to_string(), "ts".to_string()]));
    }

    #[test]
    fn test_archive_without_csv_is_an_error() {
        let tmp = build_zip(&[("notes.txt", "nothing here")]);

        let result = ArchiveSource::new(tmp.path().to_path_buf(), quiet()).read();

        assert!(matches!(result, Err(SourceError::NoCsvFiles(_))));
    }

    #[test]
    fn test_not_a_zip_is_an_error() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"plain text, not an archive").unwrap();

        let result = ArchiveSource::new(tmp.path().to_path_buf(), quiet()).read();

        assert!(matches!(result, Err(SourceError::Archive { .. })));
    }

    #[test]
    fn test_stash_replaces_same_hour() {
        let dir = TempDir::new().unwrap();
        let stash = dir.path().join("stash");

        let first = dir.path().join("download-1.zip");
        fs::write(&first, b"first").unwrap();
        let stashed = stash_archive(&first, &stash, "TO-Packed", 7).unwrap();
        assert_eq!(stashed, stash.join("TO-Packed07.zip"));
        assert!(!first.exists());

        let second = dir.path().join("download-2.zip");
        fs::write(&second, b"second").unwrap();
        stash_archive(&second, &stash, "TO-Packed", 7).unwrap();

        assert_eq!(fs::read(stash.join("TO-Packed07.zip")).unwrap(), b"second");
    }
}
