//! Collapses duplicate vendor method directories before archiving.
//!
//! Some acquisition software writes the same `*.m` method directory several
//! times beneath a parent `*.m` directory. Siblings whose files match the
//! alphabetically first sibling (same relative paths, same byte lengths) are
//! replaced by `<name>.zip` next to them. Nothing is deleted until every zip
//! has been written and verified.

use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::CaptureError;
use crate::fs_util;

pub trait ArchiveWriter {
    fn write_zip(&self, source_dir: &Path, zip_path: &Path) -> Result<(), CaptureError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiveWriter;

impl ArchiveWriter for ZipArchiveWriter {
    fn write_zip(&self, source_dir: &Path, zip_path: &Path) -> Result<(), CaptureError> {
        fs_util::zip_directory(source_dir, zip_path).map(|_| ())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompressedDirectory {
    pub directory: Utf8PathBuf,
    pub baseline: Utf8PathBuf,
    pub zip: Utf8PathBuf,
    pub files: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompressionReport {
    pub compressed: Vec<CompressedDirectory>,
}

impl CompressionReport {
    pub fn is_empty(&self) -> bool {
        self.compressed.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateMethodCompressor<W: ArchiveWriter = ZipArchiveWriter> {
    writer: W,
}

impl DuplicateMethodCompressor<ZipArchiveWriter> {
    pub fn new() -> Self {
        Self {
            writer: ZipArchiveWriter,
        }
    }
}

impl<W: ArchiveWriter> DuplicateMethodCompressor<W> {
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    pub fn compress_duplicates(
        &self,
        dataset_directory: &Utf8Path,
    ) -> Result<CompressionReport, CaptureError> {
        if !dataset_directory.as_std_path().is_dir() {
            return Err(CaptureError::StorageDirectoryNotFound(
                dataset_directory.to_string(),
            ));
        }

        let duplicates = find_duplicates(dataset_directory)?;
        if duplicates.is_empty() {
            debug!(directory = %dataset_directory, "no duplicate method directories");
            return Ok(CompressionReport::default());
        }

        let mut written: Vec<Utf8PathBuf> = Vec::new();
        for duplicate in &duplicates {
            if let Err(err) = self.write_and_verify(duplicate) {
                error!(
                    directory = %duplicate.directory,
                    error = %err,
                    "duplicate method compression aborted; originals kept"
                );
                written.push(duplicate.zip.clone());
                remove_zips(&written);
                return Err(err);
            }
            written.push(duplicate.zip.clone());
        }

        for duplicate in &duplicates {
            fs::remove_dir_all(duplicate.directory.as_std_path()).map_err(|err| {
                CaptureError::Filesystem(format!("remove {}: {err}", duplicate.directory))
            })?;
            info!(
                directory = %duplicate.directory,
                zip = %duplicate.zip,
                files = duplicate.files,
                "replaced duplicate method directory with zip"
            );
        }

        Ok(CompressionReport {
            compressed: duplicates,
        })
    }

    fn write_and_verify(&self, duplicate: &CompressedDirectory) -> Result<(), CaptureError> {
        self.writer.write_zip(
            duplicate.directory.as_std_path(),
            duplicate.zip.as_std_path(),
        )?;
        let found = if duplicate.zip.as_std_path().is_file() {
            fs_util::validate_zip(duplicate.zip.as_std_path())?
        } else {
            0
        };
        if found < duplicate.files {
            return Err(CaptureError::CompressionIntegrity {
                zip: duplicate.zip.to_string(),
                expected: duplicate.files,
                found,
            });
        }
        Ok(())
    }
}

fn method_pattern() -> Result<Regex, CaptureError> {
    Regex::new(r"(?i)^.+\.m$").map_err(|err| CaptureError::Filesystem(err.to_string()))
}

fn find_duplicates(dataset_directory: &Utf8Path) -> Result<Vec<CompressedDirectory>, CaptureError> {
    let pattern = method_pattern()?;
    let mut method_dirs = Vec::new();
    for path in fs_util::walk_dir(dataset_directory.as_std_path())? {
        if !path.is_dir() {
            continue;
        }
        let Ok(path) = Utf8PathBuf::from_path_buf(path) else {
            continue;
        };
        if path.file_name().is_some_and(|name| pattern.is_match(name)) {
            method_dirs.push(path);
        }
    }
    // Parents sort before their children.
    method_dirs.sort();

    let mut duplicates: Vec<CompressedDirectory> = Vec::new();
    for parent in &method_dirs {
        if duplicates
            .iter()
            .any(|dup| parent.starts_with(&dup.directory))
        {
            continue;
        }

        let mut siblings: Vec<Utf8PathBuf> = method_dirs
            .iter()
            .filter(|candidate| candidate.parent() == Some(parent.as_path()))
            .cloned()
            .collect();
        if siblings.len() < 2 {
            continue;
        }
        siblings.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let baseline = &siblings[0];
        let baseline_files = fs_util::relative_files(baseline.as_std_path())?;
        if baseline_files.is_empty() {
            continue;
        }
        for sibling in &siblings[1..] {
            let files = fs_util::relative_files(sibling.as_std_path())?;
            if files != baseline_files {
                debug!(
                    directory = %sibling,
                    baseline = %baseline,
                    "method directory differs from baseline"
                );
                continue;
            }
            let Some(name) = sibling.file_name() else {
                continue;
            };
            duplicates.push(CompressedDirectory {
                directory: sibling.clone(),
                baseline: baseline.clone(),
                zip: parent.join(format!("{name}.zip")),
                files: files.len(),
            });
        }
    }
    Ok(duplicates)
}

fn remove_zips(zips: &[Utf8PathBuf]) {
    for zip in zips {
        if !zip.as_std_path().exists() {
            continue;
        }
        if let Err(err) = fs::remove_file(zip.as_std_path()) {
            warn!(zip = %zip, error = %err, "could not remove unverified zip");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_method(dir: &Utf8Path, payload: &[u8]) {
        fs::create_dir_all(dir.join("sub").as_std_path()).unwrap();
        fs::write(dir.join("acqmethod.xml").as_std_path(), payload).unwrap();
        fs::write(dir.join("sub").join("devices.xml").as_std_path(), b"devices").unwrap();
    }

    #[test]
    fn siblings_with_different_lengths_are_kept() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let parent = root.join("Run1.d").join("Method.m");
        write_method(&parent.join("a.m"), b"same");
        write_method(&parent.join("b.m"), b"different");

        let duplicates = find_duplicates(&root).unwrap();
        assert!(duplicates.is_empty());
    }
}
