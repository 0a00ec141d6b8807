use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::CaptureError;

/// Every file and directory below `root`, depth first, unsorted. Symlinked
/// directories are left out and never descended into.
pub fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path)
            .map_err(|err| CaptureError::Filesystem(format!("list {}: {err}", path.display())))?;
        for entry in entries {
            let entry = entry.map_err(|err| CaptureError::Filesystem(err.to_string()))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|err| CaptureError::Filesystem(format!("stat {}: {err}", path.display())))?;
            if file_type.is_dir() {
                stack.push(path.clone());
            } else if file_type.is_symlink() && path.is_dir() {
                debug!(path = %path.display(), "skipping symlinked directory");
                continue;
            }
            items.push(path);
        }
    }
    Ok(items)
}

/// Files below `root` as (`/`-separated relative path, byte length), sorted by
/// relative path.
pub fn relative_files(root: &Path) -> Result<Vec<(String, u64)>, CaptureError> {
    let mut files = Vec::new();
    for path in walk_dir(root)? {
        if path.is_dir() {
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .map_err(|err| CaptureError::Filesystem(err.to_string()))?;
        let name = zip_entry_name(relative)?;
        let length = fs::metadata(&path)
            .map_err(|err| CaptureError::Filesystem(format!("stat {}: {err}", path.display())))?
            .len();
        files.push((name, length));
    }
    files.sort();
    Ok(files)
}

fn zip_entry_name(relative: &Path) -> Result<String, CaptureError> {
    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| {
            CaptureError::Filesystem(format!("non-UTF-8 path: {}", relative.display()))
        })?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// Writes every file below `source_dir` into a new zip at `zip_path` and
/// returns the number of files written.
pub fn zip_directory(source_dir: &Path, zip_path: &Path) -> Result<usize, CaptureError> {
    let files = relative_files(source_dir)?;
    let file = fs::File::create(zip_path)
        .map_err(|err| CaptureError::Filesystem(format!("create zip {}: {err}", zip_path.display())))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for (name, _) in &files {
        writer
            .start_file(name.as_str(), options)
            .map_err(|err| CaptureError::Filesystem(err.to_string()))?;
        let mut source = fs::File::open(source_dir.join(name))
            .map_err(|err| CaptureError::Filesystem(format!("open {name}: {err}")))?;
        io::copy(&mut source, &mut writer)
            .map_err(|err| CaptureError::Filesystem(err.to_string()))?;
    }
    writer
        .finish()
        .map_err(|err| CaptureError::Filesystem(err.to_string()))?;
    Ok(files.len())
}

/// Reads every entry to the end and returns the number of file entries.
pub fn validate_zip(zip_path: &Path) -> Result<usize, CaptureError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| CaptureError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| CaptureError::Filesystem(err.to_string()))?;

    let mut file_entries = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| CaptureError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| CaptureError::Filesystem(err.to_string()))?;
        file_entries += 1;
    }
    Ok(file_entries)
}
