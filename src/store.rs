use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::domain::{DatasetInfo, TaskDescriptor};
use crate::error::CaptureError;
use crate::fs_util;
use crate::share_path::{self, Reconciled};

pub const METADATA_FILE_NAME: &str = "capture.json";

/// Where a task's dataset comes from and where it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetPaths {
    pub source_directory: Utf8PathBuf,
    pub storage_directory: Utf8PathBuf,
    pub reconciled: Reconciled,
}

impl DatasetPaths {
    pub fn for_task(task: &TaskDescriptor) -> Self {
        let reconciled = share_path::reconcile(
            &task.source_vol,
            &task.source_path,
            task.capture_subdirectory().unwrap_or(""),
        );
        let source_directory = join_segments(
            &join_segments(Utf8Path::new(&task.source_vol), &reconciled.source_path),
            &reconciled.capture_sub_path,
        );

        let storage_directory = join_segments(
            &join_segments(Utf8Path::new(&task.storage_vol), &task.storage_path),
            &task.directory,
        );

        Self {
            source_directory,
            storage_directory,
            reconciled,
        }
    }

    pub fn metadata_path(&self) -> Utf8PathBuf {
        self.storage_directory.join(METADATA_FILE_NAME)
    }
}

/// Appends `relative` to `root`, accepting either separator.
pub fn join_segments(root: &Utf8Path, relative: &str) -> Utf8PathBuf {
    let mut joined = root.to_path_buf();
    for segment in relative.split(['\\', '/']).filter(|s| !s.is_empty()) {
        joined.push(segment);
    }
    joined
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub dataset: String,
    pub dataset_id: u64,
    pub job: u64,
    pub dataset_type: String,
    pub file_or_directory_name: String,
    pub files: Vec<String>,
    pub related_files: Vec<String>,
    pub source_directory: String,
    pub captured_at: String,
    pub tool: String,
}

impl CaptureMetadata {
    pub fn new(task: &TaskDescriptor, info: &DatasetInfo, source_directory: &Utf8Path) -> Self {
        Self {
            dataset: task.dataset.clone(),
            dataset_id: task.dataset_id,
            job: task.job,
            dataset_type: info.dataset_type.to_string(),
            file_or_directory_name: info.file_or_directory_name.clone(),
            files: info.files.clone(),
            related_files: info.related_files.clone(),
            source_directory: source_directory.to_string(),
            captured_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("capture-tm/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub struct Store;

impl Store {
    pub fn write_metadata(path: &Utf8Path, metadata: &CaptureMetadata) -> Result<(), CaptureError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| CaptureError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| CaptureError::Filesystem(err.to_string()))?;
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| CaptureError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| CaptureError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn read_metadata(path: &Utf8Path) -> Result<CaptureMetadata, CaptureError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CaptureError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| CaptureError::Filesystem(err.to_string()))
    }

    /// Copies a dataset directory into storage through a staging directory
    /// beside `dest`, replacing any earlier copy. Returns the bytes copied.
    pub fn copy_dir_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<u64, CaptureError> {
        let parent = storage_parent(dest)?;
        let staging = Builder::new()
            .prefix(".capture-tm-copy")
            .tempdir_in(parent.as_std_path())
            .map_err(|err| CaptureError::Filesystem(format!("stage in {parent}: {err}")))?;

        let mut copied = 0;
        for (relative, expected) in fs_util::relative_files(source.as_std_path())? {
            let target = staging.path().join(&relative);
            if let Some(dir) = target.parent() {
                fs::create_dir_all(dir)
                    .map_err(|err| CaptureError::Filesystem(err.to_string()))?;
            }
            copied += copy_checked(&source.as_std_path().join(&relative), &target, expected)?;
        }

        if dest.as_std_path().exists() {
            fs::remove_dir_all(dest.as_std_path())
                .map_err(|err| CaptureError::Filesystem(format!("replace {dest}: {err}")))?;
        }
        fs::rename(staging.path(), dest.as_std_path())
            .map_err(|err| CaptureError::Filesystem(format!("move into {dest}: {err}")))?;
        Ok(copied)
    }

    /// Copies one dataset file into storage via a temp file in the same
    /// directory. Returns the bytes copied.
    pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<u64, CaptureError> {
        let expected = fs::metadata(source.as_std_path())
            .map_err(|err| CaptureError::Filesystem(format!("stat {source}: {err}")))?
            .len();
        let parent = storage_parent(dest)?;
        let temp = Builder::new()
            .prefix(".capture-tm-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| CaptureError::Filesystem(format!("stage in {parent}: {err}")))?;
        let copied = copy_checked(source.as_std_path(), temp.path(), expected)?;
        temp.persist(dest.as_std_path())
            .map_err(|err| CaptureError::Filesystem(format!("move into {dest}: {err}")))?;
        Ok(copied)
    }
}

fn storage_parent(dest: &Utf8Path) -> Result<&Utf8Path, CaptureError> {
    let parent = dest
        .parent()
        .ok_or_else(|| CaptureError::Filesystem(format!("invalid destination path: {dest}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CaptureError::Filesystem(format!("create {parent}: {err}")))?;
    Ok(parent)
}

/// A size mismatch means the instrument was still writing the file.
fn copy_checked(source: &Path, target: &Path, expected: u64) -> Result<u64, CaptureError> {
    let copied = fs::copy(source, target)
        .map_err(|err| CaptureError::Filesystem(format!("copy {}: {err}", source.display())))?;
    if copied != expected {
        return Err(CaptureError::Filesystem(format!(
            "{} changed size during copy ({expected} -> {copied} bytes); acquisition may still be running",
            source.display()
        )));
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> TaskDescriptor {
        serde_json::from_str(
            r#"{
                "Dataset": "QC_Mam_19_01",
                "Storage_Vol": "/srv/storage",
                "Storage_Path": "Lumos01\\2024_1",
                "Directory": "QC_Mam_19_01",
                "Source_Vol": "/mnt/instruments",
                "Source_Path": "Lumos01/ProteomicsData",
                "Capture_Subfolder": "Batch3"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn layout_paths() {
        let paths = DatasetPaths::for_task(&task());
        assert_eq!(
            paths.source_directory,
            Utf8PathBuf::from("/mnt/instruments/Lumos01/ProteomicsData/Batch3")
        );
        assert_eq!(
            paths.storage_directory,
            Utf8PathBuf::from("/srv/storage/Lumos01/2024_1/QC_Mam_19_01")
        );
        assert!(paths.metadata_path().ends_with("QC_Mam_19_01/capture.json"));
        assert!(!paths.reconciled.changed);
    }

    #[test]
    fn copy_dir_atomic_replaces_destination() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let source = root.join("src.d");
        fs::create_dir_all(source.join("nested").as_std_path()).unwrap();
        fs::write(source.join("nested").join("analysis.baf").as_std_path(), b"baf").unwrap();

        let dest = root.join("store").join("src.d");
        fs::create_dir_all(dest.as_std_path()).unwrap();
        fs::write(dest.join("stale.txt").as_std_path(), b"old").unwrap();

        assert_eq!(Store::copy_dir_atomic(&source, &dest).unwrap(), 3);
        assert!(dest.join("nested").join("analysis.baf").as_std_path().is_file());
        assert!(!dest.join("stale.txt").as_std_path().exists());
    }
}
