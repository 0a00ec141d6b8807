use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;
use tracing::{info, warn};

use crate::compress::{CompressionReport, DuplicateMethodCompressor};
use crate::config::ManagerConfig;
use crate::domain::{DatasetInfo, DatasetType, TaskDescriptor};
use crate::error::CaptureError;
use crate::resolver::{DatasetResolver, layout_warnings};
use crate::store::{CaptureMetadata, DatasetPaths, Store};
use crate::taxonomy::{InstrumentClass, RawDataType};
use crate::upload::{
    ArchiveUploader, CancellationToken, TaskQueue, UploadOrchestrator, UploadOutcome,
    UploadRequest,
};

#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveResult {
    pub source_directory: String,
    pub search_files_first: bool,
    pub instrument_class: String,
    pub dataset: DatasetInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureResult {
    pub dataset: String,
    pub dataset_type: String,
    pub file_or_directory_name: String,
    pub files: Vec<String>,
    pub related_files: Vec<String>,
    pub source_directory: String,
    pub storage_directory: String,
    pub reconciled: bool,
    pub action: String,
    pub warnings: Vec<String>,
    pub metadata_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveResult {
    pub dataset: String,
    pub storage_directory: String,
    pub subdirectory: Option<String>,
    pub compression: CompressionReport,
    pub compression_warning: Option<String>,
    pub upload: UploadOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaxonomyEntry {
    pub instrument_class: String,
    pub default_raw_data_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaxonomyResult {
    pub instrument_classes: Vec<TaxonomyEntry>,
    pub raw_data_types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<U: ArchiveUploader, Q: TaskQueue> {
    config: ManagerConfig,
    resolver: DatasetResolver,
    compressor: DuplicateMethodCompressor,
    uploader: U,
    queue: Q,
    cancel: CancellationToken,
}

impl<U: ArchiveUploader, Q: TaskQueue> App<U, Q> {
    pub fn new(config: ManagerConfig, uploader: U, queue: Q) -> Self {
        Self {
            resolver: DatasetResolver::new(config.substitutions.clone()),
            compressor: DuplicateMethodCompressor::new(),
            config,
            uploader,
            queue,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Token that interrupts an in-progress `archive` call.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn resolve(
        &self,
        source_directory: &Utf8Path,
        dataset: &str,
        search_files_first: bool,
        instrument_class: InstrumentClass,
        sink: &dyn ProgressSink,
    ) -> Result<ResolveResult, CaptureError> {
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {dataset} in {source_directory}"),
            elapsed: None,
        });
        if !DatasetResolver::source_directory_exists(source_directory) {
            return Err(CaptureError::SourceDirectoryNotFound(
                source_directory.to_string(),
            ));
        }
        let resolution = self.resolver.resolve_for_instrument(
            source_directory,
            dataset,
            search_files_first,
            instrument_class,
        )?;
        Ok(ResolveResult {
            source_directory: source_directory.to_string(),
            search_files_first,
            instrument_class: instrument_class.to_string(),
            dataset: resolution.info,
        })
    }

    pub fn compress(
        &self,
        dataset_directory: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<CompressionReport, CaptureError> {
        let start = Instant::now();
        let report = self.compressor.compress_duplicates(dataset_directory)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Compress; {} duplicate method directories",
                report.compressed.len()
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(report)
    }

    pub fn capture(
        &self,
        task: &TaskDescriptor,
        options: CaptureOptions,
        sink: &dyn ProgressSink,
    ) -> Result<CaptureResult, CaptureError> {
        task.validate()?;
        let start = Instant::now();
        let paths = DatasetPaths::for_task(task);
        if paths.reconciled.changed {
            info!(
                dataset = %task.dataset,
                source_path = %paths.reconciled.source_path,
                capture_sub_path = %paths.reconciled.capture_sub_path,
                "capture sub-path climbs out of the source path; using reconciled share path"
            );
        }

        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {} in {}", task.dataset, paths.source_directory),
            elapsed: None,
        });
        if !DatasetResolver::source_directory_exists(&paths.source_directory) {
            return Err(CaptureError::SourceDirectoryNotFound(
                paths.source_directory.to_string(),
            ));
        }

        let raw_data_type = task.effective_raw_data_type();
        let resolution = self.resolver.resolve_for_instrument(
            &paths.source_directory,
            &task.dataset,
            raw_data_type.searches_files_first(),
            task.instrument_class,
        )?;
        let info = resolution.info;
        if !info.is_found() {
            return Err(CaptureError::DatasetNotFound {
                dataset: task.dataset.clone(),
                directory: paths.source_directory.to_string(),
            });
        }

        let warnings = layout_warnings(&info, &paths.source_directory, raw_data_type);
        for warning in &warnings {
            warn!(dataset = %task.dataset, "{warning}");
        }

        let targets = capture_targets(&info);
        let present = targets
            .iter()
            .all(|name| paths.storage_directory.join(name).as_std_path().exists());

        let (action, metadata_path) = if options.dry_run {
            ("dry-run", None)
        } else if present && !options.force {
            sink.event(ProgressEvent {
                message: "phase=Store; already in storage".to_string(),
                elapsed: None,
            });
            ("present", None)
        } else {
            sink.event(ProgressEvent {
                message: format!("phase=Store; copying {} item(s)", targets.len()),
                elapsed: None,
            });
            let bytes = self.copy_to_storage(&info, &paths)?;
            info!(dataset = %task.dataset, bytes, "copied dataset to storage");
            let metadata_path = paths.metadata_path();
            let metadata = CaptureMetadata::new(task, &info, &paths.source_directory);
            Store::write_metadata(&metadata_path, &metadata)?;
            ("captured", Some(metadata_path.to_string()))
        };

        sink.event(ProgressEvent {
            message: format!("phase=Done; {action}"),
            elapsed: Some(start.elapsed()),
        });
        info!(
            dataset = %task.dataset,
            dataset_type = %info.dataset_type,
            action,
            "capture finished"
        );

        Ok(CaptureResult {
            dataset: task.dataset.clone(),
            dataset_type: info.dataset_type.to_string(),
            file_or_directory_name: info.file_or_directory_name,
            files: info.files,
            related_files: info.related_files,
            source_directory: paths.source_directory.to_string(),
            storage_directory: paths.storage_directory.to_string(),
            reconciled: paths.reconciled.changed,
            action: action.to_string(),
            warnings,
            metadata_path,
        })
    }

    pub fn archive(
        &self,
        task: &TaskDescriptor,
        subdirectory: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<ArchiveResult, CaptureError> {
        task.validate()?;
        let start = Instant::now();
        let paths = DatasetPaths::for_task(task);
        if !paths.storage_directory.as_std_path().is_dir() {
            return Err(CaptureError::StorageDirectoryNotFound(
                paths.storage_directory.to_string(),
            ));
        }

        sink.event(ProgressEvent {
            message: "phase=Compress; checking for duplicate method directories".to_string(),
            elapsed: None,
        });
        let (compression, compression_warning) =
            match self.compressor.compress_duplicates(&paths.storage_directory) {
                Ok(report) => (report, None),
                Err(err) => {
                    warn!(
                        dataset = %task.dataset,
                        error = %err,
                        "duplicate compression skipped; uploading uncompressed"
                    );
                    (CompressionReport::default(), Some(err.to_string()))
                }
            };

        sink.event(ProgressEvent {
            message: format!("phase=Upload; {}", task.dataset),
            elapsed: Some(start.elapsed()),
        });
        let request = UploadRequest {
            dataset: task.dataset.clone(),
            dataset_id: task.dataset_id,
            job: task.job,
            directory: paths.storage_directory.clone(),
            subdirectory: subdirectory.map(str::to_string),
        };
        let orchestrator = UploadOrchestrator::new(
            &self.uploader,
            &self.queue,
            self.config.upload.clone(),
            self.cancel.clone(),
        );
        let upload = orchestrator.attempt_upload(&request);

        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; upload {:?} after {} attempt(s)",
                upload.state, upload.attempts
            ),
            elapsed: Some(start.elapsed()),
        });

        Ok(ArchiveResult {
            dataset: task.dataset.clone(),
            storage_directory: paths.storage_directory.to_string(),
            subdirectory: request.subdirectory,
            compression,
            compression_warning,
            upload,
        })
    }

    fn copy_to_storage(
        &self,
        info: &DatasetInfo,
        paths: &DatasetPaths,
    ) -> Result<u64, CaptureError> {
        if info.dataset_type.is_directory() {
            let name = &info.file_or_directory_name;
            return Store::copy_dir_atomic(
                &paths.source_directory.join(name),
                &paths.storage_directory.join(name),
            );
        }
        let mut copied = 0;
        for name in info.files.iter().chain(&info.related_files) {
            copied += Store::copy_file_atomic(
                &paths.source_directory.join(name),
                &paths.storage_directory.join(name),
            )?;
        }
        Ok(copied)
    }
}

pub fn taxonomy() -> TaxonomyResult {
    TaxonomyResult {
        instrument_classes: InstrumentClass::ALL
            .iter()
            .map(|class| TaxonomyEntry {
                instrument_class: class.name().to_string(),
                default_raw_data_type: class.default_raw_data_type().token().to_string(),
            })
            .collect(),
        raw_data_types: RawDataType::ALL
            .iter()
            .map(|raw| raw.token().to_string())
            .collect(),
    }
}

fn capture_targets(info: &DatasetInfo) -> Vec<String> {
    match info.dataset_type {
        DatasetType::File | DatasetType::MultiFile => info.files.clone(),
        DatasetType::None => Vec::new(),
        _ => vec![info.file_or_directory_name.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::JsonOutput;
    use crate::upload::{AttemptReport, UploadReceipt};
    use std::fs;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockUploader {
        calls: Mutex<usize>,
    }

    impl ArchiveUploader for MockUploader {
        fn upload(&self, _request: &UploadRequest) -> AttemptReport {
            *self.calls.lock().unwrap() += 1;
            AttemptReport::succeeded(UploadReceipt::default(), true)
        }
    }

    struct NoQueue;

    impl TaskQueue for NoQueue {
        fn enqueue_follow_up(&self, _dataset: &str, _subdirectory: &str) -> Result<(), CaptureError> {
            Err(CaptureError::TaskQueue("not implemented".to_string()))
        }
    }

    #[test]
    fn capture_skips_dataset_already_in_storage() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().to_str().unwrap().to_string();
        fs::create_dir_all(temp.path().join("instrument")).unwrap();
        fs::write(temp.path().join("instrument").join("Run7.raw"), b"raw").unwrap();
        fs::create_dir_all(temp.path().join("storage").join("Run7")).unwrap();
        fs::write(temp.path().join("storage").join("Run7").join("Run7.raw"), b"raw").unwrap();

        let task: TaskDescriptor = serde_json::from_value(serde_json::json!({
            "Dataset": "Run7",
            "Source_Vol": root,
            "Source_Path": "instrument",
            "Storage_Vol": root,
            "Storage_Path": "storage",
            "Directory": "Run7",
            "RawDataType": "dot_raw_files"
        }))
        .unwrap();

        let app = App::new(ManagerConfig::default(), MockUploader::default(), NoQueue);
        let result = app
            .capture(&task, CaptureOptions::default(), &JsonOutput)
            .unwrap();
        assert_eq!(result.action, "present");
        assert!(result.metadata_path.is_none());
    }
}
