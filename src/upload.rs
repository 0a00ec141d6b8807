//! Bounded-retry archive upload.
//!
//! ```text
//! Idle -> Uploading -> Succeeded
//!                   -> FailedFatal       (collaborator says the failure will recur)
//!                   -> FailedRetryable   (attempt budget exhausted)
//!                   -> Cancelled         (token fired before or between attempts)
//! FailedRetryable-like attempt with budget left -> wait retry_delay -> Uploading
//! ```

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::CaptureError;
use crate::fs_util;

pub const LARGE_DATASET_THRESHOLD_GB: u64 = 15;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    #[default]
    Normal,
    /// Local bundle only; never retried.
    Debug,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub mode: UploadMode,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: DEFAULT_RETRY_DELAY,
            mode: UploadMode::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRequest {
    pub dataset: String,
    pub dataset_id: u64,
    pub job: u64,
    pub directory: Utf8PathBuf,
    /// Restricts the upload to one subdirectory (follow-up tasks).
    pub subdirectory: Option<String>,
}

impl UploadRequest {
    pub fn upload_root(&self) -> Utf8PathBuf {
        match &self.subdirectory {
            Some(subdirectory) => self.directory.join(subdirectory),
            None => self.directory.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub status_uri: Option<String>,
    #[serde(default)]
    pub new_files: u64,
    #[serde(default)]
    pub updated_files: u64,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub skipped_subdirectories: Vec<String>,
}

/// What one call to the archive service reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptReport {
    pub success: bool,
    pub allow_retry: bool,
    pub critical_error: Option<String>,
    pub message: Option<String>,
    pub hint: Option<String>,
    /// The service separately confirmed the upload completed.
    pub acknowledged: bool,
    pub receipt: UploadReceipt,
}

impl AttemptReport {
    pub fn succeeded(receipt: UploadReceipt, acknowledged: bool) -> Self {
        Self {
            success: true,
            allow_retry: true,
            acknowledged,
            receipt,
            ..Self::default()
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            allow_retry: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn fatal(message: impl Into<String>, hint: Option<String>) -> Self {
        let message = message.into();
        Self {
            allow_retry: false,
            critical_error: Some(message.clone()),
            message: Some(message),
            hint,
            ..Self::default()
        }
    }
}

pub trait ArchiveUploader {
    fn upload(&self, request: &UploadRequest) -> AttemptReport;
}

pub trait TaskQueue {
    fn enqueue_follow_up(&self, dataset: &str, subdirectory: &str) -> Result<(), CaptureError>;
}

impl<T: ArchiveUploader + ?Sized> ArchiveUploader for Box<T> {
    fn upload(&self, request: &UploadRequest) -> AttemptReport {
        (**self).upload(request)
    }
}

impl<T: TaskQueue + ?Sized> TaskQueue for Box<T> {
    fn enqueue_follow_up(&self, dataset: &str, subdirectory: &str) -> Result<(), CaptureError> {
        (**self).enqueue_follow_up(dataset, subdirectory)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadState {
    Idle,
    Uploading,
    Succeeded,
    FailedRetryable,
    FailedFatal,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub state: UploadState,
    pub attempts: u32,
    pub new_files: u64,
    pub updated_files: u64,
    pub bytes: u64,
    pub elapsed_ms: u64,
    pub started_at: String,
    pub status_uri: Option<String>,
    pub allow_retry: bool,
    pub critical_error: Option<String>,
    pub message: Option<String>,
    pub hint: Option<String>,
    pub acknowledged: bool,
    pub follow_up_tasks: Vec<String>,
    pub follow_up_failures: Vec<String>,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.state == UploadState::Succeeded
    }

    pub fn into_result(self) -> Result<UploadOutcome, CaptureError> {
        let message = self
            .message
            .clone()
            .unwrap_or_else(|| "upload failed".to_string());
        match self.state {
            UploadState::Succeeded => Ok(self),
            UploadState::FailedFatal => Err(CaptureError::UploadFatal {
                message,
                hint: self.hint,
            }),
            UploadState::Cancelled => Err(CaptureError::Cancelled),
            UploadState::Idle | UploadState::Uploading | UploadState::FailedRetryable => {
                Err(CaptureError::UploadRetryable(message))
            }
        }
    }
}

/// Cooperative cancellation shared with a supervisor thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (lock, signal) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks for up to `timeout`; returns true if cancelled.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (lock, signal) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = signal
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

pub struct UploadOrchestrator<'a, U: ArchiveUploader, Q: TaskQueue> {
    uploader: &'a U,
    queue: &'a Q,
    settings: UploadSettings,
    cancel: CancellationToken,
}

impl<'a, U: ArchiveUploader, Q: TaskQueue> UploadOrchestrator<'a, U, Q> {
    pub fn new(
        uploader: &'a U,
        queue: &'a Q,
        settings: UploadSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            uploader,
            queue,
            settings,
            cancel,
        }
    }

    pub fn attempt_upload(&self, request: &UploadRequest) -> UploadOutcome {
        let started = Instant::now();
        let started_at = chrono::Utc::now().to_rfc3339();
        let max_attempts = match self.settings.mode {
            UploadMode::Debug => 1,
            UploadMode::Normal => self.settings.max_attempts.max(1),
        };

        let mut state = UploadState::Idle;
        let mut attempts = 0u32;
        let mut last = AttemptReport::default();

        loop {
            if self.cancel.is_cancelled() {
                state = UploadState::Cancelled;
                break;
            }

            debug!(from = ?state, to = ?UploadState::Uploading, "upload state");
            state = UploadState::Uploading;
            attempts += 1;
            info!(
                dataset = %request.dataset,
                subdirectory = request.subdirectory.as_deref().unwrap_or(""),
                attempt = attempts,
                max_attempts,
                "uploading dataset to archive"
            );
            last = self.uploader.upload(request);

            if last.success {
                if !last.acknowledged {
                    warn!(
                        dataset = %request.dataset,
                        "archive reported success but never acknowledged completion"
                    );
                }
                state = UploadState::Succeeded;
                break;
            }

            if !last.allow_retry {
                error!(
                    dataset = %request.dataset,
                    message = last.message.as_deref().unwrap_or(""),
                    hint = last.hint.as_deref().unwrap_or(""),
                    "upload failed; not retrying"
                );
                state = UploadState::FailedFatal;
                break;
            }

            warn!(
                dataset = %request.dataset,
                attempt = attempts,
                message = last.message.as_deref().unwrap_or(""),
                "upload attempt failed"
            );
            if attempts >= max_attempts {
                state = UploadState::FailedRetryable;
                break;
            }
            if self.cancel.wait(self.settings.retry_delay) {
                state = UploadState::Cancelled;
                break;
            }
        }

        let mut follow_up_tasks = Vec::new();
        let mut follow_up_failures = Vec::new();
        if state == UploadState::Succeeded {
            for subdirectory in &last.receipt.skipped_subdirectories {
                match self.queue.enqueue_follow_up(&request.dataset, subdirectory) {
                    Ok(()) => {
                        info!(
                            dataset = %request.dataset,
                            subdirectory = %subdirectory,
                            "queued follow-up upload for skipped subdirectory"
                        );
                        follow_up_tasks.push(subdirectory.clone());
                    }
                    Err(err) => {
                        error!(
                            dataset = %request.dataset,
                            subdirectory = %subdirectory,
                            error = %err,
                            "could not queue follow-up upload"
                        );
                        follow_up_failures.push(format!("{subdirectory}: {err}"));
                    }
                }
            }
        }

        let message = match state {
            UploadState::Cancelled => Some("upload cancelled".to_string()),
            _ => last.message,
        };
        UploadOutcome {
            state,
            attempts,
            new_files: last.receipt.new_files,
            updated_files: last.receipt.updated_files,
            bytes: last.receipt.bytes,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            started_at,
            status_uri: last.receipt.status_uri,
            allow_retry: state != UploadState::FailedFatal,
            critical_error: last.critical_error,
            message,
            hint: last.hint,
            acknowledged: last.acknowledged,
            follow_up_tasks,
            follow_up_failures,
        }
    }
}

/// Files that an upload would send.
#[derive(Debug, Clone, Serialize)]
pub struct UploadManifest {
    pub root: Utf8PathBuf,
    pub files: Vec<(String, u64)>,
    pub total_bytes: u64,
}

impl UploadManifest {
    pub fn scan(root: &Utf8Path) -> Result<Self, CaptureError> {
        let files = fs_util::relative_files(root.as_std_path())?;
        let total_bytes = files.iter().map(|(_, length)| length).sum();
        Ok(Self {
            root: root.to_path_buf(),
            files,
            total_bytes,
        })
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

/// Conditions that fail identically on every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLimits {
    pub max_file_count: usize,
    pub large_dataset_threshold_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_count: 500_000,
            large_dataset_threshold_bytes: LARGE_DATASET_THRESHOLD_GB * BYTES_PER_GB,
        }
    }
}

impl UploadLimits {
    /// Scans the upload root and returns the manifest, or a fatal report.
    pub fn check(&self, request: &UploadRequest) -> Result<UploadManifest, AttemptReport> {
        let root = request.upload_root();
        if !root.as_std_path().is_dir() {
            return Err(AttemptReport::fatal(
                format!("directory not found: {root}"),
                Some("verify the storage path for this dataset, then reset the job".to_string()),
            ));
        }

        let manifest = UploadManifest::scan(&root).map_err(|err| {
            AttemptReport::fatal(format!("could not enumerate {root}: {err}"), None)
        })?;

        if manifest.file_count() > self.max_file_count {
            return Err(AttemptReport::fatal(
                format!(
                    "{} files exceed the archive limit of {}",
                    manifest.file_count(),
                    self.max_file_count
                ),
                Some(format!(
                    "zip or consolidate files in {root} and reset job {}",
                    request.job
                )),
            ));
        }

        if manifest.total_bytes > self.large_dataset_threshold_bytes {
            let size_gb = manifest.total_bytes as f64 / BYTES_PER_GB as f64;
            let limit_gb = self.large_dataset_threshold_bytes as f64 / BYTES_PER_GB as f64;
            return Err(AttemptReport::fatal(
                format!("dataset is {size_gb:.1} GB, over the {limit_gb:.0} GB automatic upload limit"),
                Some(format!(
                    "upload {} manually, or raise large_dataset_threshold_gb and reset job {}",
                    request.dataset, request.job
                )),
            ));
        }

        Ok(manifest)
    }
}
