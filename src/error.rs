use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CaptureError {
    #[error("source directory not found: {0}")]
    #[diagnostic(help("check that the instrument share is reachable and the source path is correct"))]
    SourceDirectoryNotFound(String),

    #[error("dataset {dataset} not found in {directory}")]
    DatasetNotFound { dataset: String, directory: String },

    #[error("storage directory not found: {0}")]
    StorageDirectoryNotFound(String),

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("zip verification failed for {zip}: expected at least {expected} entries, found {found}")]
    CompressionIntegrity {
        zip: String,
        expected: usize,
        found: usize,
    },

    #[error("archive request failed: {0}")]
    ArchiveHttp(String),

    #[error("archive service returned status {status}: {message}")]
    ArchiveStatus { status: u16, message: String },

    #[error("failed to queue follow-up task: {0}")]
    TaskQueue(String),

    #[error("upload failed and may be retried: {0}")]
    UploadRetryable(String),

    #[error("upload failed permanently: {message}")]
    UploadFatal {
        message: String,
        hint: Option<String>,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl CaptureError {
    /// True when waiting and retrying later can succeed without a human
    /// changing anything.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CaptureError::SourceDirectoryNotFound(_)
            | CaptureError::DatasetNotFound { .. }
            | CaptureError::StorageDirectoryNotFound(_)
            | CaptureError::ArchiveHttp(_)
            | CaptureError::TaskQueue(_)
            | CaptureError::UploadRetryable(_)
            | CaptureError::CompressionIntegrity { .. }
            | CaptureError::Cancelled => true,
            CaptureError::ArchiveStatus { status, .. } => is_retryable_status(*status),
            CaptureError::InvalidTask(_)
            | CaptureError::ConfigRead(_)
            | CaptureError::ConfigParse(_)
            | CaptureError::Filesystem(_)
            | CaptureError::UploadFatal { .. } => false,
        }
    }
}

/// Timeouts, throttling and any server-side failure.
pub fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_upload_is_not_recoverable() {
        let err = CaptureError::UploadFatal {
            message: "too many files".to_string(),
            hint: None,
        };
        assert!(!err.is_recoverable());
        assert!(CaptureError::UploadRetryable("timeout".to_string()).is_recoverable());
    }

    #[test]
    fn archive_status_recoverability_follows_status() {
        let busy = CaptureError::ArchiveStatus {
            status: 503,
            message: "busy".to_string(),
        };
        let rejected = CaptureError::ArchiveStatus {
            status: 413,
            message: "too large".to_string(),
        };
        assert!(busy.is_recoverable());
        assert!(!rejected.is_recoverable());
    }

    #[test]
    fn every_5xx_status_is_retryable() {
        assert!(is_retryable_status(501));
        assert!(is_retryable_status(507));
        assert!(is_retryable_status(599));
        assert!(!is_retryable_status(600));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(413));
    }
}
