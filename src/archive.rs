use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::{Body, Client};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CaptureError, is_retryable_status};
use crate::fs_util;
use crate::upload::{
    ArchiveUploader, AttemptReport, TaskQueue, UploadLimits, UploadReceipt, UploadRequest,
};

pub const FOLLOW_UP_STEP_TOOL: &str = "ArchiveUpdate";

const CONFIRM_POLLS: u32 = 4;
const CONFIRM_POLL_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(flatten)]
    receipt: UploadReceipt,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpTask {
    pub dataset: String,
    pub subdirectory: String,
    pub step_tool: String,
    pub queued_at: String,
}

impl FollowUpTask {
    pub fn new(dataset: &str, subdirectory: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            subdirectory: subdirectory.to_string(),
            step_tool: FOLLOW_UP_STEP_TOOL.to_string(),
            queued_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn client_with_headers(timeout: Duration) -> Result<Client, CaptureError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("capture-tm/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| CaptureError::ArchiveHttp(err.to_string()))?,
    );
    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|err| CaptureError::ArchiveHttp(err.to_string()))
}

#[derive(Clone)]
pub struct HttpArchiveUploader {
    client: Client,
    base_url: String,
    limits: UploadLimits,
}

impl HttpArchiveUploader {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        limits: UploadLimits,
    ) -> Result<Self, CaptureError> {
        Ok(Self {
            client: client_with_headers(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            limits,
        })
    }

    fn post_bundle(&self, request: &UploadRequest, bundle: &Utf8Path) -> AttemptReport {
        let file = match File::open(bundle.as_std_path()) {
            Ok(file) => file,
            Err(err) => {
                return AttemptReport::fatal(format!("open bundle {bundle}: {err}"), None);
            }
        };

        let url = format!("{}/upload", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/zip")
            .header("X-Dataset", request.dataset.as_str())
            .header("X-Dataset-Id", request.dataset_id.to_string())
            .header("X-Job", request.job.to_string());
        if let Some(subdirectory) = &request.subdirectory {
            builder = builder.header("X-Subdirectory", subdirectory.as_str());
        }

        let response = match builder.body(Body::from(file)).send() {
            Ok(response) => response,
            Err(err) if is_retryable_error(&err) => {
                return AttemptReport::retryable(format!("archive request failed: {err}"));
            }
            Err(err) => {
                return AttemptReport::fatal(format!("archive request failed: {err}"), None);
            }
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "archive request failed".to_string());
            return status_report(status, body);
        }

        let parsed: UploadResponse = match response.json() {
            Ok(parsed) => parsed,
            Err(err) => {
                return AttemptReport::retryable(format!("unreadable archive response: {err}"));
            }
        };
        if let Some(code) = parsed.error_code.filter(|code| !code.trim().is_empty()) {
            return AttemptReport::fatal(
                format!("archive service rejected the upload: {code}"),
                hint_for_error_code(&code),
            );
        }

        let acknowledged = match &parsed.receipt.status_uri {
            Some(uri) => self.confirm(uri),
            None => false,
        };
        AttemptReport::succeeded(parsed.receipt, acknowledged)
    }

    /// Polls the receipt's status URI until the archive reports the upload
    /// complete. Gives up after a few polls; the caller treats that as an
    /// unacknowledged success.
    fn confirm(&self, status_uri: &str) -> bool {
        for poll in 1..=CONFIRM_POLLS {
            if poll > 1 {
                thread::sleep(CONFIRM_POLL_DELAY * (poll - 1));
            }
            let response = match self.client.get(status_uri).send() {
                Ok(response) => response,
                Err(err) if is_retryable_error(&err) => {
                    debug!(status_uri, poll, error = %err, "upload status unreachable");
                    continue;
                }
                Err(err) => {
                    warn!(status_uri, error = %err, "could not confirm upload");
                    return false;
                }
            };
            let status = response.status().as_u16();
            if is_retryable_status(status) {
                debug!(status_uri, poll, status, "upload status busy");
                continue;
            }
            if !response.status().is_success() {
                warn!(status_uri, status, "upload status check failed");
                return false;
            }
            match response.json::<StatusResponse>() {
                Ok(StatusResponse { complete: true }) => return true,
                Ok(_) => debug!(status_uri, poll, "upload not yet complete"),
                Err(err) => {
                    warn!(status_uri, error = %err, "unreadable upload status");
                    return false;
                }
            }
        }
        warn!(status_uri, polls = CONFIRM_POLLS, "archive never reported the upload complete");
        false
    }
}

impl ArchiveUploader for HttpArchiveUploader {
    fn upload(&self, request: &UploadRequest) -> AttemptReport {
        let manifest = match self.limits.check(request) {
            Ok(manifest) => manifest,
            Err(report) => return report,
        };

        let bundle = match tempfile::Builder::new()
            .prefix(".capture-tm-")
            .suffix(".zip")
            .tempfile()
        {
            Ok(bundle) => bundle,
            Err(err) => return AttemptReport::fatal(format!("create bundle: {err}"), None),
        };
        let Some(bundle_path) = Utf8Path::from_path(bundle.path()) else {
            return AttemptReport::fatal("bundle path is not UTF-8", None);
        };
        if let Err(err) = fs_util::zip_directory(manifest.root.as_std_path(), bundle.path()) {
            return AttemptReport::fatal(format!("bundle {}: {err}", manifest.root), None);
        }
        debug!(
            dataset = %request.dataset,
            files = manifest.file_count(),
            bytes = manifest.total_bytes,
            "posting archive bundle"
        );
        self.post_bundle(request, bundle_path)
    }
}

/// Writes the upload bundle to a staging directory instead of the archive.
#[derive(Debug, Clone)]
pub struct LocalBundleUploader {
    staging_dir: Utf8PathBuf,
    limits: UploadLimits,
}

impl LocalBundleUploader {
    pub fn new(staging_dir: Utf8PathBuf, limits: UploadLimits) -> Self {
        Self {
            staging_dir,
            limits,
        }
    }

    pub fn bundle_path(&self, request: &UploadRequest) -> Utf8PathBuf {
        let name = match &request.subdirectory {
            Some(subdirectory) => format!("{}_{}.zip", request.dataset, subdirectory),
            None => format!("{}.zip", request.dataset),
        };
        self.staging_dir.join(name)
    }

    fn write_bundle(
        &self,
        source: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<usize, CaptureError> {
        fs::create_dir_all(self.staging_dir.as_std_path())
            .map_err(|err| CaptureError::Filesystem(format!("create {}: {err}", self.staging_dir)))?;
        let temp = tempfile::Builder::new()
            .prefix(".capture-tm-")
            .suffix(".zip")
            .tempfile_in(self.staging_dir.as_std_path())
            .map_err(|err| CaptureError::Filesystem(err.to_string()))?;
        let written = fs_util::zip_directory(source.as_std_path(), temp.path())?;
        temp.persist(destination.as_std_path())
            .map_err(|err| CaptureError::Filesystem(err.to_string()))?;
        Ok(written)
    }
}

impl ArchiveUploader for LocalBundleUploader {
    fn upload(&self, request: &UploadRequest) -> AttemptReport {
        let manifest = match self.limits.check(request) {
            Ok(manifest) => manifest,
            Err(report) => return report,
        };
        let destination = self.bundle_path(request);
        if let Err(err) = self.write_bundle(&manifest.root, &destination) {
            return AttemptReport::fatal(format!("write bundle {destination}: {err}"), None);
        }
        let acknowledged = fs_util::validate_zip(destination.as_std_path())
            .is_ok_and(|entries| entries == manifest.file_count());
        info!(
            dataset = %request.dataset,
            bundle = %destination,
            files = manifest.file_count(),
            "wrote local archive bundle"
        );
        AttemptReport::succeeded(
            UploadReceipt {
                status_uri: Some(format!("file://{destination}")),
                new_files: manifest.file_count() as u64,
                updated_files: 0,
                bytes: manifest.total_bytes,
                skipped_subdirectories: Vec::new(),
            },
            acknowledged,
        )
    }
}

#[derive(Clone)]
pub struct HttpTaskQueue {
    client: Client,
    base_url: String,
}

impl HttpTaskQueue {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CaptureError> {
        Ok(Self {
            client: client_with_headers(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl TaskQueue for HttpTaskQueue {
    fn enqueue_follow_up(&self, dataset: &str, subdirectory: &str) -> Result<(), CaptureError> {
        let url = format!("{}/tasks", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&FollowUpTask::new(dataset, subdirectory))
            .send()
            .map_err(|err| CaptureError::TaskQueue(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "task queue request failed".to_string());
            return Err(CaptureError::ArchiveStatus { status, message });
        }
        Ok(())
    }
}

/// Appends one JSON line per follow-up task.
#[derive(Debug, Clone)]
pub struct JsonlTaskQueue {
    path: Utf8PathBuf,
}

impl JsonlTaskQueue {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl TaskQueue for JsonlTaskQueue {
    fn enqueue_follow_up(&self, dataset: &str, subdirectory: &str) -> Result<(), CaptureError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| CaptureError::TaskQueue(format!("create {parent}: {err}")))?;
        }
        let line = serde_json::to_string(&FollowUpTask::new(dataset, subdirectory))
            .map_err(|err| CaptureError::TaskQueue(err.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_std_path())
            .map_err(|err| CaptureError::TaskQueue(format!("open {}: {err}", self.path)))?;
        writeln!(file, "{line}").map_err(|err| CaptureError::TaskQueue(err.to_string()))
    }
}

fn hint_for_status(status: u16) -> Option<String> {
    match status {
        401 | 403 => Some(
            "check the archive credentials and the instrument operator's archive identity"
                .to_string(),
        ),
        413 => Some("upload the dataset manually, then reset the job".to_string()),
        _ => None,
    }
}

fn hint_for_error_code(code: &str) -> Option<String> {
    match code {
        "unknown_operator" | "identity" => Some(
            "register the instrument operator with the archive, then reset the job".to_string(),
        ),
        "unknown_proposal" => Some("associate the dataset with a valid proposal".to_string()),
        _ => None,
    }
}

/// Turns a non-success upload status into a report; retryability follows
/// [`CaptureError::is_recoverable`].
fn status_report(status: u16, body: String) -> AttemptReport {
    let err = CaptureError::ArchiveStatus {
        status,
        message: body,
    };
    if err.is_recoverable() {
        AttemptReport::retryable(err.to_string())
    } else {
        AttemptReport::fatal(err.to_string(), hint_for_status(status))
    }
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
