use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use capture_task_manager::archive::{
    FOLLOW_UP_STEP_TOOL, FollowUpTask, HttpArchiveUploader, HttpTaskQueue, JsonlTaskQueue,
    LocalBundleUploader,
};
use capture_task_manager::error::CaptureError;
use capture_task_manager::fs_util;
use capture_task_manager::upload::{ArchiveUploader, TaskQueue, UploadLimits, UploadRequest};

fn dataset() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let dataset = root.join("storage").join("Run5");
    fs::create_dir_all(dataset.join("QC").as_std_path()).unwrap();
    fs::write(dataset.join("Run5.raw").as_std_path(), b"raw-bytes").unwrap();
    fs::write(dataset.join("QC").join("tic.png").as_std_path(), b"png").unwrap();
    (temp, root)
}

fn request(root: &Utf8PathBuf, subdirectory: Option<&str>) -> UploadRequest {
    UploadRequest {
        dataset: "Run5".to_string(),
        dataset_id: 11,
        job: 22,
        directory: root.join("storage").join("Run5"),
        subdirectory: subdirectory.map(str::to_string),
    }
}

#[test]
fn local_bundle_contains_every_file() {
    let (_temp, root) = dataset();
    let uploader = LocalBundleUploader::new(root.join("staging"), UploadLimits::default());

    let report = uploader.upload(&request(&root, None));
    assert!(report.success);
    assert!(report.acknowledged);
    assert_eq!(report.receipt.new_files, 2);
    assert_eq!(report.receipt.bytes, 12);

    let bundle = root.join("staging").join("Run5.zip");
    assert_eq!(
        report.receipt.status_uri.as_deref(),
        Some(format!("file://{bundle}").as_str())
    );
    assert_eq!(fs_util::validate_zip(bundle.as_std_path()).unwrap(), 2);
}

#[test]
fn local_bundle_for_subdirectory() {
    let (_temp, root) = dataset();
    let uploader = LocalBundleUploader::new(root.join("staging"), UploadLimits::default());

    let report = uploader.upload(&request(&root, Some("QC")));
    assert!(report.success);
    assert_eq!(report.receipt.new_files, 1);
    assert!(root.join("staging").join("Run5_QC.zip").as_std_path().is_file());
}

#[test]
fn local_bundle_applies_limits() {
    let (_temp, root) = dataset();
    let limits = UploadLimits {
        max_file_count: 1,
        ..UploadLimits::default()
    };
    let uploader = LocalBundleUploader::new(root.join("staging"), limits);

    let report = uploader.upload(&request(&root, None));
    assert!(!report.success);
    assert!(!report.allow_retry);
    assert!(!root.join("staging").join("Run5.zip").as_std_path().exists());
}

#[test]
fn jsonl_queue_appends_one_line_per_task() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("queue").join("follow-ups.jsonl")).unwrap();
    let queue = JsonlTaskQueue::new(path.clone());

    queue.enqueue_follow_up("Run5", "QC").unwrap();
    queue.enqueue_follow_up("Run5", "Spectra").unwrap();

    let content = fs::read_to_string(path.as_std_path()).unwrap();
    let tasks: Vec<FollowUpTask> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].subdirectory, "QC");
    assert_eq!(tasks[1].subdirectory, "Spectra");
    assert!(tasks.iter().all(|task| task.step_tool == FOLLOW_UP_STEP_TOOL));
}

/// Answers one request with `status` and `body`, returning the request line.
fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();

        let mut content_length = 0usize;
        let mut chunked = false;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let header = line.trim_end().to_ascii_lowercase();
            if header.is_empty() {
                break;
            }
            if let Some(value) = header.strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap();
            }
            if header == "transfer-encoding: chunked" {
                chunked = true;
            }
        }
        if chunked {
            loop {
                let mut size = String::new();
                reader.read_line(&mut size).unwrap();
                let size = usize::from_str_radix(size.trim(), 16).unwrap();
                let mut chunk = vec![0; size + 2];
                reader.read_exact(&mut chunk).unwrap();
                if size == 0 {
                    break;
                }
            }
        } else {
            let mut payload = vec![0; content_length];
            reader.read_exact(&mut payload).unwrap();
        }

        let mut stream = reader.into_inner();
        write!(
            stream,
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
        .unwrap();
        stream.flush().unwrap();
        request_line.trim_end().to_string()
    });
    (base_url, handle)
}

#[test]
fn insufficient_storage_upload_may_be_retried() {
    let (_temp, root) = dataset();
    let (base_url, server) = serve_once("507 Insufficient Storage", "archive volume full");
    let uploader =
        HttpArchiveUploader::new(&base_url, Duration::from_secs(10), UploadLimits::default())
            .unwrap();

    let report = uploader.upload(&request(&root, None));
    assert_eq!(server.join().unwrap(), "POST /upload HTTP/1.1");
    assert!(!report.success);
    assert!(report.allow_retry);
    assert!(report.critical_error.is_none());
    assert!(report.message.unwrap().contains("archive volume full"));
}

#[test]
fn rejected_follow_up_carries_archive_status() {
    let (base_url, server) = serve_once("403 Forbidden", "no such operator");
    let queue = HttpTaskQueue::new(&base_url, Duration::from_secs(10)).unwrap();

    let err = queue.enqueue_follow_up("Run5", "QC").unwrap_err();
    assert_eq!(server.join().unwrap(), "POST /tasks HTTP/1.1");
    assert_matches!(err, CaptureError::ArchiveStatus { status: 403, .. });
    assert!(!err.is_recoverable());
}
