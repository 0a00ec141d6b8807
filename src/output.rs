use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    ArchiveResult, CaptureResult, ProgressEvent, ProgressSink, ResolveResult, TaxonomyResult,
};
use crate::compress::CompressionReport;
use crate::share_path::Reconciled;
use crate::upload::UploadState;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_resolve(result: &ResolveResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_reconcile(result: &Reconciled) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_compress(result: &CompressionReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_capture(result: &CaptureResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_archive(result: &ArchiveResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_taxonomy(result: &TaxonomyResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr for interactive runs.
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        if let Err(err) = write_progress(&mut io::stderr(), &event) {
            tracing::debug!(error = %err, "progress line not written");
        }
    }
}

fn write_progress(out: &mut impl Write, event: &ProgressEvent) -> io::Result<()> {
    match event.elapsed {
        Some(elapsed) => writeln!(
            out,
            "{CYAN}{}{RESET} ({:.1}s)",
            event.message,
            elapsed.as_secs_f64()
        ),
        None => writeln!(out, "{CYAN}{}{RESET}", event.message),
    }
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

pub fn print_resolve_summary(result: &ResolveResult) {
    let info = &result.dataset;
    if !info.is_found() {
        println!(
            "{YELLOW}{} not found in {}{RESET}",
            info.dataset_name, result.source_directory
        );
        return;
    }
    println!(
        "{GREEN}{} -> {} ({}){RESET}",
        info.dataset_name, info.file_or_directory_name, info.dataset_type
    );
    for file in &info.files {
        println!("   {file}");
    }
    for file in &info.related_files {
        println!("{CYAN}   + {file}{RESET}");
    }
}

pub fn print_reconcile_summary(result: &Reconciled) {
    let color = if result.changed { GREEN } else { YELLOW };
    println!(
        "{color}source path: {}\ncapture sub-path: {}\nchanged: {}{RESET}",
        result.source_path, result.capture_sub_path, result.changed
    );
}

pub fn print_compress_summary(report: &CompressionReport) {
    if report.is_empty() {
        println!("{YELLOW}no duplicate method directories{RESET}");
        return;
    }
    for item in &report.compressed {
        println!(
            "{GREEN}{} -> {} ({} files, same as {}){RESET}",
            item.directory, item.zip, item.files, item.baseline
        );
    }
}

pub fn print_capture_summary(result: &CaptureResult) {
    println!(
        "{CYAN}{} ({}) {}{RESET}",
        result.dataset, result.dataset_type, result.action
    );
    println!("   source: {}", result.source_directory);
    println!("   storage: {}", result.storage_directory);
    for warning in &result.warnings {
        println!("{YELLOW}   warning: {warning}{RESET}");
    }
}

pub fn print_archive_summary(result: &ArchiveResult) {
    let upload = &result.upload;
    let color = match upload.state {
        UploadState::Succeeded => GREEN,
        UploadState::FailedRetryable | UploadState::Cancelled => YELLOW,
        _ => RED,
    };
    println!(
        "{color}{} upload {:?} after {} attempt(s){RESET}",
        result.dataset, upload.state, upload.attempts
    );
    if upload.is_success() {
        println!(
            "   new files: {}, updated: {}, bytes: {}",
            upload.new_files, upload.updated_files, upload.bytes
        );
        if !upload.acknowledged {
            println!("{YELLOW}   completion was not acknowledged{RESET}");
        }
    }
    for item in &result.compression.compressed {
        println!("   compressed {} -> {}", item.directory, item.zip);
    }
    if let Some(warning) = &result.compression_warning {
        println!("{YELLOW}   compression skipped: {warning}{RESET}");
    }
    for subdirectory in &upload.follow_up_tasks {
        println!("{CYAN}   queued follow-up for {subdirectory}{RESET}");
    }
    for failure in &upload.follow_up_failures {
        println!("{RED}   follow-up not queued: {failure}{RESET}");
    }
    if let Some(message) = &upload.message {
        if !upload.is_success() {
            println!("{color}   {message}{RESET}");
        }
    }
    if let Some(hint) = &upload.hint {
        println!("{YELLOW}   hint: {hint}{RESET}");
    }
}

pub fn print_taxonomy_summary(result: &TaxonomyResult) {
    for entry in &result.instrument_classes {
        println!(
            "{:<24} {CYAN}{}{RESET}",
            entry.instrument_class, entry.default_raw_data_type
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn progress_line_includes_elapsed_seconds() {
        let mut out = Vec::new();
        let event = ProgressEvent {
            message: "phase=Store; copying 2 item(s)".to_string(),
            elapsed: Some(Duration::from_millis(1500)),
        };
        write_progress(&mut out, &event).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert!(line.contains("phase=Store; copying 2 item(s)"));
        assert!(line.ends_with("(1.5s)\n"));
    }

    #[test]
    fn progress_write_failure_is_reported() {
        let event = ProgressEvent {
            message: "phase=Done; captured".to_string(),
            elapsed: None,
        };
        let err = write_progress(&mut ClosedPipe, &event).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
