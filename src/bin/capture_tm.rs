use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use capture_task_manager::app::{App, CaptureOptions, taxonomy};
use capture_task_manager::archive::{
    HttpArchiveUploader, HttpTaskQueue, JsonlTaskQueue, LocalBundleUploader,
};
use capture_task_manager::config::{ConfigLoader, ManagerConfig};
use capture_task_manager::domain::TaskDescriptor;
use capture_task_manager::error::CaptureError;
use capture_task_manager::output::{self, ConsoleProgress, JsonOutput, OutputMode};
use capture_task_manager::share_path::reconcile;
use capture_task_manager::taxonomy::InstrumentClass;
use capture_task_manager::upload::{
    ArchiveUploader, AttemptReport, TaskQueue, UploadMode, UploadRequest,
};

#[derive(Parser)]
#[command(name = "capture-tm")]
#[command(about = "Locate instrument datasets, capture them into storage and push them to the archive")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Find a dataset in an instrument source directory")]
    Resolve(ResolveArgs),
    #[command(about = "Rewrite a capture sub-path that climbs out of the source path")]
    Reconcile(ReconcileArgs),
    #[command(about = "Zip duplicate method directories in a dataset")]
    Compress(CompressArgs),
    #[command(about = "Copy a dataset from the instrument into storage")]
    Capture(CaptureArgs),
    #[command(about = "Upload a stored dataset to the archive")]
    Archive(ArchiveArgs),
    #[command(about = "List instrument classes and raw data types")]
    Taxonomy,
}

#[derive(Args)]
struct ResolveArgs {
    source_dir: Utf8PathBuf,
    dataset: String,

    #[arg(long)]
    files_first: bool,

    #[arg(long)]
    instrument_class: Option<String>,
}

#[derive(Args)]
struct ReconcileArgs {
    share_root: String,
    source_path: String,
    capture_sub_path: String,
}

#[derive(Args)]
struct CompressArgs {
    dataset_dir: Utf8PathBuf,
}

#[derive(Args)]
struct CaptureArgs {
    #[arg(long)]
    task: PathBuf,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct ArchiveArgs {
    #[arg(long)]
    task: PathBuf,

    #[arg(long)]
    subdirectory: Option<String>,

    #[arg(long)]
    max_attempts: Option<u32>,

    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CaptureError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CaptureError) -> u8 {
    match error {
        CaptureError::SourceDirectoryNotFound(_)
        | CaptureError::DatasetNotFound { .. }
        | CaptureError::StorageDirectoryNotFound(_) => 2,
        CaptureError::ArchiveHttp(_)
        | CaptureError::UploadRetryable(_)
        | CaptureError::Cancelled => 3,
        CaptureError::ArchiveStatus { .. } if error.is_recoverable() => 3,
        CaptureError::ArchiveStatus { .. } | CaptureError::UploadFatal { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Resolve(args) => run_resolve(args, config, output_mode),
        Commands::Reconcile(args) => {
            let result = reconcile(&args.share_root, &args.source_path, &args.capture_sub_path);
            match output_mode {
                OutputMode::NonInteractive => {
                    JsonOutput::print_reconcile(&result).into_diagnostic()?
                }
                OutputMode::Interactive => output::print_reconcile_summary(&result),
            }
            Ok(())
        }
        Commands::Compress(args) => {
            let app = App::new(config, NopUploader, NopQueue);
            let result = match output_mode {
                OutputMode::NonInteractive => app.compress(&args.dataset_dir, &JsonOutput)?,
                OutputMode::Interactive => app.compress(&args.dataset_dir, &ConsoleProgress)?,
            };
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_compress(&result).into_diagnostic()?,
                OutputMode::Interactive => output::print_compress_summary(&result),
            }
            Ok(())
        }
        Commands::Capture(args) => run_capture(args, config, output_mode),
        Commands::Archive(args) => run_archive(args, config, output_mode),
        Commands::Taxonomy => {
            let result = taxonomy();
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_taxonomy(&result).into_diagnostic()?,
                OutputMode::Interactive => output::print_taxonomy_summary(&result),
            }
            Ok(())
        }
    }
}

fn run_resolve(
    args: ResolveArgs,
    config: ManagerConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let instrument_class = args
        .instrument_class
        .as_deref()
        .map(InstrumentClass::classify)
        .unwrap_or_default();
    let app = App::new(config, NopUploader, NopQueue);
    let result = match output_mode {
        OutputMode::NonInteractive => {
            let result = app.resolve(
                &args.source_dir,
                &args.dataset,
                args.files_first,
                instrument_class,
                &JsonOutput,
            )?;
            JsonOutput::print_resolve(&result).into_diagnostic()?;
            result
        }
        OutputMode::Interactive => {
            let result = app.resolve(
                &args.source_dir,
                &args.dataset,
                args.files_first,
                instrument_class,
                &ConsoleProgress,
            )?;
            output::print_resolve_summary(&result);
            result
        }
    };
    if !result.dataset.is_found() {
        return Err(CaptureError::DatasetNotFound {
            dataset: args.dataset,
            directory: args.source_dir.to_string(),
        }
        .into());
    }
    Ok(())
}

fn run_capture(
    args: CaptureArgs,
    config: ManagerConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let task = TaskDescriptor::from_json_file(&args.task)?;
    let options = CaptureOptions {
        force: args.force,
        dry_run: args.dry_run,
    };
    let app = App::new(config, NopUploader, NopQueue);
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.capture(&task, options, &JsonOutput)?;
            JsonOutput::print_capture(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.capture(&task, options, &ConsoleProgress)?;
            output::print_capture_summary(&result);
        }
    }
    Ok(())
}

fn run_archive(
    args: ArchiveArgs,
    mut config: ManagerConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let task = TaskDescriptor::from_json_file(&args.task)?;
    if let Some(max_attempts) = args.max_attempts {
        config.upload.max_attempts = max_attempts.max(1);
    }
    if args.debug {
        config.upload.mode = UploadMode::Debug;
    }

    let uploader: Box<dyn ArchiveUploader> = match config.upload.mode {
        UploadMode::Debug => Box::new(LocalBundleUploader::new(
            config.staging_dir.clone(),
            config.limits,
        )),
        UploadMode::Normal => Box::new(HttpArchiveUploader::new(
            &config.archive_base_url,
            config.archive_timeout,
            config.limits,
        )?),
    };
    let queue: Box<dyn TaskQueue> = match &config.follow_up_queue {
        Some(path) => Box::new(JsonlTaskQueue::new(path.clone())),
        None => Box::new(HttpTaskQueue::new(
            &config.archive_base_url,
            config.archive_timeout,
        )?),
    };

    let app = App::new(config, uploader, queue);
    let result = match output_mode {
        OutputMode::NonInteractive => {
            let result = app.archive(&task, args.subdirectory.as_deref(), &JsonOutput)?;
            JsonOutput::print_archive(&result).into_diagnostic()?;
            result
        }
        OutputMode::Interactive => {
            let result = app.archive(&task, args.subdirectory.as_deref(), &ConsoleProgress)?;
            output::print_archive_summary(&result);
            result
        }
    };
    result.upload.into_result()?;
    Ok(())
}

struct NopUploader;
struct NopQueue;

impl ArchiveUploader for NopUploader {
    fn upload(&self, _request: &UploadRequest) -> AttemptReport {
        AttemptReport::fatal("archive uploader not configured", None)
    }
}

impl TaskQueue for NopQueue {
    fn enqueue_follow_up(&self, _dataset: &str, _subdirectory: &str) -> Result<(), CaptureError> {
        Err(CaptureError::TaskQueue(
            "task queue not configured".to_string(),
        ))
    }
}
