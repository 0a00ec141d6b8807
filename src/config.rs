use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CaptureError;
use crate::normalizer::Substitutions;
use crate::upload::{LARGE_DATASET_THRESHOLD_GB, UploadLimits, UploadMode, UploadSettings};

pub const CONFIG_FILE_NAME: &str = "capture-tm.json";
pub const DEFAULT_ARCHIVE_URL: &str = "http://127.0.0.1:8080/archive";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub upload: UploadSection,
    #[serde(default)]
    pub archive: ArchiveSection,
    #[serde(default)]
    pub staging_dir: Option<String>,
    #[serde(default)]
    pub follow_up_queue: Option<String>,
    #[serde(default)]
    pub substitutions: Option<Substitutions>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UploadSection {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub retry_delay_secs: Option<u64>,
    #[serde(default)]
    pub max_file_count: Option<usize>,
    #[serde(default)]
    pub large_dataset_threshold_gb: Option<u64>,
    #[serde(default)]
    pub mode: Option<UploadMode>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ArchiveSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub schema_version: u32,
    pub upload: UploadSettings,
    pub limits: UploadLimits,
    pub archive_base_url: String,
    pub archive_timeout: Duration,
    pub staging_dir: Utf8PathBuf,
    /// Follow-up tasks go to this JSON-lines file instead of the archive's task endpoint.
    pub follow_up_queue: Option<Utf8PathBuf>,
    pub substitutions: Substitutions,
    /// File the values were read from; `None` for built-in defaults.
    pub source: Option<PathBuf>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            upload: UploadSettings::default(),
            limits: UploadLimits::default(),
            archive_base_url: DEFAULT_ARCHIVE_URL.to_string(),
            archive_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            staging_dir: default_staging_dir(),
            follow_up_queue: None,
            substitutions: Substitutions::default(),
            source: None,
        }
    }
}

fn default_staging_dir() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(std::env::temp_dir().join("capture-tm"))
        .unwrap_or_else(|_| Utf8PathBuf::from("capture-tm-staging"))
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Uses `path` when given; otherwise the first of `./capture-tm.json` and
    /// the user config directory that exists; otherwise defaults.
    pub fn resolve(path: Option<&str>) -> Result<ManagerConfig, CaptureError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::candidates().into_iter().find(|candidate| candidate.is_file()),
        };

        let Some(config_path) = config_path else {
            debug!("no config file found; using defaults");
            return Ok(ManagerConfig::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CaptureError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CaptureError::ConfigParse(err.to_string()))?;
        debug!(path = %config_path.display(), "loaded config");

        let mut resolved = Self::resolve_config(config)?;
        resolved.source = Some(config_path);
        Ok(resolved)
    }

    pub fn candidates() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dirs) = ProjectDirs::from("", "", "capture-tm") {
            candidates.push(dirs.config_dir().join("config.json"));
        }
        candidates
    }

    pub fn resolve_config(config: Config) -> Result<ManagerConfig, CaptureError> {
        let defaults = ManagerConfig::default();

        let max_attempts = config
            .upload
            .max_attempts
            .unwrap_or(defaults.upload.max_attempts);
        if max_attempts == 0 {
            return Err(CaptureError::ConfigParse(
                "upload.max_attempts must be at least 1".to_string(),
            ));
        }

        let archive_base_url = config
            .archive
            .base_url
            .unwrap_or(defaults.archive_base_url);
        if archive_base_url.trim().is_empty() {
            return Err(CaptureError::ConfigParse(
                "archive.base_url must not be empty".to_string(),
            ));
        }

        let threshold_gb = config
            .upload
            .large_dataset_threshold_gb
            .unwrap_or(LARGE_DATASET_THRESHOLD_GB);

        Ok(ManagerConfig {
            schema_version: config.schema_version.unwrap_or(1),
            upload: UploadSettings {
                max_attempts,
                retry_delay: config
                    .upload
                    .retry_delay_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.upload.retry_delay),
                mode: config.upload.mode.unwrap_or(defaults.upload.mode),
            },
            limits: UploadLimits {
                max_file_count: config
                    .upload
                    .max_file_count
                    .unwrap_or(defaults.limits.max_file_count),
                large_dataset_threshold_bytes: threshold_gb.saturating_mul(1024 * 1024 * 1024),
            },
            archive_base_url,
            archive_timeout: config
                .archive
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.archive_timeout),
            staging_dir: config
                .staging_dir
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.staging_dir),
            follow_up_queue: config.follow_up_queue.map(Utf8PathBuf::from),
            substitutions: config.substitutions.unwrap_or_default(),
            source: None,
        })
    }
}
