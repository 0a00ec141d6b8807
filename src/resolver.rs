//! Locates a dataset inside an instrument source directory.
//!
//! Four passes run in a fixed order (exact files, normalized files, exact
//! directories, normalized directories, or the directory passes first) and the
//! first pass that matches anything wins. Only the top level of the source
//! directory is examined. Every pass takes a fresh directory listing.

use std::fs;

use camino::Utf8Path;
use regex::RegexBuilder;
use tracing::{debug, info, warn};

use crate::domain::{DatasetInfo, DatasetType};
use crate::error::CaptureError;
use crate::normalizer::{Substitutions, normalize_base, split_extension};
use crate::taxonomy::{DatasetForm, InstrumentClass, RawDataType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub info: DatasetInfo,
    pub matched_directory: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPass {
    ExactFiles,
    NormalizedFiles,
    ExactDirectories,
    NormalizedDirectories,
}

impl SearchPass {
    pub fn order(search_files_first: bool) -> [SearchPass; 4] {
        if search_files_first {
            [
                SearchPass::ExactFiles,
                SearchPass::NormalizedFiles,
                SearchPass::ExactDirectories,
                SearchPass::NormalizedDirectories,
            ]
        } else {
            [
                SearchPass::ExactDirectories,
                SearchPass::NormalizedDirectories,
                SearchPass::ExactFiles,
                SearchPass::NormalizedFiles,
            ]
        }
    }

    fn searches_files(self) -> bool {
        matches!(self, SearchPass::ExactFiles | SearchPass::NormalizedFiles)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatasetResolver {
    substitutions: Substitutions,
}

impl DatasetResolver {
    pub fn new(substitutions: Substitutions) -> Self {
        Self { substitutions }
    }

    pub fn source_directory_exists(source_directory: &Utf8Path) -> bool {
        source_directory.as_std_path().is_dir()
    }

    pub fn resolve(
        &self,
        source_directory: &Utf8Path,
        dataset_name: &str,
        search_files_first: bool,
    ) -> Result<Resolution, CaptureError> {
        if !Self::source_directory_exists(source_directory) {
            warn!(directory = %source_directory, "source directory not found");
            return Ok(Resolution {
                info: DatasetInfo::not_found(dataset_name),
                matched_directory: false,
            });
        }

        for pass in SearchPass::order(search_files_first) {
            let matches = self.run_pass(pass, source_directory, dataset_name)?;
            debug!(?pass, dataset = dataset_name, matches = matches.len(), "search pass");
            if matches.is_empty() {
                continue;
            }

            let resolution = if pass.searches_files() {
                self.file_resolution(source_directory, dataset_name, matches)?
            } else {
                directory_resolution(dataset_name, &matches[0])
            };
            info!(
                dataset = dataset_name,
                dataset_type = %resolution.info.dataset_type,
                name = %resolution.info.file_or_directory_name,
                "dataset located"
            );
            return Ok(resolution);
        }

        debug!(dataset = dataset_name, directory = %source_directory, "dataset not found");
        Ok(Resolution {
            info: DatasetInfo::not_found(dataset_name),
            matched_directory: false,
        })
    }

    /// Resolves, then lets the instrument class override the classification of
    /// directory matches for Bruker MALDI imaging and spot instruments.
    pub fn resolve_for_instrument(
        &self,
        source_directory: &Utf8Path,
        dataset_name: &str,
        search_files_first: bool,
        instrument_class: InstrumentClass,
    ) -> Result<Resolution, CaptureError> {
        let mut resolution = self.resolve(source_directory, dataset_name, search_files_first)?;
        if resolution.matched_directory {
            if let Some(dataset_type) = directory_override(instrument_class) {
                debug!(
                    instrument_class = %instrument_class,
                    from = %resolution.info.dataset_type,
                    to = %dataset_type,
                    "instrument class overrides directory classification"
                );
                resolution.info.dataset_type = dataset_type;
            }
        }
        Ok(resolution)
    }

    fn run_pass(
        &self,
        pass: SearchPass,
        source_directory: &Utf8Path,
        dataset_name: &str,
    ) -> Result<Vec<String>, CaptureError> {
        let listing = list_top_level(source_directory)?;
        let matches = match pass {
            SearchPass::ExactFiles => listing
                .files
                .into_iter()
                .filter(|name| matches_dataset_glob(name, dataset_name))
                .collect(),
            SearchPass::NormalizedFiles => listing
                .files
                .into_iter()
                .filter(|name| self.normalized_stem_matches(name, dataset_name))
                .collect(),
            SearchPass::ExactDirectories => {
                let exact = listing
                    .directories
                    .iter()
                    .find(|name| name.eq_ignore_ascii_case(dataset_name))
                    .or_else(|| {
                        listing
                            .directories
                            .iter()
                            .find(|name| matches_dataset_glob(name, dataset_name))
                    });
                exact.cloned().into_iter().collect()
            }
            SearchPass::NormalizedDirectories => listing
                .directories
                .into_iter()
                .filter(|name| {
                    normalize_base(name, &self.substitutions).eq_ignore_ascii_case(dataset_name)
                        || self.normalized_stem_matches(name, dataset_name)
                })
                .take(1)
                .collect(),
        };
        Ok(matches)
    }

    fn normalized_stem_matches(&self, name: &str, dataset_name: &str) -> bool {
        let (stem, _) = split_extension(name);
        normalize_base(stem, &self.substitutions).eq_ignore_ascii_case(dataset_name)
    }

    fn file_resolution(
        &self,
        source_directory: &Utf8Path,
        dataset_name: &str,
        matches: Vec<String>,
    ) -> Result<Resolution, CaptureError> {
        if matches.len() > 1 {
            debug!(
                dataset = dataset_name,
                count = matches.len(),
                "multiple files match the dataset"
            );
            return Ok(Resolution {
                info: DatasetInfo {
                    dataset_name: dataset_name.to_string(),
                    dataset_type: DatasetType::MultiFile,
                    file_or_directory_name: dataset_name.to_string(),
                    files: matches,
                    related_files: Vec::new(),
                },
                matched_directory: false,
            });
        }

        let file_name = matches[0].clone();
        let related_files = find_realtime_search_files(source_directory, &file_name)?;
        if related_files.is_empty() {
            debug!(file = %file_name, "no realtime search files found");
        } else {
            info!(
                file = %file_name,
                count = related_files.len(),
                "found realtime search files"
            );
        }
        Ok(Resolution {
            info: DatasetInfo {
                dataset_name: dataset_name.to_string(),
                dataset_type: DatasetType::File,
                file_or_directory_name: file_name,
                files: matches,
                related_files,
            },
            matched_directory: false,
        })
    }
}

fn directory_resolution(dataset_name: &str, directory_name: &str) -> Resolution {
    let (_, extension) = split_extension(directory_name);
    let dataset_type = if extension.is_some() {
        DatasetType::DirectoryExt
    } else {
        DatasetType::DirectoryNoExt
    };
    Resolution {
        info: DatasetInfo {
            dataset_name: dataset_name.to_string(),
            dataset_type,
            file_or_directory_name: directory_name.to_string(),
            files: Vec::new(),
            related_files: Vec::new(),
        },
        matched_directory: true,
    }
}

/// Only these two instrument classes change how a matched directory is
/// classified.
fn directory_override(instrument_class: InstrumentClass) -> Option<DatasetType> {
    match instrument_class {
        InstrumentClass::BrukerMaldiImaging => Some(DatasetType::BrukerImaging),
        InstrumentClass::BrukerMaldiSpot => Some(DatasetType::BrukerSpot),
        _ => None,
    }
}

/// Case-insensitive equivalent of the `<dataset>.*` glob. Like the Windows
/// glob it also accepts the bare name.
fn matches_dataset_glob(name: &str, dataset_name: &str) -> bool {
    if name.eq_ignore_ascii_case(dataset_name) {
        return true;
    }
    name.len() > dataset_name.len()
        && name.is_char_boundary(dataset_name.len())
        && name[..dataset_name.len()].eq_ignore_ascii_case(dataset_name)
        && name[dataset_name.len()..].starts_with('.')
}

struct TopLevelListing {
    files: Vec<String>,
    directories: Vec<String>,
}

fn list_top_level(directory: &Utf8Path) -> Result<TopLevelListing, CaptureError> {
    let entries = fs::read_dir(directory.as_std_path())
        .map_err(|err| CaptureError::Filesystem(format!("list {directory}: {err}")))?;
    let mut listing = TopLevelListing {
        files: Vec::new(),
        directories: Vec::new(),
    };
    for entry in entries {
        let entry = entry.map_err(|err| CaptureError::Filesystem(err.to_string()))?;
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            debug!(path = %path.display(), "skipping non-UTF-8 entry");
            continue;
        };
        if path.is_dir() {
            listing.directories.push(name);
        } else {
            listing.files.push(name);
        }
    }
    Ok(listing)
}

fn find_realtime_search_files(
    source_directory: &Utf8Path,
    file_name: &str,
) -> Result<Vec<String>, CaptureError> {
    let (stem, _) = split_extension(file_name);
    let pattern = format!(
        r"^{}_.*_realtime(lib)?search\.tsv$",
        regex::escape(stem)
    );
    let sidecar = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|err| CaptureError::Filesystem(err.to_string()))?;
    let listing = list_top_level(source_directory)?;
    Ok(listing
        .files
        .into_iter()
        .filter(|name| sidecar.is_match(name))
        .collect())
}

/// Differences between what was found and what the raw data type predicts.
/// Purely advisory; callers log them.
pub fn layout_warnings(
    info: &DatasetInfo,
    source_directory: &Utf8Path,
    raw_data_type: RawDataType,
) -> Vec<String> {
    let Some(layout) = raw_data_type.layout() else {
        return Vec::new();
    };
    if !info.is_found() {
        return Vec::new();
    }

    let mut warnings = Vec::new();
    let found_directory = info.dataset_type.is_directory();
    match (layout.form, found_directory) {
        (DatasetForm::File, true) => warnings.push(format!(
            "raw data type {raw_data_type} expects a file but found directory {}",
            info.file_or_directory_name
        )),
        (DatasetForm::Directory, false) => warnings.push(format!(
            "raw data type {raw_data_type} expects a directory but found {} file(s)",
            info.files.len()
        )),
        _ => {}
    }

    if let Some(expected) = layout.extension {
        let names: Vec<&str> = if found_directory {
            vec![info.file_or_directory_name.as_str()]
        } else {
            info.files.iter().map(String::as_str).collect()
        };
        for name in names {
            let actual = split_extension(name).1.unwrap_or("");
            if !actual.eq_ignore_ascii_case(expected) {
                warnings.push(format!(
                    "{name} does not have the {expected} extension expected for {raw_data_type}"
                ));
            }
        }
    }

    if let (Some(marker), true) = (layout.marker_file, found_directory) {
        let marker_path = source_directory
            .join(&info.file_or_directory_name)
            .join(marker);
        if !marker_path.as_std_path().exists() {
            warnings.push(format!(
                "{} is missing {marker}",
                info.file_or_directory_name
            ));
        }
    }

    warnings
}
