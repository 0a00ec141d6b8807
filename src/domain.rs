use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CaptureError;
use crate::taxonomy::{InstrumentClass, RawDataType};

/// Job parameters handed out by the task broker. Field names follow the
/// broker's column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    #[serde(rename = "Job", default)]
    pub job: u64,
    #[serde(rename = "Dataset")]
    pub dataset: String,
    #[serde(rename = "Dataset_ID", default)]
    pub dataset_id: u64,
    #[serde(rename = "Step_Tool", default)]
    pub step_tool: Option<String>,
    #[serde(rename = "Storage_Vol", default)]
    pub storage_vol: String,
    #[serde(rename = "Storage_Vol_External", default)]
    pub storage_vol_external: Option<String>,
    #[serde(rename = "Storage_Path", default)]
    pub storage_path: String,
    #[serde(rename = "Directory", alias = "Folder", default)]
    pub directory: String,
    #[serde(rename = "Source_Vol", default)]
    pub source_vol: String,
    #[serde(rename = "Source_Path", default)]
    pub source_path: String,
    #[serde(
        rename = "Capture_Subfolder",
        alias = "Capture_Subdirectory",
        default
    )]
    pub capture_subdirectory: Option<String>,
    #[serde(rename = "Instrument_Class", default)]
    pub instrument_class: InstrumentClass,
    #[serde(rename = "RawDataType", default)]
    pub raw_data_type: RawDataType,
}

impl TaskDescriptor {
    pub fn from_json_file(path: &Path) -> Result<Self, CaptureError> {
        let content = fs::read_to_string(path)
            .map_err(|err| CaptureError::InvalidTask(format!("{}: {err}", path.display())))?;
        let task: TaskDescriptor = serde_json::from_str(&content)
            .map_err(|err| CaptureError::InvalidTask(err.to_string()))?;
        task.validate()?;
        Ok(task)
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        let dataset = self.dataset.trim();
        if dataset.is_empty() {
            return Err(CaptureError::InvalidTask("dataset name is empty".to_string()));
        }
        if dataset.contains(['/', '\\']) {
            return Err(CaptureError::InvalidTask(format!(
                "dataset name contains a path separator: {dataset}"
            )));
        }
        Ok(())
    }

    /// The task's raw data type, or the instrument class default when the
    /// broker sent something unrecognized.
    pub fn effective_raw_data_type(&self) -> RawDataType {
        match self.raw_data_type {
            RawDataType::Unknown => self.instrument_class.default_raw_data_type(),
            known => known,
        }
    }

    pub fn capture_subdirectory(&self) -> Option<&str> {
        self.capture_subdirectory
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetType {
    None,
    File,
    MultiFile,
    DirectoryNoExt,
    DirectoryExt,
    BrukerImaging,
    BrukerSpot,
}

impl DatasetType {
    pub fn is_directory(self) -> bool {
        matches!(
            self,
            DatasetType::DirectoryNoExt
                | DatasetType::DirectoryExt
                | DatasetType::BrukerImaging
                | DatasetType::BrukerSpot
        )
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DatasetType::None => "none",
            DatasetType::File => "file",
            DatasetType::MultiFile => "multi-file",
            DatasetType::DirectoryNoExt => "directory",
            DatasetType::DirectoryExt => "directory-with-extension",
            DatasetType::BrukerImaging => "bruker-imaging",
            DatasetType::BrukerSpot => "bruker-spot",
        };
        write!(f, "{label}")
    }
}

/// What the resolver found for one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetInfo {
    pub dataset_name: String,
    pub dataset_type: DatasetType,
    /// Matched file or directory name; the dataset name itself for `MultiFile`.
    pub file_or_directory_name: String,
    /// Matched files in enumeration order.
    pub files: Vec<String>,
    pub related_files: Vec<String>,
}

impl DatasetInfo {
    pub fn not_found(dataset_name: &str) -> Self {
        Self {
            dataset_name: dataset_name.to_string(),
            dataset_type: DatasetType::None,
            file_or_directory_name: String::new(),
            files: Vec::new(),
            related_files: Vec::new(),
        }
    }

    pub fn is_found(&self) -> bool {
        self.dataset_type != DatasetType::None
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_task_with_broker_field_names() {
        let json = r#"{
            "Job": 6012345,
            "Dataset": "QC_Mam_19_01_a",
            "Dataset_ID": 987654,
            "Storage_Vol": "/srv/proto-7/",
            "Storage_Path": "QExactHF03/2024_1/",
            "Folder": "QC_Mam_19_01_a",
            "Source_Vol": "/mnt/QEHF03/",
            "Source_Path": "ProteomicsData/",
            "Instrument_Class": "qexactive",
            "RawDataType": "dot_raw_files"
        }"#;
        let task: TaskDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(task.directory, "QC_Mam_19_01_a");
        assert_eq!(task.instrument_class, InstrumentClass::QExactive);
        assert_eq!(task.raw_data_type, RawDataType::ThermoRawFile);
        assert_eq!(task.capture_subdirectory(), None);
    }

    #[test]
    fn unknown_raw_type_falls_back_to_instrument_default() {
        let json = r#"{
            "Dataset": "Bruker_run",
            "Instrument_Class": "BrukerTOF_TDF",
            "RawDataType": "something_new"
        }"#;
        let task: TaskDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(task.raw_data_type, RawDataType::Unknown);
        assert_eq!(task.effective_raw_data_type(), RawDataType::BrukerTofTdf);
    }

    #[test]
    fn empty_dataset_name_is_invalid() {
        let json = r#"{ "Dataset": "  " }"#;
        let task: TaskDescriptor = serde_json::from_str(json).unwrap();
        assert_matches!(task.validate(), Err(CaptureError::InvalidTask(_)));
    }
}
