//! Instrument classes and raw data types as reported by the task broker.
//!
//! Both enumerations are parsed permissively: upstream data entry is not
//! reliable, so any text that does not name a known value maps to `Unknown`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InstrumentClass {
    #[default]
    Unknown,
    AgilentIonTrap,
    AgilentTof,
    AgilentTofV2,
    BrukerAmazonIonTrap,
    BrukerFtBaf,
    BrukerFtms,
    BrukerMaldiImaging,
    BrukerMaldiImagingV2,
    BrukerMaldiSpot,
    BrukerTofBaf,
    BrukerTofTdf,
    DataFolders,
    FinniganIonTrap,
    GcQExactive,
    Illumina,
    ImsAgilentTofUimf,
    ImsAgilentTofDotD,
    LcmsNetLc,
    LtqFt,
    Orbitrap,
    QExactive,
    SciexQTrap,
    SciexTripleTof,
    ShimadzuGc,
    ThermoExactive,
    ThermoSiiLc,
    TripleQuad,
    WatersAcquityLc,
    WatersIms,
    WatersTof,
}

impl InstrumentClass {
    /// Every defined class except `Unknown`.
    pub const ALL: [InstrumentClass; 30] = [
        InstrumentClass::AgilentIonTrap,
        InstrumentClass::AgilentTof,
        InstrumentClass::AgilentTofV2,
        InstrumentClass::BrukerAmazonIonTrap,
        InstrumentClass::BrukerFtBaf,
        InstrumentClass::BrukerFtms,
        InstrumentClass::BrukerMaldiImaging,
        InstrumentClass::BrukerMaldiImagingV2,
        InstrumentClass::BrukerMaldiSpot,
        InstrumentClass::BrukerTofBaf,
        InstrumentClass::BrukerTofTdf,
        InstrumentClass::DataFolders,
        InstrumentClass::FinniganIonTrap,
        InstrumentClass::GcQExactive,
        InstrumentClass::Illumina,
        InstrumentClass::ImsAgilentTofUimf,
        InstrumentClass::ImsAgilentTofDotD,
        InstrumentClass::LcmsNetLc,
        InstrumentClass::LtqFt,
        InstrumentClass::Orbitrap,
        InstrumentClass::QExactive,
        InstrumentClass::SciexQTrap,
        InstrumentClass::SciexTripleTof,
        InstrumentClass::ShimadzuGc,
        InstrumentClass::ThermoExactive,
        InstrumentClass::ThermoSiiLc,
        InstrumentClass::TripleQuad,
        InstrumentClass::WatersAcquityLc,
        InstrumentClass::WatersIms,
        InstrumentClass::WatersTof,
    ];

    pub fn classify(name: &str) -> Self {
        let trimmed = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|class| class.name().eq_ignore_ascii_case(trimmed))
            .unwrap_or(InstrumentClass::Unknown)
    }

    pub fn name(self) -> &'static str {
        match self {
            InstrumentClass::Unknown => "Unknown",
            InstrumentClass::AgilentIonTrap => "Agilent_Ion_Trap",
            InstrumentClass::AgilentTof => "Agilent_TOF",
            InstrumentClass::AgilentTofV2 => "Agilent_TOF_V2",
            InstrumentClass::BrukerAmazonIonTrap => "Bruker_Amazon_Ion_Trap",
            InstrumentClass::BrukerFtBaf => "BrukerFT_BAF",
            InstrumentClass::BrukerFtms => "BrukerFTMS",
            InstrumentClass::BrukerMaldiImaging => "BrukerMALDI_Imaging",
            InstrumentClass::BrukerMaldiImagingV2 => "BrukerMALDI_Imaging_V2",
            InstrumentClass::BrukerMaldiSpot => "BrukerMALDI_Spot",
            InstrumentClass::BrukerTofBaf => "BrukerTOF_BAF",
            InstrumentClass::BrukerTofTdf => "BrukerTOF_TDF",
            InstrumentClass::DataFolders => "Data_Folders",
            InstrumentClass::FinniganIonTrap => "Finnigan_Ion_Trap",
            InstrumentClass::GcQExactive => "GC_QExactive",
            InstrumentClass::Illumina => "Illumina",
            InstrumentClass::ImsAgilentTofUimf => "IMS_Agilent_TOF_UIMF",
            InstrumentClass::ImsAgilentTofDotD => "IMS_Agilent_TOF_DotD",
            InstrumentClass::LcmsNetLc => "LCMSNet_LC",
            InstrumentClass::LtqFt => "LTQ_FT",
            InstrumentClass::Orbitrap => "Orbitrap",
            InstrumentClass::QExactive => "QExactive",
            InstrumentClass::SciexQTrap => "Sciex_QTrap",
            InstrumentClass::SciexTripleTof => "Sciex_TripleTOF",
            InstrumentClass::ShimadzuGc => "Shimadzu_GC",
            InstrumentClass::ThermoExactive => "Thermo_Exactive",
            InstrumentClass::ThermoSiiLc => "Thermo_SII_LC",
            InstrumentClass::TripleQuad => "Triple_Quad",
            InstrumentClass::WatersAcquityLc => "Waters_Acquity_LC",
            InstrumentClass::WatersIms => "Waters_IMS",
            InstrumentClass::WatersTof => "Waters_TOF",
        }
    }

    /// Raw data type an instrument of this class normally produces. Used when a
    /// task arrives without a usable raw data type.
    pub fn default_raw_data_type(self) -> RawDataType {
        match self {
            InstrumentClass::Unknown => RawDataType::Unknown,
            InstrumentClass::AgilentIonTrap
            | InstrumentClass::AgilentTof
            | InstrumentClass::AgilentTofV2
            | InstrumentClass::BrukerAmazonIonTrap
            | InstrumentClass::ImsAgilentTofDotD => RawDataType::AgilentDFolder,
            InstrumentClass::BrukerFtBaf
            | InstrumentClass::BrukerFtms
            | InstrumentClass::BrukerMaldiImagingV2 => RawDataType::BrukerFt,
            InstrumentClass::BrukerMaldiImaging => RawDataType::BrukerMaldiImaging,
            InstrumentClass::BrukerMaldiSpot => RawDataType::BrukerMaldiSpot,
            InstrumentClass::BrukerTofBaf => RawDataType::BrukerTofBaf,
            InstrumentClass::BrukerTofTdf => RawDataType::BrukerTofTdf,
            InstrumentClass::DataFolders | InstrumentClass::LcmsNetLc => {
                RawDataType::DataFolders
            }
            InstrumentClass::Illumina => RawDataType::IlluminaFolder,
            InstrumentClass::ImsAgilentTofUimf => RawDataType::UimfFile,
            InstrumentClass::FinniganIonTrap
            | InstrumentClass::GcQExactive
            | InstrumentClass::LtqFt
            | InstrumentClass::Orbitrap
            | InstrumentClass::QExactive
            | InstrumentClass::ThermoExactive
            | InstrumentClass::ThermoSiiLc
            | InstrumentClass::TripleQuad => RawDataType::ThermoRawFile,
            InstrumentClass::SciexQTrap | InstrumentClass::SciexTripleTof => {
                RawDataType::SciexWiffFiles
            }
            InstrumentClass::ShimadzuGc => RawDataType::ShimadzuQgdFile,
            InstrumentClass::WatersAcquityLc
            | InstrumentClass::WatersIms
            | InstrumentClass::WatersTof => RawDataType::WatersRawFolder,
        }
    }
}

impl fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<&str> for InstrumentClass {
    fn from(value: &str) -> Self {
        Self::classify(value)
    }
}

impl Serialize for InstrumentClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for InstrumentClass {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::classify(&value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RawDataType {
    #[default]
    Unknown,
    AgilentDFolder,
    BrukerFt,
    BrukerMaldiImaging,
    BrukerMaldiSpot,
    BrukerTofBaf,
    BrukerTofTdf,
    DataFolders,
    IlluminaFolder,
    MzMlFile,
    MzXmlFile,
    SciexWiffFiles,
    ShimadzuQgdFile,
    ThermoRawFile,
    UimfFile,
    WatersRawFolder,
    ZippedSFolders,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetForm {
    File,
    Directory,
}

/// What a dataset of a given raw data type looks like on the instrument share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetLayout {
    pub form: DatasetForm,
    /// Lowercase, including the leading dot.
    pub extension: Option<&'static str>,
    /// File that must exist directly inside a directory dataset.
    pub marker_file: Option<&'static str>,
}

impl RawDataType {
    /// Every defined raw data type except `Unknown`.
    pub const ALL: [RawDataType; 16] = [
        RawDataType::AgilentDFolder,
        RawDataType::BrukerFt,
        RawDataType::BrukerMaldiImaging,
        RawDataType::BrukerMaldiSpot,
        RawDataType::BrukerTofBaf,
        RawDataType::BrukerTofTdf,
        RawDataType::DataFolders,
        RawDataType::IlluminaFolder,
        RawDataType::MzMlFile,
        RawDataType::MzXmlFile,
        RawDataType::SciexWiffFiles,
        RawDataType::ShimadzuQgdFile,
        RawDataType::ThermoRawFile,
        RawDataType::UimfFile,
        RawDataType::WatersRawFolder,
        RawDataType::ZippedSFolders,
    ];

    pub fn classify(token: &str) -> Self {
        let trimmed = token.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.token().eq_ignore_ascii_case(trimmed))
            .unwrap_or(RawDataType::Unknown)
    }

    pub fn token(self) -> &'static str {
        match self {
            RawDataType::Unknown => "unknown",
            RawDataType::AgilentDFolder => "dot_d_folders",
            RawDataType::BrukerFt => "bruker_ft",
            RawDataType::BrukerMaldiImaging => "bruker_maldi_imaging",
            RawDataType::BrukerMaldiSpot => "bruker_maldi_spot",
            RawDataType::BrukerTofBaf => "bruker_tof_baf",
            RawDataType::BrukerTofTdf => "bruker_tof_tdf",
            RawDataType::DataFolders => "data_folders",
            RawDataType::IlluminaFolder => "illumina_folder",
            RawDataType::MzMlFile => "dot_mzml_files",
            RawDataType::MzXmlFile => "dot_mzxml_files",
            RawDataType::SciexWiffFiles => "sciex_wiff_files",
            RawDataType::ShimadzuQgdFile => "dot_qgd_files",
            RawDataType::ThermoRawFile => "dot_raw_files",
            RawDataType::UimfFile => "dot_uimf_files",
            RawDataType::WatersRawFolder => "dot_raw_folder",
            RawDataType::ZippedSFolders => "zipped_s_folders",
        }
    }

    pub fn layout(self) -> Option<DatasetLayout> {
        let (form, extension, marker_file) = match self {
            RawDataType::Unknown => return None,
            RawDataType::AgilentDFolder => (DatasetForm::Directory, Some(".d"), None),
            RawDataType::BrukerFt | RawDataType::BrukerTofBaf => {
                (DatasetForm::Directory, Some(".d"), Some("analysis.baf"))
            }
            RawDataType::BrukerTofTdf => {
                (DatasetForm::Directory, Some(".d"), Some("analysis.tdf"))
            }
            RawDataType::BrukerMaldiImaging
            | RawDataType::BrukerMaldiSpot
            | RawDataType::DataFolders
            | RawDataType::IlluminaFolder
            | RawDataType::ZippedSFolders => (DatasetForm::Directory, None, None),
            RawDataType::MzMlFile => (DatasetForm::File, Some(".mzml"), None),
            RawDataType::MzXmlFile => (DatasetForm::File, Some(".mzxml"), None),
            RawDataType::SciexWiffFiles => (DatasetForm::File, Some(".wiff"), None),
            RawDataType::ShimadzuQgdFile => (DatasetForm::File, Some(".qgd"), None),
            RawDataType::ThermoRawFile => (DatasetForm::File, Some(".raw"), None),
            RawDataType::UimfFile => (DatasetForm::File, Some(".uimf"), None),
            RawDataType::WatersRawFolder => (DatasetForm::Directory, Some(".raw"), None),
        };
        Some(DatasetLayout {
            form,
            extension,
            marker_file,
        })
    }

    /// Whether the resolver should try files before directories.
    pub fn searches_files_first(self) -> bool {
        self.layout()
            .map(|layout| layout.form == DatasetForm::File)
            .unwrap_or(true)
    }
}

impl fmt::Display for RawDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl From<&str> for RawDataType {
    fn from(value: &str) -> Self {
        Self::classify(value)
    }
}

impl Serialize for RawDataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for RawDataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::classify(&value))
    }
}
