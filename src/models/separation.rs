use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Separation model family run by the external process.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, EnumIter, Display, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SeparationModel {
    #[default]
    Demucs,
    OpenUnmix,
}

impl SeparationModel {
    pub fn variants(self) -> &'static [&'static str] {
        match self {
            SeparationModel::Demucs => &["htdemucs", "htdemucs_ft", "mdx_extra"],
            SeparationModel::OpenUnmix => &["umxhq", "umx"],
        }
    }

    pub fn default_variant(self) -> &'static str {
        self.variants()[0]
    }

    pub fn supports_variant(self, variant: &str) -> bool {
        self.variants().contains(&variant)
    }
}

/// Compute device requested for the model.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, EnumString, EnumIter, Display, PartialEq, Eq,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Device {
    #[default]
    Auto,
    Cpu,
    Cuda,
}

/// Stems produced by both model families, in the order results report them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, EnumIter, Display, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Stem {
    Vocals,
    Drums,
    Bass,
    Other,
}

impl Stem {
    /// Resolve a stem from an artifact file name such as `drums.wav`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.rsplit_once('.').map_or(name, |(base, _)| base);
        stem.parse().ok()
    }

    pub fn file_name(self) -> String {
        format!("{self}.wav")
    }

    /// Map produced file names onto stem names in canonical order, dropping
    /// anything that is not a known stem.
    pub fn canonical_names<'a>(files: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let produced: Vec<Stem> = files.into_iter().filter_map(Stem::from_file_name).collect();
        Stem::iter()
            .filter(|stem| produced.contains(stem))
            .map(|stem| stem.to_string())
            .collect()
    }
}

/// Processing options chosen at submission and passed through to the
/// separation process.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobConfiguration {
    pub model: SeparationModel,
    pub device: Device,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_variant: Option<String>,
    #[serde(default)]
    pub verbose: bool,
}

/// Successful output of one separation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeparationResult {
    pub output_dir: PathBuf,
    pub model_used: String,
    pub processing_time_secs: f64,
    pub stems: Vec<String>,
}

impl SeparationResult {
    pub fn has_stem(&self, stem: Stem) -> bool {
        let name = stem.to_string();
        self.stems.iter().any(|s| *s == name)
    }
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub model: SeparationModel,
    pub variants: &'static [&'static str],
    pub default_variant: &'static str,
}

/// Catalog served by `GET /api/v1/models`.
#[derive(Debug, Serialize)]
pub struct ModelCatalog {
    pub models: Vec<ModelInfo>,
    pub devices: Vec<Device>,
    pub stems: Vec<Stem>,
}

impl ModelCatalog {
    pub fn current() -> Self {
        Self {
            models: SeparationModel::iter()
                .map(|model| ModelInfo {
                    model,
                    variants: model.variants(),
                    default_variant: model.default_variant(),
                })
                .collect(),
            devices: Device::iter().collect(),
            stems: Stem::iter().collect(),
        }
    }
}
