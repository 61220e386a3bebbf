use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Number of columns in a single feature row.
pub const FEATURE_COUNT: usize = 8;

/// Column order the regressor was trained on.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "passenger_count",
    "trip_distance",
    "pickup_hour",
    "pickup_dow",
    "pickup_lat",
    "pickup_lng",
    "dropoff_lat",
    "dropoff_lng",
];

const MANIFEST_SUFFIX: &str = "features.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureKind {
    Integer,
    Real,
}

impl FeatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Integer => "integer",
            FeatureKind::Real => "real",
        }
    }
}

pub fn feature_kind(position: usize) -> FeatureKind {
    match position {
        0 | 2 | 3 => FeatureKind::Integer,
        _ => FeatureKind::Real,
    }
}

/// Sidecar file shipped next to a model artifact, listing the columns the
/// artifact expects in order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FeatureManifest {
    pub features: Vec<String>,
}

impl FeatureManifest {
    pub fn default() -> Self {
        FeatureManifest {
            features: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        let manifest: FeatureManifest = serde_json::from_reader(file)?;
        Ok(manifest)
    }

    pub fn matches_schema(&self) -> bool {
        self.features.len() == FEATURE_COUNT
            && self
                .features
                .iter()
                .zip(FEATURE_NAMES.iter())
                .all(|(found, expected)| found == expected)
    }
}

/// `model-files/fare.onnx` -> `model-files/fare.features.json`
pub fn manifest_path(model_path: &Path) -> PathBuf {
    model_path.with_extension(MANIFEST_SUFFIX)
}
