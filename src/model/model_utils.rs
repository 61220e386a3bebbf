use async_trait::async_trait;
use ndarray::Array2;
use std::path::{Path, PathBuf};

const DEFAULT_MODEL_PATH: &str = "model-files/nyc_taxi_meta_model.onnx";

pub fn default_model_path() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_PATH)
}

pub enum Backend {
    ONNX,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ModelInputDType {
    F32,
    F64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ModelOutputDType {
    F16,
    F32,
    F64,
}

#[async_trait]
pub trait ModelTrait {
    async fn load_model(&mut self, model_path: &Path) -> anyhow::Result<()>;

    /// Width of the input row as declared by the loaded artifact. `None` when
    /// the artifact leaves that dimension dynamic.
    fn input_width(&self) -> Option<usize>;

    /// Runs the regressor on a `[rows, features]` matrix and returns the first
    /// predicted value.
    async fn predict(&self, features: Array2<f64>) -> anyhow::Result<f64>;
}

pub trait Regressor: ModelTrait + Send + Sync {}
impl<T> Regressor for T where T: ModelTrait + Send + Sync {}
