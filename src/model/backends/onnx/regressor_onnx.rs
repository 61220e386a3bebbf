use crate::model::model_utils::{ModelInputDType, ModelOutputDType, ModelTrait};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use half::f16;
use log::{debug, info};
use ndarray::Array2;
#[cfg(feature = "cuda")]
use ort::CUDAExecutionProvider;
use ort::{CPUExecutionProvider, GraphOptimizationLevel, Session};
use std::path::Path;
use std::thread::available_parallelism;
use std::time::Instant;

pub struct RegressorONNX {
    pub model: Option<Session>,
    input_dtype: Option<ModelInputDType>,
    output_dtype: Option<ModelOutputDType>,
    input_width: Option<usize>,
}

impl RegressorONNX {
    pub fn new() -> Self {
        Self {
            model: None,
            input_dtype: None,
            output_dtype: None,
            input_width: None,
        }
    }
}

fn init_environment() -> anyhow::Result<()> {
    #[allow(unused_mut)]
    let mut providers = vec![CPUExecutionProvider::default().build()];
    #[cfg(feature = "cuda")]
    providers.insert(0, CUDAExecutionProvider::default().build());

    ort::init()
        .with_name("taxifare")
        .with_execution_providers(providers)
        .commit()?;
    Ok(())
}

#[async_trait]
impl ModelTrait for RegressorONNX {
    async fn load_model(&mut self, model_path: &Path) -> anyhow::Result<()> {
        init_environment()?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(available_parallelism()?.get())?
            .commit_from_file(model_path)?;

        // determine input dtype and row width
        let input = session
            .inputs
            .first()
            .ok_or_else(|| anyhow!("model declares no inputs"))?;
        let input_dtype = input
            .input_type
            .tensor_type()
            .ok_or_else(|| anyhow!("model input '{}' is not a tensor", input.name))?
            .to_string();
        self.input_dtype = match input_dtype.as_str() {
            "f32" => Some(ModelInputDType::F32),
            "f64" => Some(ModelInputDType::F64),
            other => bail!("unsupported input dtype {other} for '{}'", input.name),
        };
        self.input_width = input
            .input_type
            .tensor_dimensions()
            .and_then(|dims| dims.last().copied())
            .and_then(|dim| usize::try_from(dim).ok())
            .filter(|&dim| dim > 0);

        // determine output dtype
        let output = session
            .outputs
            .first()
            .ok_or_else(|| anyhow!("model declares no outputs"))?;
        let output_dtype = output
            .output_type
            .tensor_type()
            .ok_or_else(|| anyhow!("model output '{}' is not a tensor", output.name))?
            .to_string();
        self.output_dtype = match output_dtype.as_str() {
            "f16" => Some(ModelOutputDType::F16),
            "f32" => Some(ModelOutputDType::F32),
            "f64" => Some(ModelOutputDType::F64),
            other => bail!("unsupported output dtype {other} for '{}'", output.name),
        };
        info!(
            "input '{}' {:?} x {:?}, output '{}' {:?}",
            input.name, self.input_dtype, self.input_width, output.name, self.output_dtype
        );

        self.model = Some(session);
        Ok(())
    }

    fn input_width(&self) -> Option<usize> {
        self.input_width
    }

    async fn predict(&self, features: Array2<f64>) -> anyhow::Result<f64> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("ONNX session is not initialised"))?;

        // Run the model.
        let start = Instant::now();
        let outputs = match self.input_dtype {
            Some(ModelInputDType::F64) => model.run(ort::inputs![features]?)?,
            _ => model.run(ort::inputs![features.mapv(|x| x as f32)]?)?,
        };
        debug!("actual inference took: {:?}", start.elapsed());

        // regressors emit [rows, 1] or [rows]; the first element is our row
        let output = &outputs[0];
        let prediction = match self.output_dtype {
            Some(ModelOutputDType::F16) => output
                .try_extract_tensor::<f16>()?
                .iter()
                .next()
                .map(|v| v.to_f64()),
            Some(ModelOutputDType::F64) => {
                output.try_extract_tensor::<f64>()?.iter().next().copied()
            }
            _ => output
                .try_extract_tensor::<f32>()?
                .iter()
                .next()
                .map(|&v| f64::from(v)),
        };

        prediction.ok_or_else(|| anyhow!("model returned an empty output"))
    }
}
