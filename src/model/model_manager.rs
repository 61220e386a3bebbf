use super::loader::{load_model, LoadError};
use super::model_utils::{Backend, Regressor};
use crate::error::PredictError;
use crate::features::trip_features::TripFeatures;
use anyhow::anyhow;
use log::{debug, error, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Holds the regressor loaded at startup, if any. Shared read-only by every
/// request handler.
pub struct ModelManager {
    model: Option<Arc<dyn Regressor>>,
}

impl ModelManager {
    pub fn new(model: Option<Arc<dyn Regressor>>) -> Self {
        Self { model }
    }

    /// Loads the artifact at `model_path`. A failed load is logged and leaves
    /// the manager empty instead of aborting startup.
    pub async fn load(model_path: &Path, backend: Backend) -> Self {
        match load_model(model_path, backend).await {
            Ok(model) => Self::new(Some(model)),
            Err(err) => {
                log_load_error(&err);
                warn!("Serving without a model, /predict will answer 500");
                Self::new(None)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub async fn predict(&self, features: &TripFeatures) -> Result<f64, PredictError> {
        let model = self.model.as_ref().ok_or(PredictError::ModelNotLoaded)?;
        run(model.as_ref(), features).await
    }

    /// Decodes a raw `/predict` body and runs it through the model. The model
    /// is checked first so an unloaded server rejects every body alike.
    pub async fn predict_body(&self, body: &[u8]) -> Result<f64, PredictError> {
        if !self.is_loaded() {
            return Err(PredictError::ModelNotLoaded);
        }
        let features = TripFeatures::from_body(body).map_err(|e| {
            debug!("rejected input ({}): {e}", e.field().unwrap_or("body"));
            e
        })?;
        self.predict(&features).await
    }
}

async fn run(model: &dyn Regressor, features: &TripFeatures) -> Result<f64, PredictError> {
    let start = Instant::now();
    let prediction = model
        .predict(features.to_array())
        .await
        .and_then(|y| {
            if y.is_finite() {
                Ok(y)
            } else {
                Err(anyhow!("model returned a non-finite prediction ({y})"))
            }
        })
        .map_err(|e| {
            error!("inference failed for {features:?}: {e:#}");
            PredictError::Inference(e)
        })?;
    debug!("prediction {prediction} in {:?}", start.elapsed());
    Ok(prediction)
}

pub fn log_load_error(err: &LoadError) {
    error!("{err}");
    if let Some(source) = std::error::Error::source(err) {
        error!("caused by: {source}");
    }
}
