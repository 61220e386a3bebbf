use crate::features::trip_features::FeatureError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Everything that can go wrong between receiving a `/predict` body and
/// answering it.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Model not loaded on server.")]
    ModelNotLoaded,
    #[error("Bad input: {0}")]
    BadInput(#[from] FeatureError),
    #[error("Inference error: {0:#}")]
    Inference(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictError::BadInput(_) => StatusCode::BAD_REQUEST,
            PredictError::ModelNotLoaded | PredictError::Inference(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}
