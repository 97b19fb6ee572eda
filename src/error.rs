use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::counter;

use crate::types::ErrorResponse;

/// Per-request failure, one variant per pipeline stage.
///
/// Only [`ClassifyError::MissingInput`] is the caller's fault; every other
/// kind means the image was unusable or the service is misconfigured.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("{0}")]
    MissingInput(String),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("predicted class index {index} is outside the label set of size {len}")]
    LabelIndex { index: usize, len: usize },

    #[error("inference workers unavailable: {0}")]
    Unavailable(String),
}

impl ClassifyError {
    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    pub fn inference(msg: impl std::fmt::Display) -> Self {
        Self::Inference(msg.to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingInput(_) => "missing_input",
            Self::Decode(_) => "decode",
            Self::Tensor(_) => "tensor",
            Self::Inference(_) => "inference",
            Self::LabelIndex { .. } => "label_index",
            Self::Unavailable(_) => "unavailable",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ClassifyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();
        if status.is_client_error() {
            tracing::warn!(kind, error = %self, "Rejected prediction request");
        } else {
            tracing::error!(kind, error = %self, "Prediction failed");
        }
        counter!("predict_errors_total", "kind" => kind).increment(1);

        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
