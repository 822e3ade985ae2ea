use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tillroll_ocr::PipelineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No file uploaded: expected a multipart field named 'file'")]
    MissingFile,
    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile => StatusCode::BAD_REQUEST,
            ApiError::Multipart(e) => e.status(),
            ApiError::Pipeline(PipelineError::Decode(_)) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(_) | ApiError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "upload failed");
        } else {
            tracing::warn!(error = %self, "upload rejected");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
